//! ペイロードの読み取り
//!
//! 整数・浮動小数点はすべてビッグエンディアン。
//! 文字列は `[len: u16 BE][utf8 bytes]`。
//!
//! ## 圧縮整数
//! ```text
//! 1 バイト目: bit 7 = 継続, bit 6 = 符号（1 なら負）, bit 0..5 = 値の下位 6 ビット
//! 2 バイト目以降: bit 7 = 継続, bit 0..6 = 次の 7 ビット
//! ```

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::DecodeError;

/// ペイロードのカーソル付きリーダー
///
/// 範囲外の読み取りは `DecodeError::TrailingOrMissingBytes` になる。
/// 最後に `finish()` で読み残しがないことを確認する。
#[derive(Debug, Clone)]
pub struct BufferReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BufferReader { data, position: 0 }
    }

    /// 現在の読み取り位置
    pub fn position(&self) -> usize {
        self.position
    }

    /// バッファ全体の長さ
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 残りバイト数
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// すべて読み終えているか確認する
    ///
    /// # エラー
    /// - `DecodeError::TrailingOrMissingBytes`: 読み残しがある
    pub fn finish(&self) -> Result<(), DecodeError> {
        if self.position == self.data.len() {
            Ok(())
        } else {
            Err(self.overrun())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_be_bytes(self.take()?))
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_be_bytes(self.take()?))
    }

    /// `n` バイトをそのまま読む
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .position
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.overrun())?;
        let data = self.data;
        let bytes = &data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// `[len: u16 BE][bytes]` 形式のバイト列
    pub fn read_byte_array(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_u16()? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }

    /// `[len: u16 BE][utf8 bytes]` 形式の文字列
    ///
    /// # エラー
    /// - `DecodeError::InvalidUtf8`: UTF-8 として不正（位置は文字列本体の先頭）
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u16()? as usize;
        let start = self.position;
        let bytes = self.read_bytes(len)?;
        core::str::from_utf8(bytes)
            .map(String::from)
            .map_err(|_| DecodeError::InvalidUtf8 { position: start })
    }

    /// 圧縮整数
    ///
    /// 32 ビットを超える分のビットは捨てる。
    pub fn read_compressed_int(&mut self) -> Result<i32, DecodeError> {
        let first = self.read_u8()?;
        let negative = first & 0x40 != 0;
        let mut value = (first & 0x3F) as u32;
        let mut shift = 6u32;
        let mut byte = first;

        while byte & 0x80 != 0 {
            byte = self.read_u8()?;
            if shift < 32 {
                value |= ((byte & 0x7F) as u32) << shift;
            }
            shift += 7;
        }

        let value = value as i32;
        Ok(if negative { value.wrapping_neg() } else { value })
    }

    // ===== Private メソッド =====

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn overrun(&self) -> DecodeError {
        DecodeError::TrailingOrMissingBytes {
            position: self.position,
            size: self.data.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_big_endian_fields() {
        let data = [0x00, 0x01, 0xFF, 0xFE, 0x3F, 0x80, 0x00, 0x00, 0x01];
        let mut reader = BufferReader::new(&data);
        assert_eq!(reader.read_u16().unwrap(), 1);
        assert_eq!(reader.read_i16().unwrap(), -2);
        assert_eq!(reader.read_f32().unwrap(), 1.0);
        assert!(reader.read_bool().unwrap());
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_read_past_end() {
        let mut reader = BufferReader::new(&[0, 0, 1]);
        assert_eq!(
            reader.read_i32(),
            Err(DecodeError::TrailingOrMissingBytes { position: 0, size: 3 })
        );
        // 失敗した読み取りは位置を進めない
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_finish_reports_trailing_bytes() {
        let mut reader = BufferReader::new(&[1, 2, 3]);
        reader.read_u8().unwrap();
        assert_eq!(
            reader.finish(),
            Err(DecodeError::TrailingOrMissingBytes { position: 1, size: 3 })
        );
    }

    #[test]
    fn test_read_string() {
        let mut reader = BufferReader::new(&[0, 2, b'h', b'i', 0, 0]);
        assert_eq!(reader.read_string().unwrap(), "hi");
        assert_eq!(reader.read_string().unwrap(), "");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_read_string_invalid_utf8() {
        let mut reader = BufferReader::new(&[0, 1, 0xFF]);
        assert_eq!(reader.read_string(), Err(DecodeError::InvalidUtf8 { position: 2 }));
    }

    #[test]
    fn test_read_compressed_int_known_bytes() {
        // 0x40 = 負号のみ → -0 == 0
        let cases: &[(&[u8], i32)] = &[
            (&[0x00], 0),
            (&[0x3F], 63),
            (&[0x80, 0x01], 64),
            (&[0x7F], -63),
            (&[0xC0, 0x01], -64),
            (&[0xAC, 0x04], 300),
        ];
        for (bytes, expected) in cases {
            let mut reader = BufferReader::new(bytes);
            assert_eq!(reader.read_compressed_int().unwrap(), *expected);
            assert!(reader.finish().is_ok());
        }
    }

    #[test]
    fn test_read_compressed_int_truncated() {
        let mut reader = BufferReader::new(&[0x80]);
        assert!(reader.read_compressed_int().is_err());
    }
}
