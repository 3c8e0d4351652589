//! ペイロードの書き込み
//!
//! `BufferReader` の逆。テストのフィクスチャ生成やリプレイ用のフレーム組み立てに使う。

use alloc::vec::Vec;

use crate::frame::Frame;

/// ビッグエンディアンでフィールドを追記するライター
#[derive(Debug, Clone, Default)]
pub struct BufferWriter {
    buf: Vec<u8>,
}

impl BufferWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn write_bool(&mut self, v: bool) -> &mut Self {
        self.write_u8(v as u8)
    }

    pub fn write_i16(&mut self, v: i16) -> &mut Self {
        self.write_bytes(&v.to_be_bytes())
    }

    pub fn write_u16(&mut self, v: u16) -> &mut Self {
        self.write_bytes(&v.to_be_bytes())
    }

    pub fn write_i32(&mut self, v: i32) -> &mut Self {
        self.write_bytes(&v.to_be_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> &mut Self {
        self.write_bytes(&v.to_be_bytes())
    }

    pub fn write_f32(&mut self, v: f32) -> &mut Self {
        self.write_bytes(&v.to_be_bytes())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// `[len: u16 BE][bytes]`。65535 バイトを超える分は切り詰める
    pub fn write_byte_array(&mut self, bytes: &[u8]) -> &mut Self {
        let len = bytes.len().min(u16::MAX as usize);
        self.write_u16(len as u16);
        self.write_bytes(&bytes[..len])
    }

    /// `[len: u16 BE][utf8 bytes]`
    pub fn write_string(&mut self, s: &str) -> &mut Self {
        self.write_byte_array(s.as_bytes())
    }

    /// 圧縮整数
    pub fn write_compressed_int(&mut self, v: i32) -> &mut Self {
        let mut magnitude = v.unsigned_abs();
        let mut byte = (magnitude & 0x3F) as u8;
        if v < 0 {
            byte |= 0x40;
        }
        magnitude >>= 6;

        while magnitude != 0 {
            self.write_u8(byte | 0x80);
            byte = (magnitude & 0x7F) as u8;
            magnitude >>= 7;
        }
        self.write_u8(byte)
    }

    /// 書き込み済みバイト数
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// 書き込んだバイト列を取り出す
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// 書き込んだバイト列をペイロードとするフレームにする
    pub fn into_frame(self, tag: u8) -> Frame {
        Frame::new(tag, self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::BufferReader;

    #[test]
    fn test_compressed_int_roundtrip() {
        for &v in &[0, 63, 64, -64, 300, -300, 2_097_151] {
            let mut writer = BufferWriter::new();
            writer.write_compressed_int(v);
            let bytes = writer.into_bytes();

            let mut reader = BufferReader::new(&bytes);
            assert_eq!(reader.read_compressed_int().unwrap(), v, "value {}", v);
            assert!(reader.finish().is_ok());
        }
    }

    #[test]
    fn test_compressed_int_encoding() {
        let mut writer = BufferWriter::new();
        writer.write_compressed_int(63).write_compressed_int(-64);
        assert_eq!(writer.into_bytes(), alloc::vec![0x3F, 0xC0, 0x01]);
    }

    #[test]
    fn test_into_frame() {
        let mut writer = BufferWriter::new();
        writer.write_i32(1).write_string("a");
        let frame = writer.into_frame(10);
        assert_eq!(frame.tag, 10);
        assert_eq!(frame.payload, alloc::vec![0, 0, 0, 1, 0, 1, b'a']);
    }
}
