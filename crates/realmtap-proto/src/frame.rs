//! アプリケーションフレーム
//!
//! ## Frame Wire Format
//! ```text
//! [length: u32 BE (4 bytes)]   ヘッダーを含むフレーム全体の長さ
//! [type: u8 (1 byte)]          メッセージ種別タグ
//! [payload: length - 5 bytes]  RC4 で暗号化されたペイロード
//! ```

use alloc::vec::Vec;

use crate::error::DecodeError;

/// 1 つのアプリケーションフレーム
///
/// `payload` は抽出直後は暗号文、復号後は平文になる。
/// パイプライン内ではちょうど 1 回だけ消費される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// メッセージ種別タグ
    pub tag: u8,
    /// ペイロード（ヘッダーを除く）
    pub payload: Vec<u8>,
}

impl Frame {
    /// フレームヘッダー長（length: 4 + type: 1）
    pub const HEADER_LEN: usize = 5;

    /// 長さフィールドのバイト数
    pub const LENGTH_LEN: usize = 4;

    /// これを超える長さ宣言は異常値として扱う
    pub const MAX_FRAME_LEN: usize = 200_000;

    pub fn new(tag: u8, payload: Vec<u8>) -> Self {
        Frame { tag, payload }
    }

    /// 先頭 4 バイトから宣言されたフレーム長を読む
    pub fn declared_len(header: &[u8; Self::LENGTH_LEN]) -> usize {
        u32::from_be_bytes(*header) as usize
    }

    /// フレーム全体のバイト列から復元する
    ///
    /// # エラー
    /// - `DecodeError::TrailingOrMissingBytes`: 長さフィールドと実際の長さが一致しない
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < Self::HEADER_LEN {
            return Err(DecodeError::TrailingOrMissingBytes {
                position: bytes.len(),
                size: Self::HEADER_LEN,
            });
        }

        let declared = Self::declared_len(&[bytes[0], bytes[1], bytes[2], bytes[3]]);
        if declared != bytes.len() {
            return Err(DecodeError::TrailingOrMissingBytes {
                position: bytes.len(),
                size: declared,
            });
        }

        Ok(Frame {
            tag: bytes[4],
            payload: bytes[Self::HEADER_LEN..].to_vec(),
        })
    }

    /// Wire Format に変換する
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len());
        bytes.extend_from_slice(&(self.len() as u32).to_be_bytes());
        bytes.push(self.tag);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// ヘッダーを含むフレーム全体の長さ
    pub fn len(&self) -> usize {
        Self::HEADER_LEN + self.payload.len()
    }

    /// ペイロードが空か
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_to_bytes_layout() {
        let frame = Frame::new(10, alloc::vec![0xAA, 0xBB]);
        assert_eq!(frame.to_bytes(), alloc::vec![0, 0, 0, 7, 10, 0xAA, 0xBB]);
        assert_eq!(frame.len(), 7);
    }

    #[test]
    fn test_from_bytes_checks_declared_length() {
        let ok = Frame::from_bytes(&[0, 0, 0, 6, 62, 1]).unwrap();
        assert_eq!(ok.tag, 62);
        assert_eq!(ok.payload, alloc::vec![1]);

        assert_eq!(
            Frame::from_bytes(&[0, 0, 0, 9, 62, 1]),
            Err(DecodeError::TrailingOrMissingBytes { position: 6, size: 9 })
        );
        assert!(Frame::from_bytes(&[0, 0]).is_err());
    }

    #[test]
    fn test_header_only_frame() {
        let frame = Frame::from_bytes(&[0, 0, 0, 5, 44]).unwrap();
        assert!(frame.is_empty());
    }
}
