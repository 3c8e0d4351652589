//! 暗号エラー型

use thiserror::Error;

/// 暗号操作・アライメント探索のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// 鍵の長さが不正（空、または 256 バイト超）
    #[error("invalid RC4 key length: {0} bytes")]
    InvalidKeyLength(usize),

    /// 16進文字列のデコードに失敗
    #[error("invalid hex key encoding")]
    InvalidHexKey,

    /// 探索範囲内にアライメントが見つからなかった
    #[error("cipher alignment not found within {searched} candidate offsets")]
    AlignmentNotFound { searched: usize },

    /// 観測データが探索に必要な長さに足りない
    #[error("observation too short: need {needed} bytes, got {actual}")]
    ObservationTooShort { needed: usize, actual: usize },
}
