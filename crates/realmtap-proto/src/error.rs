//! realmtap-proto エラー型

use thiserror::Error;

/// フレーム・メッセージのデコードエラー
///
/// どれも回復可能で、該当フレームを捨てるだけで処理は続行できる。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// レジストリに登録されていない type タグ
    #[error("unknown packet type: {0}")]
    UnknownType(u8),

    /// 読み取り位置がペイロード長と一致しない（読み過ぎ・読み残し）
    #[error("buffer not fully parsed: position {position} of {size} bytes")]
    TrailingOrMissingBytes { position: usize, size: usize },

    /// 文字列フィールドが UTF-8 として不正
    #[error("invalid UTF-8 string at position {position}")]
    InvalidUtf8 { position: usize },
}
