//! # realmtap-crypto
//!
//! RotMG の TCP ストリームを復号するための RC4 実装と、
//! 途中から観測を始めた場合のキーストリーム位置（アライメント）探索。
//!
//! `no_std` + `alloc` 環境で動作する。ログは出さず、結果は値として返す
//! （ログ出力は呼び出し側の `realmtap-pipeline` が担当する）。
//!
//! ## 暗号化の仕様
//!
//! ```text
//! アプリケーションフレーム:
//!   [length: u32 BE][type: u8][ciphertext: length - 5 bytes]
//!                              ↑ ここだけが RC4 で暗号化される
//!
//! 鍵:
//!   サーバー → クライアント (Incoming) と クライアント → サーバー (Outgoing) で別鍵。
//!   どちらも 26 文字の 16進文字列（13 バイト）。
//!   キーストリームは接続開始から方向ごとに連続して消費される。
//! ```

#![no_std]
extern crate alloc;

mod align;
mod error;
mod rc4;
mod sync;

use alloc::vec::Vec;

pub use align::{encode_name, Aligner, SEARCH_SIZE, TEXT_NAME_OFFSET};
pub use error::CryptoError;
pub use rc4::CipherSession;
pub use sync::{SyncStatus, TickSync};

/// サーバー → クライアント方向の鍵
pub const INCOMING_KEY: &str = "c91d9eec420160730d825604e0";

/// クライアント → サーバー方向の鍵
pub const OUTGOING_KEY: &str = "5a4d2016bc16dc64883194ffd9";

/// TCP ストリームの方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    /// サーバー → クライアント（送信元ポートがゲームポート）
    Incoming,
    /// クライアント → サーバー（宛先ポートがゲームポート）
    Outgoing,
}

impl Direction {
    /// この方向の既定の 16進鍵
    pub fn default_key(&self) -> &'static str {
        match self {
            Direction::Incoming => INCOMING_KEY,
            Direction::Outgoing => OUTGOING_KEY,
        }
    }

    /// 逆方向
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Incoming => Direction::Outgoing,
            Direction::Outgoing => Direction::Incoming,
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Direction::Incoming => write!(f, "incoming"),
            Direction::Outgoing => write!(f, "outgoing"),
        }
    }
}

/// 16進文字列の鍵をバイト列にデコードする
///
/// # エラー
/// - `CryptoError::InvalidHexKey`: 16進として解釈できない（奇数長を含む）
/// - `CryptoError::InvalidKeyLength`: 空文字列
pub fn decode_hex_key(key_hex: &str) -> Result<Vec<u8>, CryptoError> {
    let bytes = hex::decode(key_hex.trim()).map_err(|_| CryptoError::InvalidHexKey)?;
    if bytes.is_empty() {
        return Err(CryptoError::InvalidKeyLength(0));
    }
    Ok(bytes)
}
