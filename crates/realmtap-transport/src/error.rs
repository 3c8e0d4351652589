//! realmtap-transport エラー型

use thiserror::Error;

/// リンク層〜TCP のパースエラー
///
/// キャプチャには無関係なトラフィックも混ざるので、どれも「無視してよい」ことを示す。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// ヘッダーに必要な長さが足りない
    #[error("{layer} too short: need {needed} bytes, got {actual}")]
    TooShort {
        layer: &'static str,
        needed: usize,
        actual: usize,
    },

    /// IPv4 以外の EtherType
    #[error("unsupported ether type 0x{0:04x}")]
    UnsupportedEtherType(u16),

    /// IP バージョンが 4 ではない
    #[error("not an IPv4 packet (version {version})")]
    NotIpv4 { version: u8 },

    /// TCP 以外のプロトコル
    #[error("not a TCP segment (protocol {protocol})")]
    NotTcp { protocol: u8 },
}
