//! # realmtap-transport
//!
//! キャプチャしたリンク層フレームから、方向ごとに順序の揃った TCP バイトストリームを作る。
//!
//! ## 流れ
//!
//! ```text
//! RawFrame ──▶ EthernetFrame ──▶ Ipv4Packet ──▶ Defragmenter ──▶ TcpSegment ──▶ StreamReassembler ──▶ StreamEvent
//!              (802.1Q 対応)                    (フラグメント結合)                   (並べ替え・欠落回復)
//! ```
//!
//! どの段でもゲームと無関係なトラフィックは `TransportError` として返り、呼び出し側で無視する。

pub mod error;
pub mod fragment;
pub mod packet;
pub mod stream;

pub use error::TransportError;
pub use fragment::{DatagramKey, Defragmenter, DEFAULT_FRAGMENT_CAPACITY};
pub use packet::{parse_ipv4, EthernetFrame, Ipv4Packet, RawFrame, TcpFlags, TcpSegment};
pub use stream::{GapReport, ReassemblerConfig, StreamEvent, StreamReassembler, StreamState};
