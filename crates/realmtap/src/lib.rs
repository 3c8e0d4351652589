//! # realmtap
//!
//! ゲームクライアントの暗号化 TCP 通信を受動的に観測し、平文のメッセージ列を組み立てて配信する。
//!
//! ## アーキテクチャ
//!
//! ```text
//! realmtap           PacketTap (キャプチャスレッド + 処理スレッド), TapConfig, init_logging
//!    │
//! realmtap-pipeline  Pipeline / DirectionPipeline / Dispatcher / 診断 / 統計
//!    │
//!    ├── realmtap-transport  Ethernet / IPv4 / TCP, フラグメント結合, ストリーム再構築
//!    ├── realmtap-stream     フレーム切り出し, スレッド間キュー
//!    ├── realmtap-crypto     RC4, アライメント探索, tick 同期
//!    └── realmtap-proto      フレーム形式, メッセージ, デコーダーレジストリ
//! ```
//!
//! ## 使い方
//!
//! ```no_run
//! use realmtap::{init_logging, MessageKind, PacketTap, ReplaySource, TapConfig};
//!
//! # fn main() -> Result<(), realmtap::TapError> {
//! let config = TapConfig::load("realmtap.toml")?;
//! init_logging(&config.runtime.log_level);
//!
//! let mut tap = PacketTap::new(config)?;
//! tap.dispatcher().subscribe(MessageKind::NewTick, |message| {
//!     println!("{message:?}");
//! });
//! tap.start(vec![Box::new(ReplaySource::new("capture.bin", Vec::new()))])?;
//! // ...
//! tap.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod logging;
pub mod tap;

pub use capture::{Capture, FrameSource, ReplaySource};
pub use config::{RuntimeConfig, TapConfig};
pub use error::{Result, TapError};
pub use logging::init_logging;
pub use tap::PacketTap;

pub use realmtap_crypto::Direction;
pub use realmtap_pipeline::{
    Diagnostic, DiagnosticKind, Dispatcher, PipelineConfig, PipelineObserver, StatsSnapshot,
    SubscriptionId, Topic,
};
pub use realmtap_proto::{Message, MessageKind};
pub use realmtap_transport::RawFrame;
