//! # realmtap-pipeline
//!
//! 生フレームからデコード済みメッセージの配信までをつなぐ。
//!
//! ## アーキテクチャ
//!
//! `Pipeline` は処理スレッドが 1 つだけ所有する。
//!
//! ```text
//! RawFrame ─▶ parse_ipv4 ─▶ Defragmenter ─▶ TcpSegment
//!                                              │ ポートで振り分け
//!                          ┌───────────────────┴───────────────────┐
//!                          ▼                                       ▼
//!             DirectionPipeline (Incoming)            DirectionPipeline (Outgoing)
//!             reassembler / extractor / sync          reassembler / extractor / sync
//!                          │                                       │
//!                          └───────────────────┬───────────────────┘
//!                                              ▼
//!                                   decode ─▶ Dispatcher ─▶ 購読者
//!
//! 異常 ─▶ Diagnostic ─▶ PipelineObserver
//! カウンタ ─▶ PipelineStats（別スレッドから JSON で読める）
//! ```
//!
//! 回復不能な欠落だけが `Flow::Halt` を返し、それ以外はすべて続行する。

pub mod config;
pub mod diagnostics;
pub mod direction;
pub mod dispatcher;
pub mod error;
pub mod pipeline;
pub mod stats;

pub use config::{PipelineConfig, DEFAULT_GAME_PORT, DEFAULT_RAW_LOG_CAPACITY};
pub use diagnostics::{Diagnostic, DiagnosticKind, NoopObserver, PipelineObserver, RawPacketLog};
pub use direction::{DirectionEvent, DirectionPipeline};
pub use dispatcher::{Dispatcher, Handler, SubscriptionId, Topic};
pub use error::PipelineError;
pub use pipeline::{Flow, Pipeline};
pub use stats::{PipelineStats, StatsSnapshot};
