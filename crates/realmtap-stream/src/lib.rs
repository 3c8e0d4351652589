//! # realmtap-stream
//!
//! 順序の揃った TCP バイトストリームと、キャプチャ〜処理スレッド間の受け渡し。
//!
//! ## 構成
//!
//! ```text
//! capture threads ──push──▶ InterFrameBuffer ──pop_wait──▶ processing thread
//!                                                              │
//!                          TCP payload (byte order) ──▶ FrameExtractor ──▶ Frame
//! ```
//!
//! - `FrameExtractor`: `[length: u32 BE][type][payload]` 単位にバイト列を切り出す。
//!   途中から観測を始めた場合はフレーム境界が分からないので、
//!   MTU 未満のチャンク（= 送信バーストの終わり）を見るまで読み捨てる。
//! - `InterFrameBuffer`: 満杯になったら容量を倍にする FIFO。書き込み側は決してブロックしない。

pub mod buffer;
pub mod extractor;

pub use buffer::InterFrameBuffer;
pub use extractor::{FrameExtractor, DEFAULT_MTU};
