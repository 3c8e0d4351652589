//! 処理統計
//!
//! 処理スレッドが更新し、他のスレッドから `snapshot()` / `to_json()` で読む。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use realmtap_crypto::Direction;
use serde::{Deserialize, Serialize};

/// 統計のある時点の値
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub raw_frames: u64,
    /// ゲームポート以外などで無視したパケット
    pub ignored_packets: u64,
    pub incoming_bytes: u64,
    pub outgoing_bytes: u64,
    /// type タグ → 切り出したフレーム数
    pub frames_by_type: BTreeMap<u8, u64>,
    pub decoded_messages: u64,
    pub dropped_messages: u64,
    pub alignments: u64,
    pub desyncs: u64,
    pub gaps: u64,
    pub fatal: u64,
}

impl StatsSnapshot {
    /// 切り出したフレームの総数
    pub fn total_frames(&self) -> u64 {
        self.frames_by_type.values().sum()
    }
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    raw_frames: AtomicU64,
    ignored_packets: AtomicU64,
    incoming_bytes: AtomicU64,
    outgoing_bytes: AtomicU64,
    frames_by_type: Mutex<BTreeMap<u8, u64>>,
    decoded_messages: AtomicU64,
    dropped_messages: AtomicU64,
    alignments: AtomicU64,
    desyncs: AtomicU64,
    gaps: AtomicU64,
    fatal: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_raw_frame(&self) {
        self.raw_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ignored(&self) {
        self.ignored_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stream_bytes(&self, direction: Direction, len: usize) {
        let counter = match direction {
            Direction::Incoming => &self.incoming_bytes,
            Direction::Outgoing => &self.outgoing_bytes,
        };
        counter.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_frame(&self, tag: u8) {
        let mut frames = self
            .frames_by_type
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *frames.entry(tag).or_default() += 1;
    }

    pub(crate) fn record_decoded(&self) {
        self.decoded_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_alignment(&self) {
        self.alignments.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_desync(&self) {
        self.desyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_gap(&self) {
        self.gaps.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fatal(&self) {
        self.fatal.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            raw_frames: self.raw_frames.load(Ordering::Relaxed),
            ignored_packets: self.ignored_packets.load(Ordering::Relaxed),
            incoming_bytes: self.incoming_bytes.load(Ordering::Relaxed),
            outgoing_bytes: self.outgoing_bytes.load(Ordering::Relaxed),
            frames_by_type: self
                .frames_by_type
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            decoded_messages: self.decoded_messages.load(Ordering::Relaxed),
            dropped_messages: self.dropped_messages.load(Ordering::Relaxed),
            alignments: self.alignments.load(Ordering::Relaxed),
            desyncs: self.desyncs.load(Ordering::Relaxed),
            gaps: self.gaps.load(Ordering::Relaxed),
            fatal: self.fatal.load(Ordering::Relaxed),
        }
    }

    /// 統計を JSON 文字列で返す
    ///
    /// # 戻り値
    /// ```json
    /// {
    ///   "raw_frames": 1200,
    ///   "ignored_packets": 3,
    ///   "incoming_bytes": 845012,
    ///   "outgoing_bytes": 20480,
    ///   "frames_by_type": { "10": 310, "62": 305 },
    ///   "decoded_messages": 615,
    ///   "dropped_messages": 0,
    ///   "alignments": 2,
    ///   "desyncs": 0,
    ///   "gaps": 0,
    ///   "fatal": 0
    /// }
    /// ```
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot())
    }
}
