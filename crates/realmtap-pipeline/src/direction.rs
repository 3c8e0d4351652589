//! 1 方向分の処理（sans-IO）
//!
//! ```text
//! TcpSegment ──▶ StreamReassembler ──▶ FrameExtractor ──▶ TickSync ──▶ DirectionEvent::Frame
//!                      │                                                 (復号済みかは status で分かる)
//!                      ├─ Reset ─▶ 抽出器は境界合わせ済み・暗号は鍵スケジュール直後へ
//!                      ├─ Gap   ─▶ 抽出器は境界待ち・暗号は探索状態へ
//!                      └─ Fatal ─▶ 同上（呼び出し側がパイプラインを止める）
//! ```
//!
//! I/O もログ以外の副作用も持たない。結果は `Vec<DirectionEvent>` で返す。

use realmtap_crypto::{Direction, SyncStatus, TickSync};
use realmtap_proto::{tick_tag, Frame};
use realmtap_stream::FrameExtractor;
use realmtap_transport::{GapReport, StreamEvent, StreamReassembler, StreamState, TcpSegment};

use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// 1 方向分の処理結果
#[derive(Debug, Clone, PartialEq)]
pub enum DirectionEvent {
    /// 順序の揃った TCP ペイロード（復号前）
    StreamBytes { payload: Vec<u8>, src_addr: [u8; 4] },
    /// 切り出したフレーム。`status.is_decrypted()` のときだけペイロードは平文
    Frame { frame: Frame, status: SyncStatus },
    /// 新しい接続が始まった
    Reset,
    /// 欠落を飛ばした
    Gap(GapReport),
    /// 回復不能な欠落
    Fatal { backlog: usize },
}

/// 1 方向分の再構築・切り出し・復号
#[derive(Debug)]
pub struct DirectionPipeline {
    direction: Direction,
    reassembler: StreamReassembler,
    extractor: FrameExtractor,
    tick_sync: TickSync,
    /// 同期確認に使う tick 系フレームのタグ
    tick_tag: u8,
}

impl DirectionPipeline {
    /// # エラー
    /// - `PipelineError::Key`: この方向の鍵が不正
    pub fn new(direction: Direction, config: &PipelineConfig) -> Result<Self, PipelineError> {
        Ok(DirectionPipeline {
            direction,
            reassembler: StreamReassembler::new(config.reassembler()),
            extractor: FrameExtractor::new(config.mtu, config.max_frame_len),
            tick_sync: TickSync::new(config.cipher(direction)?, config.aligner()),
            tick_tag: tick_tag(direction),
        })
    }

    /// この方向の TCP セグメントを 1 つ処理する
    ///
    /// # 戻り値
    /// 発生順のイベント。各 `StreamBytes` の直後にそのバイト列で完成したフレームが続く。
    pub fn process(&mut self, segment: TcpSegment) -> Vec<DirectionEvent> {
        let mut events = Vec::new();

        for event in self.reassembler.push(segment) {
            match event {
                StreamEvent::Data { payload, src_addr } => {
                    let frames = self.extractor.push(&payload);
                    events.push(DirectionEvent::StreamBytes { payload, src_addr });
                    for frame in frames {
                        events.push(self.decrypt(frame));
                    }
                }
                StreamEvent::Reset => {
                    self.extractor.reset_aligned();
                    self.tick_sync.reset_connection();
                    events.push(DirectionEvent::Reset);
                }
                StreamEvent::Gap(report) => {
                    // 失われたバイト数のうち暗号化されていたのが何バイトか分からない
                    self.extractor.resync();
                    self.tick_sync.desync();
                    events.push(DirectionEvent::Gap(report));
                }
                StreamEvent::Fatal { backlog } => {
                    self.extractor.resync();
                    self.tick_sync.desync();
                    events.push(DirectionEvent::Fatal { backlog });
                }
            }
        }

        events
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_synced(&self) -> bool {
        self.tick_sync.is_synced()
    }

    pub fn stream_state(&self) -> StreamState {
        self.reassembler.state()
    }

    pub fn backlog(&self) -> usize {
        self.reassembler.backlog()
    }

    pub fn expected_sequence(&self) -> u32 {
        self.reassembler.expected_sequence()
    }

    pub fn tick_sync(&self) -> &TickSync {
        &self.tick_sync
    }

    pub fn extractor(&self) -> &FrameExtractor {
        &self.extractor
    }

    // ===== Private メソッド =====

    fn decrypt(&mut self, mut frame: Frame) -> DirectionEvent {
        let is_tick = frame.tag == self.tick_tag;
        let status = self.tick_sync.process(&mut frame.payload, is_tick);
        DirectionEvent::Frame { frame, status }
    }
}
