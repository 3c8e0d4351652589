//! 生フレームから購読者までの全体
//!
//! 処理スレッドが 1 つだけ所有し、到着順の生フレームを `process_raw()` に渡す。
//! 各段の失敗はここでログ・診断に変換し、呼び出し側には `Flow` だけを返す。

use std::sync::Arc;

use realmtap_crypto::{Direction, SyncStatus};
use realmtap_proto::{DecodeError, Frame, Message, ServerAddress};
use realmtap_transport::{parse_ipv4, Defragmenter, GapReport, RawFrame, TcpSegment};

use crate::config::PipelineConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind, NoopObserver, PipelineObserver, RawPacketLog};
use crate::direction::{DirectionEvent, DirectionPipeline};
use crate::dispatcher::Dispatcher;
use crate::error::PipelineError;
use crate::stats::PipelineStats;

/// 処理を続けるかどうか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// 回復不能な欠落。キャプチャを止めること
    Halt,
}

/// 再構築パイプライン
pub struct Pipeline {
    config: PipelineConfig,
    defragmenter: Defragmenter,
    incoming: DirectionPipeline,
    outgoing: DirectionPipeline,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<PipelineStats>,
    observer: Box<dyn PipelineObserver>,
    raw_log: RawPacketLog,
    /// 直近に観測したサーバーのアドレス
    server_addr: Option<[u8; 4]>,
    halted: bool,
}

impl Pipeline {
    /// # エラー
    /// - `PipelineError::Key` / `PipelineError::InvalidConfig`: 設定が不正
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Pipeline {
            defragmenter: Defragmenter::new(config.fragment_capacity),
            incoming: DirectionPipeline::new(Direction::Incoming, &config)?,
            outgoing: DirectionPipeline::new(Direction::Outgoing, &config)?,
            dispatcher: Arc::new(Dispatcher::new()),
            stats: Arc::new(PipelineStats::new()),
            observer: Box::new(NoopObserver),
            raw_log: RawPacketLog::new(config.raw_log_capacity),
            server_addr: None,
            halted: false,
            config,
        })
    }

    /// 観測フックを差し替える
    pub fn with_observer(mut self, observer: Box<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// 外部で作った配信器を使う
    pub fn with_dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// 外部で作った統計を使う
    pub fn with_stats(mut self, stats: Arc<PipelineStats>) -> Self {
        self.stats = stats;
        self
    }

    /// キャプチャした生フレームを 1 つ処理する
    ///
    /// IPv4/TCP 以外やゲームポート以外のトラフィックは無視する。
    ///
    /// # 戻り値
    /// - `Flow::Continue`: 次のフレームへ
    /// - `Flow::Halt`: 回復不能な欠落が起きた（以降のフレームも無視する）
    pub fn process_raw(&mut self, raw: &RawFrame) -> Flow {
        if self.halted {
            return Flow::Halt;
        }
        self.stats.record_raw_frame();
        self.raw_log.push(raw);

        let packet = match parse_ipv4(&raw.data) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.record_ignored();
                tracing::debug!(error = %e, len = raw.data.len(), "ignoring frame");
                return Flow::Continue;
            }
        };

        let Some(packet) = self.defragmenter.defragment(packet) else {
            return Flow::Continue;
        };

        match packet.tcp() {
            Ok(segment) => self.process_segment(segment),
            Err(e) => {
                self.stats.record_ignored();
                tracing::debug!(error = %e, id = packet.identification, "ignoring packet");
                Flow::Continue
            }
        }
    }

    /// TCP セグメントを 1 つ処理する（リンク層を経由しない入力用）
    pub fn process_segment(&mut self, segment: TcpSegment) -> Flow {
        if self.halted {
            return Flow::Halt;
        }

        let Some(direction) = self.route(&segment) else {
            self.stats.record_ignored();
            tracing::debug!(
                src_port = segment.src_port,
                dst_port = segment.dst_port,
                "ignoring non-game segment"
            );
            return Flow::Continue;
        };

        let seq = segment.sequence;
        let ip_id = segment.ip_id;
        let events = match direction {
            Direction::Incoming => self.incoming.process(segment),
            Direction::Outgoing => self.outgoing.process(segment),
        };

        for event in events {
            match event {
                DirectionEvent::StreamBytes { payload, src_addr } => {
                    self.on_stream_bytes(direction, &payload, src_addr);
                }
                DirectionEvent::Frame { frame, status } => {
                    self.on_frame(direction, frame, status);
                }
                DirectionEvent::Reset => {
                    tracing::info!(%direction, seq, "new connection, stream state reset");
                }
                DirectionEvent::Gap(report) => {
                    self.on_gap(direction, ip_id, seq, report);
                }
                DirectionEvent::Fatal { backlog } => {
                    self.on_fatal(direction, backlog);
                    return Flow::Halt;
                }
            }
        }
        Flow::Continue
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn direction(&self, direction: Direction) -> &DirectionPipeline {
        match direction {
            Direction::Incoming => &self.incoming,
            Direction::Outgoing => &self.outgoing,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// 直近に観測したサーバーのアドレス
    pub fn server_address(&self) -> Option<ServerAddress> {
        self.server_addr.map(ServerAddress::new)
    }

    /// 組み立て中の IPv4 フラグメントを持つデータグラム数
    pub fn pending_fragments(&self) -> usize {
        self.defragmenter.pending_len()
    }

    // ===== Private メソッド =====

    fn route(&self, segment: &TcpSegment) -> Option<Direction> {
        if segment.src_port == self.config.game_port {
            Some(Direction::Incoming)
        } else if segment.dst_port == self.config.game_port {
            Some(Direction::Outgoing)
        } else {
            None
        }
    }

    fn on_stream_bytes(&mut self, direction: Direction, payload: &[u8], src_addr: [u8; 4]) {
        self.stats.record_stream_bytes(direction, payload.len());

        if direction == Direction::Incoming && self.server_addr != Some(src_addr) {
            self.server_addr = Some(src_addr);
            let address = ServerAddress::new(src_addr);
            tracing::info!(server = %address, "server address changed");
            self.dispatcher.publish(&Message::ServerAddress(address));
        }

        self.observer.on_stream_bytes(direction, payload, src_addr);
    }

    fn on_frame(&mut self, direction: Direction, frame: Frame, status: SyncStatus) {
        self.stats.record_frame(frame.tag);

        match status {
            SyncStatus::Ready => {}
            SyncStatus::Aligned { offset, tick } => {
                self.stats.record_alignment();
                tracing::info!(%direction, offset, tick, "cipher aligned");
            }
            SyncStatus::Searching => {
                tracing::trace!(%direction, tag = frame.tag, "frame held back while unsynced");
                return;
            }
            SyncStatus::SearchFailed { delta } => {
                tracing::warn!(%direction, delta, "alignment search failed, retrying with next tick");
                self.emit(Diagnostic::new(
                    DiagnosticKind::SearchFailed,
                    Some(direction),
                    format!("no keystream offset matched a tick delta of {delta} bytes"),
                ));
                return;
            }
            SyncStatus::Desynced { expected, actual } => {
                self.stats.record_desync();
                tracing::warn!(%direction, expected, actual, "tick sequence broken, cipher desynced");
                self.emit(Diagnostic::new(
                    DiagnosticKind::Desync,
                    Some(direction),
                    format!("expected tick {expected}, decrypted {actual}"),
                ));
                return;
            }
        }

        match realmtap_proto::decode(frame.tag, &frame.payload) {
            Ok(message) => {
                self.stats.record_decoded();
                tracing::trace!(%direction, kind = %message.kind(), "dispatching message");
                self.dispatcher.publish(&message);
            }
            Err(DecodeError::UnknownType(tag)) => {
                self.stats.record_dropped();
                tracing::trace!(%direction, tag, len = frame.payload.len(), "unregistered frame type");
                self.emit(
                    Diagnostic::new(
                        DiagnosticKind::UnknownType,
                        Some(direction),
                        format!("unknown frame type {tag}"),
                    )
                    .with_dump(hex::encode(&frame.payload)),
                );
            }
            Err(e) => {
                self.stats.record_dropped();
                tracing::warn!(%direction, tag = frame.tag, error = %e, "dropping undecodable frame");
                self.emit(
                    Diagnostic::new(
                        DiagnosticKind::DecodeFailed,
                        Some(direction),
                        format!("type {}: {e}", frame.tag),
                    )
                    .with_dump(hex::encode(&frame.payload)),
                );
            }
        }
    }

    fn on_gap(&mut self, direction: Direction, ip_id: u16, seq: u32, report: GapReport) {
        self.stats.record_gap();
        tracing::warn!(
            %direction,
            id = ip_id,
            seq,
            from = report.from,
            to = report.to,
            skipped_bytes = report.skipped_bytes,
            lost_segments = report.ip_id_gap,
            backlog = report.backlog,
            "packets missing, skipping ahead"
        );
        let diagnostic = Diagnostic::new(
            DiagnosticKind::Gap,
            Some(direction),
            format!(
                "Packets missing. id:{ip_id} seq:{seq} skipped {} bytes (~{} segments)",
                report.skipped_bytes, report.ip_id_gap
            ),
        )
        .with_dump(self.raw_log.dump());
        self.emit(diagnostic);
    }

    fn on_fatal(&mut self, direction: Direction, backlog: usize) {
        self.stats.record_fatal();
        self.halted = true;
        tracing::error!(%direction, backlog, "unrecoverable packet loss, halting pipeline");
        let diagnostic = Diagnostic::new(
            DiagnosticKind::Fatal,
            Some(direction),
            format!("Sniffer lost {backlog} packets from unknown reasons. Shutting down."),
        )
        .with_dump(self.raw_log.dump());
        self.emit(diagnostic);
        self.observer.on_fatal();
    }

    fn emit(&mut self, diagnostic: Diagnostic) {
        self.observer.on_diagnostic(&diagnostic);
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("incoming", &self.incoming)
            .field("outgoing", &self.outgoing)
            .field("server_addr", &self.server_addr)
            .field("halted", &self.halted)
            .finish()
    }
}
