//! 診断情報と観測フック
//!
//! パイプラインは異常を `Diagnostic` にまとめて `PipelineObserver` に渡す。
//! 欠落系の診断には直近の生フレーム（16進）がダンプとして付く。

use std::collections::VecDeque;
use std::fmt::Write as _;

use realmtap_crypto::Direction;
use realmtap_transport::RawFrame;

/// 診断の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// TCP セグメントの欠落を飛ばした
    Gap,
    /// 回復不能な欠落
    Fatal,
    /// tick 番号が連続せず同期を失った
    Desync,
    /// delta 探索で見つからなかった
    SearchFailed,
    /// 未登録の type タグ
    UnknownType,
    /// ペイロードを読み切れなかった、または読み残した
    DecodeFailed,
}

/// 1 件の診断
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// 方向に紐づく場合のみ
    pub direction: Option<Direction>,
    pub message: String,
    /// 付随するバイト列などの詳細（無ければ空）
    pub dump: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, direction: Option<Direction>, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            direction,
            message: message.into(),
            dump: String::new(),
        }
    }

    pub fn with_dump(mut self, dump: String) -> Self {
        self.dump = dump;
        self
    }
}

/// パイプラインの出力を受け取るフック
///
/// すべて既定で何もしない。処理スレッドから呼ばれるので重い処理はしないこと。
pub trait PipelineObserver: Send {
    /// 順序の揃った TCP ペイロード（復号前）
    fn on_stream_bytes(&mut self, _direction: Direction, _bytes: &[u8], _src_addr: [u8; 4]) {}

    fn on_diagnostic(&mut self, _diagnostic: &Diagnostic) {}

    /// 回復不能な欠落でパイプラインが停止した
    fn on_fatal(&mut self) {}
}

/// 何もしない観測者
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// 直近の生フレームのリング
#[derive(Debug)]
pub struct RawPacketLog {
    frames: VecDeque<RawFrame>,
    capacity: usize,
}

impl RawPacketLog {
    /// `capacity` が 0 なら何も残さない
    pub fn new(capacity: usize) -> Self {
        RawPacketLog {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, frame: &RawFrame) {
        if self.capacity == 0 {
            return;
        }
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame.clone());
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 古い順に 1 行 1 フレームで書き出す
    ///
    /// 形式: `<index> <timestamp_us> <len> <hex>`
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (i, frame) in self.frames.iter().enumerate() {
            let _ = writeln!(
                out,
                "{i} {} {} {}",
                frame.timestamp_us,
                frame.data.len(),
                hex::encode(&frame.data)
            );
        }
        out
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
