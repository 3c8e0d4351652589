//! 方向ごとの TCP ストリーム再構築
//!
//! 受動観測なので再送要求はできない。順序の入れ替わりはシーケンス番号で並べ直し、
//! 欠落は「待ちセグメントが溜まりすぎたら先へ飛ぶ」ことで回復する。
//!
//! ## 処理順
//! ```text
//! 1. RST を含むセグメントは捨てる。RST+SYN のときだけ状態をリセット
//! 2. 最初のデータセグメントで期待シーケンス番号を決める
//! 3. 流し終えた範囲と重なる再送は先頭を切り詰める（全部重なるなら捨てる）
//! 4. 待ち行列に入れる（同じシーケンス番号は後着で上書き）
//! 5. 欠落チェック: 待ちが fatal_backlog 以上 → 致命的。gap_threshold 超 → 先へ飛ぶ
//! 6. 期待シーケンス番号のセグメントがある限り取り出して下流へ流す
//! ```
//!
//! FIN や単独の SYN は通常のセグメントとして扱う。ペイロードがあれば流す。
//!
//! 最初に観測したセグメントより前に欠落があった場合は検出できない。

use std::collections::BTreeMap;

use crate::packet::TcpSegment;

/// 欠落処理のしきい値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblerConfig {
    /// 待ちセグメント数がこれを超えたら先へ飛ぶ
    pub gap_threshold: usize,
    /// 待ちセグメント数がこれ以上になったら回復不能
    pub fatal_backlog: usize,
    /// 飛び先を探すシーケンス番号の範囲
    pub scan_limit: u32,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        ReassemblerConfig {
            gap_threshold: 95,
            fatal_backlog: 100,
            scan_limit: 100_000,
        }
    }
}

/// 再構築の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// 最初のデータセグメント待ち
    AwaitingFirst,
    /// 期待シーケンス番号が決まっている
    Streaming,
}

/// 欠落を飛ばしたときの報告
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapReport {
    /// 飛ぶ前の期待シーケンス番号
    pub from: u32,
    /// 飛び先（待ち行列にあった最初のシーケンス番号）
    pub to: u32,
    /// 失われたバイト数
    pub skipped_bytes: u32,
    /// 直前に流したセグメントと飛び先の IP identification の差（失われたセグメント数の目安）
    pub ip_id_gap: u16,
    /// 欠落検出時の待ちセグメント数
    pub backlog: usize,
}

/// 再構築器からの出力
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// 順序通りに並んだペイロード
    Data { payload: Vec<u8>, src_addr: [u8; 4] },
    /// 新しい接続（RST+SYN）で状態をリセットした
    Reset,
    /// 欠落を飛ばした
    Gap(GapReport),
    /// 回復不能な欠落。状態はリセット済み
    Fatal { backlog: usize },
}

/// 1 方向分の TCP ストリーム再構築器
#[derive(Debug)]
pub struct StreamReassembler {
    config: ReassemblerConfig,
    state: StreamState,
    /// 次に流すべきシーケンス番号
    expected: u32,
    /// 直前に流したセグメントの IP identification（診断用）
    last_ip_id: u16,
    /// 順番待ちのセグメント（シーケンス番号 → セグメント）
    pending: BTreeMap<u32, TcpSegment>,
}

impl StreamReassembler {
    pub fn new(config: ReassemblerConfig) -> Self {
        StreamReassembler {
            config,
            state: StreamState::AwaitingFirst,
            expected: 0,
            last_ip_id: 0,
            pending: BTreeMap::new(),
        }
    }

    /// セグメントを 1 つ受け取り、その結果のイベントを返す
    ///
    /// # 戻り値
    /// 発生順のイベント。`Data` はストリームのバイト順に並ぶ。
    pub fn push(&mut self, segment: TcpSegment) -> Vec<StreamEvent> {
        if segment.flags.rst() {
            if segment.flags.syn() {
                self.reset();
                return vec![StreamEvent::Reset];
            }
            return Vec::new();
        }

        // 純粋な ACK はストリームに寄与しない
        if segment.payload.is_empty() {
            return Vec::new();
        }

        let segment = if self.state == StreamState::AwaitingFirst {
            self.expected = segment.sequence;
            self.last_ip_id = segment.ip_id;
            self.state = StreamState::Streaming;
            segment
        } else {
            let seq = segment.sequence;
            match self.trim_delivered(segment) {
                Some(segment) => segment,
                None => {
                    tracing::trace!(seq, "dropping retransmission of delivered data");
                    return Vec::new();
                }
            }
        };

        self.pending.insert(segment.sequence, segment);

        let mut events = Vec::new();
        if let Some(event) = self.check_loss() {
            let fatal = matches!(event, StreamEvent::Fatal { .. });
            events.push(event);
            if fatal {
                return events;
            }
        }

        self.drain(&mut events);
        events
    }

    /// 初期状態に戻す
    pub fn reset(&mut self) {
        self.pending.clear();
        self.expected = 0;
        self.last_ip_id = 0;
        self.state = StreamState::AwaitingFirst;
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// 次に流すべきシーケンス番号
    pub fn expected_sequence(&self) -> u32 {
        self.expected
    }

    /// 順番待ちのセグメント数
    pub fn backlog(&self) -> usize {
        self.pending.len()
    }

    /// 順番待ちのシーケンス番号（昇順、テスト・診断用）
    pub fn pending_sequences(&self) -> Vec<u32> {
        self.pending.keys().copied().collect()
    }

    // ===== Private メソッド =====

    /// 流し終えた範囲と重なる先頭を切り詰める
    ///
    /// # 戻り値
    /// 期待位置以降のデータが残ればそのセグメント（`sequence == expected`）。
    /// すべて流し終えた範囲なら `None`
    fn trim_delivered(&self, mut segment: TcpSegment) -> Option<TcpSegment> {
        // wrapping 比較: sequence < expected のとき正
        let behind = self.expected.wrapping_sub(segment.sequence) as i32;
        if behind <= 0 {
            return Some(segment);
        }

        let behind = behind as usize;
        if behind >= segment.payload.len() {
            return None;
        }
        segment.payload.drain(..behind);
        segment.sequence = self.expected;
        Some(segment)
    }

    /// 期待位置より後ろに取り残された待ちセグメントを片付ける
    ///
    /// # 戻り値
    /// 切り詰めた結果、期待位置から続くセグメントができたら true
    fn settle_overlaps(&mut self) -> bool {
        let expected = self.expected;
        let behind: Vec<u32> = self
            .pending
            .keys()
            .copied()
            .filter(|&seq| (expected.wrapping_sub(seq) as i32) > 0)
            .collect();

        let mut resumed = false;
        for seq in behind {
            let Some(segment) = self.pending.remove(&seq) else {
                continue;
            };
            if let Some(rest) = self.trim_delivered(segment) {
                self.pending.insert(rest.sequence, rest);
                resumed = true;
            }
        }
        resumed
    }

    fn check_loss(&mut self) -> Option<StreamEvent> {
        let backlog = self.pending.len();

        if backlog >= self.config.fatal_backlog {
            self.reset();
            return Some(StreamEvent::Fatal { backlog });
        }

        if backlog <= self.config.gap_threshold {
            return None;
        }

        // 期待位置から scan_limit 以内で最も近い待ちセグメント
        let distance = self
            .pending
            .keys()
            .map(|&seq| seq.wrapping_sub(self.expected))
            .filter(|&d| d < self.config.scan_limit)
            .min()?;
        if distance == 0 {
            return None;
        }

        let from = self.expected;
        let to = from.wrapping_add(distance);
        let ip_id_gap = self
            .pending
            .get(&to)
            .map(|seg| seg.ip_id.wrapping_sub(self.last_ip_id))
            .unwrap_or(0);
        self.expected = to;

        Some(StreamEvent::Gap(GapReport {
            from,
            to,
            skipped_bytes: distance,
            ip_id_gap,
            backlog,
        }))
    }

    fn drain(&mut self, events: &mut Vec<StreamEvent>) {
        loop {
            let Some(segment) = self.pending.remove(&self.expected) else {
                if self.settle_overlaps() {
                    continue;
                }
                break;
            };
            self.expected = self.expected.wrapping_add(segment.payload.len() as u32);
            self.last_ip_id = segment.ip_id;
            events.push(StreamEvent::Data {
                payload: segment.payload,
                src_addr: segment.src_addr,
            });
        }
    }
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new(ReassemblerConfig::default())
    }
}
