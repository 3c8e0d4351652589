//! tick 番号によるキーストリーム同期の維持
//!
//! サーバーの tick 系フレーム（Incoming: NewTick, Outgoing: Move）は
//! ペイロード先頭に 1 ずつ増える tick 番号（i32 BE）を持つ。
//! 同期済みの間はこれを毎回確認し、崩れたら探索状態に戻る。
//!
//! ## 状態遷移
//!
//! ```text
//!                 tick A を記録           tick B で delta 探索成功
//!  Unsynced ──────────────────▶ Unsynced ─────────────────────────▶ Synced
//!  (A なし)                     (A あり)                              │
//!     ▲                            │ 探索失敗: B を新しい A にする      │
//!     │                            ▼                                   │
//!     └──────────── tick 不連続 (reset + このフレームを A に) ◀─────────┘
//! ```
//!
//! 新しい接続（RST+SYN）では送信側のキーストリームも先頭から始まるので、
//! `reset_connection()` で探索なしに Synced（基準 tick 未知）へ入る。

use crate::align::Aligner;
use crate::rc4::CipherSession;

/// tick 番号の長さ（i32 BE）
const TICK_LEN: usize = 4;

/// 1 フレーム処理の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// 同期済み。ペイロードは復号済み
    Ready,
    /// このフレームで同期が取れた。ペイロードは復号済み
    Aligned {
        /// 探索起点から tick A のペイロード先頭までのオフセット
        offset: usize,
        /// このフレームの tick 番号
        tick: i32,
    },
    /// 未同期。フレームは探索材料として記録した（ペイロードは暗号文のまま）
    Searching,
    /// delta 探索で見つからなかった。このフレームを次の tick A にする
    SearchFailed {
        /// 探索に使った A-B 間のバイト数
        delta: usize,
    },
    /// tick 番号が連続していなかった。暗号状態をリセットし探索に戻った
    Desynced {
        /// 期待した tick 番号
        expected: i32,
        /// 実際に復号された値
        actual: i32,
    },
}

impl SyncStatus {
    /// ペイロードが復号済みかどうか
    pub fn is_decrypted(&self) -> bool {
        matches!(self, SyncStatus::Ready | SyncStatus::Aligned { .. })
    }
}

/// 内部状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// 探索中
    Unsynced {
        /// 1 つ目の tick（暗号文）
        first_tick: Option<[u8; TICK_LEN]>,
        /// tick A のペイロード先頭から数えた暗号化バイト数
        bytes_since: usize,
    },
    /// 同期済み
    Synced {
        /// 直前の tick 番号（接続開始直後は未知）
        last_tick: Option<i32>,
    },
}

/// 方向ごとのキーストリーム同期
///
/// 正規の `CipherSession` を所有し、フレームのペイロードを到着順に 1 回ずつ消費する。
pub struct TickSync {
    cipher: CipherSession,
    aligner: Aligner,
    state: State,
}

impl TickSync {
    /// 未同期状態で生成する
    ///
    /// # 引数
    /// - `cipher`: 鍵スケジュール直後のセッション
    /// - `aligner`: 探索範囲を持つ探索器
    pub fn new(cipher: CipherSession, aligner: Aligner) -> Self {
        TickSync {
            cipher,
            aligner,
            state: State::Unsynced {
                first_tick: None,
                bytes_since: 0,
            },
        }
    }

    /// 1 フレーム分のペイロードを処理する
    ///
    /// 戻り値が `Ready` / `Aligned` の場合のみ `payload` は平文に置き換わっている。
    ///
    /// # 引数
    /// - `payload`: フレームヘッダー（5 バイト）を除いた暗号文
    /// - `is_tick`: この方向の tick 系フレームかどうか
    pub fn process(&mut self, payload: &mut [u8], is_tick: bool) -> SyncStatus {
        if let State::Synced { last_tick } = self.state {
            if !is_tick || payload.len() < TICK_LEN {
                self.cipher.apply_keystream(payload);
                return SyncStatus::Ready;
            }

            let actual = self.cipher.peek_i32(&tick_bytes(payload));
            match last_tick {
                Some(prev) if prev.wrapping_add(1) != actual => {
                    self.cipher.reset();
                    self.state = State::Unsynced {
                        first_tick: None,
                        bytes_since: 0,
                    };
                    // このフレームを新しい tick A として記録する
                    self.process_unsynced(payload, is_tick);
                    return SyncStatus::Desynced {
                        expected: prev.wrapping_add(1),
                        actual,
                    };
                }
                _ => {
                    self.cipher.apply_keystream(payload);
                    self.state = State::Synced {
                        last_tick: Some(actual),
                    };
                    return SyncStatus::Ready;
                }
            }
        }

        self.process_unsynced(payload, is_tick)
    }

    /// 新しい接続の開始に合わせて鍵スケジュール直後へ戻す
    ///
    /// 接続の先頭から観測しているので探索は不要。基準 tick は未知になる。
    pub fn reset_connection(&mut self) {
        self.cipher.reset();
        self.state = State::Synced { last_tick: None };
    }

    /// 同期を捨てて探索状態に戻す
    pub fn desync(&mut self) {
        self.cipher.reset();
        self.state = State::Unsynced {
            first_tick: None,
            bytes_since: 0,
        };
    }

    /// 同期済みかどうか
    pub fn is_synced(&self) -> bool {
        matches!(self.state, State::Synced { .. })
    }

    /// 直前に確認した tick 番号
    pub fn last_tick(&self) -> Option<i32> {
        match self.state {
            State::Synced { last_tick } => last_tick,
            State::Unsynced { .. } => None,
        }
    }

    /// 正規セッション（テスト・診断用）
    pub fn cipher(&self) -> &CipherSession {
        &self.cipher
    }

    /// 探索器
    pub fn aligner(&self) -> &Aligner {
        &self.aligner
    }

    // ===== Private メソッド =====

    fn process_unsynced(&mut self, payload: &mut [u8], is_tick: bool) -> SyncStatus {
        let State::Unsynced {
            first_tick,
            bytes_since,
        } = self.state
        else {
            return SyncStatus::Searching;
        };

        if !is_tick || payload.len() < TICK_LEN {
            self.state = State::Unsynced {
                first_tick,
                bytes_since: bytes_since + payload.len(),
            };
            return SyncStatus::Searching;
        }

        let tick_b = tick_bytes(payload);
        let Some(tick_a) = first_tick else {
            self.state = State::Unsynced {
                first_tick: Some(tick_b),
                bytes_since: payload.len(),
            };
            return SyncStatus::Searching;
        };

        self.cipher.reset();
        match self
            .aligner
            .sync_by_delta(&mut self.cipher, &tick_a, &tick_b, bytes_since)
        {
            Ok(offset) => {
                // A の先頭 → B の先頭まで進めてから B を復号する
                self.cipher.skip(bytes_since);
                self.cipher.apply_keystream(payload);
                let tick = i32::from_be_bytes(tick_bytes(payload));
                self.state = State::Synced {
                    last_tick: Some(tick),
                };
                SyncStatus::Aligned { offset, tick }
            }
            Err(_) => {
                self.state = State::Unsynced {
                    first_tick: Some(tick_b),
                    bytes_since: payload.len(),
                };
                SyncStatus::SearchFailed { delta: bytes_since }
            }
        }
    }
}

impl core::fmt::Debug for TickSync {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TickSync")
            .field("state", &self.state)
            .field("cipher", &self.cipher)
            .finish()
    }
}

fn tick_bytes(payload: &[u8]) -> [u8; TICK_LEN] {
    let mut tick = [0u8; TICK_LEN];
    tick.copy_from_slice(&payload[..TICK_LEN]);
    tick
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    fn session() -> CipherSession {
        CipherSession::from_hex_key(crate::INCOMING_KEY).unwrap()
    }

    /// 送信側: オフセット k から暗号化を始めるセッション
    struct Sender {
        cipher: CipherSession,
    }

    impl Sender {
        fn at(k: usize) -> Self {
            let mut cipher = session();
            cipher.skip(k);
            Sender { cipher }
        }

        fn tick(&mut self, tick: i32, extra: usize) -> Vec<u8> {
            let mut payload = tick.to_be_bytes().to_vec();
            payload.extend(core::iter::repeat(0x11).take(extra));
            self.cipher.apply_keystream(&mut payload);
            payload
        }

        fn other(&mut self, len: usize) -> Vec<u8> {
            let mut payload = vec![0x22; len];
            self.cipher.apply_keystream(&mut payload);
            payload
        }
    }

    fn sync() -> TickSync {
        TickSync::new(session(), Aligner::new(50_000))
    }

    #[test]
    fn test_aligns_on_second_tick() {
        let mut sender = Sender::at(3_000);
        let mut sync = sync();

        let mut a = sender.tick(10, 20);
        let mut other = sender.other(33);
        let mut b = sender.tick(11, 8);

        assert_eq!(sync.process(&mut a, true), SyncStatus::Searching);
        assert_eq!(sync.process(&mut other, false), SyncStatus::Searching);
        assert_eq!(
            sync.process(&mut b, true),
            SyncStatus::Aligned {
                offset: 3_000,
                tick: 11
            }
        );
        // B は復号済み
        assert_eq!(&b[..4], &11i32.to_be_bytes());
        assert!(b[4..].iter().all(|&x| x == 0x11));

        // 以降は同期したまま
        let mut c = sender.other(5);
        assert_eq!(sync.process(&mut c, false), SyncStatus::Ready);
        assert_eq!(c, vec![0x22; 5]);

        let mut d = sender.tick(12, 0);
        assert_eq!(sync.process(&mut d, true), SyncStatus::Ready);
        assert_eq!(sync.last_tick(), Some(12));
    }

    #[test]
    fn test_desync_on_tick_gap() {
        let mut sender = Sender::at(0);
        let mut sync = sync();
        sync.reset_connection();

        let mut t1 = sender.tick(1, 4);
        assert_eq!(sync.process(&mut t1, true), SyncStatus::Ready);

        // 1 フレーム分観測できなかった
        sender.other(40);

        let mut t2 = sender.tick(2, 4);
        let status = sync.process(&mut t2, true);
        assert!(matches!(status, SyncStatus::Desynced { expected: 2, .. }));
        assert!(!sync.is_synced());

        // 次の tick で再同期する（t2 は接続先頭から t1: 8 + 欠落 40 バイト目）
        let mut t3 = sender.tick(3, 4);
        assert_eq!(
            sync.process(&mut t3, true),
            SyncStatus::Aligned {
                offset: 8 + 40,
                tick: 3
            }
        );
    }

    #[test]
    fn test_reset_connection_has_unknown_baseline() {
        let mut sender = Sender::at(0);
        let mut sync = sync();
        sync.reset_connection();
        assert!(sync.is_synced());
        assert_eq!(sync.last_tick(), None);

        // 基準が未知なので最初の tick は何番でも受け入れる
        let mut t = sender.tick(9_999, 0);
        assert_eq!(sync.process(&mut t, true), SyncStatus::Ready);
        assert_eq!(sync.last_tick(), Some(9_999));
    }

    #[test]
    fn test_search_failure_keeps_latest_tick() {
        let mut sync = TickSync::new(session(), Aligner::new(16));
        let mut sender = Sender::at(10_000);

        let mut a = sender.tick(1, 0);
        let mut b = sender.tick(2, 0);
        assert_eq!(sync.process(&mut a, true), SyncStatus::Searching);
        assert_eq!(
            sync.process(&mut b, true),
            SyncStatus::SearchFailed { delta: 4 }
        );
        assert!(!sync.is_synced());
    }

    #[test]
    fn test_short_tick_payload_counts_as_data() {
        let mut sync = sync();
        let mut short = vec![1u8, 2];
        assert_eq!(sync.process(&mut short, true), SyncStatus::Searching);
        assert_eq!(short, vec![1, 2]);
    }
}
