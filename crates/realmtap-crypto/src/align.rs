//! キーストリーム位置の総当たり探索
//!
//! 観測開始時点で既に何バイトのキーストリームが消費されていたかを、
//! 既知の関係を持つ暗号文から探す。
//!
//! - **delta 探索**（主）: サーバーの tick 番号は 1 ずつ増える。
//!   連続する 2 つの tick フレーム A, B と、その間に流れたバイト数 `delta` が分かれば、
//!   候補オフセット `o` で A を、`o + delta` で B を復号して `B == A + 1` となる `o` を探せる。
//! - **既知平文探索**（副）: チャットの送信者名が分かっている場合、
//!   Text フレームの先頭（長さ付き文字列）と一致するオフセットを探す。

use alloc::vec::Vec;

use crate::error::CryptoError;
use crate::rc4::CipherSession;

/// 探索する候補オフセット数の上限
pub const SEARCH_SIZE: usize = 10_000_000;

/// Text フレーム中の送信者名（長さプレフィックス）の位置
///
/// フレームヘッダー（length: 4 + type: 1）の直後。
pub const TEXT_NAME_OFFSET: usize = 5;

/// 送信者名を `[len: u16 BE][utf8 bytes]` の形にエンコードする
///
/// 名前が 65535 バイトを超える場合は切り詰める。
pub fn encode_name(name: &str) -> Vec<u8> {
    let bytes = name.as_bytes();
    let len = bytes.len().min(u16::MAX as usize);
    let mut target = Vec::with_capacity(2 + len);
    target.extend_from_slice(&(len as u16).to_be_bytes());
    target.extend_from_slice(&bytes[..len]);
    target
}

/// アライメント探索器
///
/// 探索範囲 `[0, search_size)` を総当たりする。
/// 成功した場合は渡された `cipher` を見つかったオフセット分だけ実際に進める。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aligner {
    search_size: usize,
}

impl Aligner {
    /// 探索上限を指定して生成する
    pub fn new(search_size: usize) -> Self {
        Aligner { search_size }
    }

    /// 探索上限
    pub fn search_size(&self) -> usize {
        self.search_size
    }

    /// 連続する 2 つの tick 観測から位置を探す
    ///
    /// # 引数
    /// - `cipher`: 探索の起点となるセッション（通常は `reset()` 直後）
    /// - `tick_a`: 1 つ目の tick フレームのペイロード先頭 4 バイト（暗号文）
    /// - `tick_b`: 2 つ目の tick フレームのペイロード先頭 4 バイト（暗号文）
    /// - `delta`: A のペイロード先頭から B のペイロード先頭までの暗号化バイト数
    ///
    /// # 戻り値
    /// 起点から A のペイロード先頭までのオフセット。`cipher` はその分だけ進んだ状態になる。
    ///
    /// # エラー
    /// - `CryptoError::AlignmentNotFound`: 探索範囲内に見つからない
    pub fn sync_by_delta(
        &self,
        cipher: &mut CipherSession,
        tick_a: &[u8; 4],
        tick_b: &[u8; 4],
        delta: usize,
    ) -> Result<usize, CryptoError> {
        let mut finder_a = cipher.fork();
        let mut finder_b = cipher.fork();
        finder_b.skip(delta);

        // 各候補で 0 から進め直さず、両カーソルを 1 ステップずつ進める
        for offset in 0..self.search_size {
            let a = finder_a.peek_i32(tick_a);
            let b = finder_b.peek_i32(tick_b);
            if a.wrapping_add(1) == b {
                cipher.skip(offset);
                return Ok(offset);
            }
            finder_a.skip(1);
            finder_b.skip(1);
        }

        Err(CryptoError::AlignmentNotFound {
            searched: self.search_size,
        })
    }

    /// 送信者名が既知の Text フレームから位置を探す
    ///
    /// # 引数
    /// - `cipher`: 探索の起点となるセッション
    /// - `text_frame`: Text フレーム全体（ヘッダー 5 バイトを含む、暗号文のまま）
    /// - `name`: 送信者名
    ///
    /// # 戻り値
    /// 起点から Text フレームのペイロード先頭までのオフセット。
    /// `cipher` はその分だけ進んだ状態になる。
    ///
    /// # エラー
    /// - `CryptoError::ObservationTooShort`: フレームが名前を含むのに足りない
    /// - `CryptoError::AlignmentNotFound`: 探索範囲内に見つからない
    pub fn sync_by_text(
        &self,
        cipher: &mut CipherSession,
        text_frame: &[u8],
        name: &str,
    ) -> Result<usize, CryptoError> {
        let target = encode_name(name);
        let needed = TEXT_NAME_OFFSET + target.len();
        let window = text_frame
            .get(TEXT_NAME_OFFSET..needed)
            .ok_or(CryptoError::ObservationTooShort {
                needed,
                actual: text_frame.len(),
            })?;

        let mut finder = cipher.fork();
        let mut probe = cipher.fork();

        for offset in 0..self.search_size {
            let k = finder.next_keystream_byte();
            if window[0] ^ k != target[0] {
                continue;
            }

            // 先頭 1 バイトが一致したときだけ残りを比較する
            finder.copy_into(&mut probe);
            let matched = window[1..]
                .iter()
                .zip(&target[1..])
                .all(|(c, t)| c ^ probe.next_keystream_byte() == *t);
            if matched {
                cipher.skip(offset);
                return Ok(offset);
            }
        }

        Err(CryptoError::AlignmentNotFound {
            searched: self.search_size,
        })
    }
}

impl Default for Aligner {
    fn default() -> Self {
        Self::new(SEARCH_SIZE)
    }
}
