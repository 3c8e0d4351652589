//! RC4 キーストリームセッション
//!
//! RotMG の TCP ペイロードは方向ごとに固定鍵の RC4 で暗号化されている。
//! 観測者は送信側の暗号初期化より後から聞き始めるため、
//! 「何バイト分のキーストリームが既に消費されたか」を後から探索する必要がある。
//! そのために通常の RC4 に加えて以下の操作を持つ:
//!
//! - `skip(n)`: 出力を捨てて状態だけ n ステップ進める
//! - `fork()`: 独立したコピーを作る（投機的な探索用）
//! - `reset()`: 鍵スケジュール直後の状態に戻す
//! - `step_back()`: 1 ステップ巻き戻す（探索中の覗き見用）

use crate::decode_hex_key;
use crate::error::CryptoError;

/// RC4 の置換テーブルサイズ
const TABLE_LEN: usize = 256;

/// RC4 暗号セッション
///
/// `table` は常に 0..=255 の置換になっている。
/// `init_table` は鍵スケジュール直後のテーブルのコピーで、`reset()` で復元に使う。
///
/// `Clone` はそのまま `fork()` の意味になる（状態を共有しない）。
#[derive(Clone, PartialEq, Eq)]
pub struct CipherSession {
    table: [u8; TABLE_LEN],
    init_table: [u8; TABLE_LEN],
    i: u8,
    j: u8,
}

impl CipherSession {
    /// 生のバイト列鍵からセッションを初期化する（RC4 鍵スケジュール）
    ///
    /// # エラー
    /// - `CryptoError::InvalidKeyLength`: 鍵が空、または 256 バイトを超える
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.is_empty() || key.len() > TABLE_LEN {
            return Err(CryptoError::InvalidKeyLength(key.len()));
        }

        let mut table = [0u8; TABLE_LEN];
        for (n, slot) in table.iter_mut().enumerate() {
            *slot = n as u8;
        }

        let mut j: u8 = 0;
        for n in 0..TABLE_LEN {
            j = j.wrapping_add(table[n]).wrapping_add(key[n % key.len()]);
            table.swap(n, j as usize);
        }

        Ok(CipherSession {
            table,
            init_table: table,
            i: 0,
            j: 0,
        })
    }

    /// 16進文字列の鍵（例: `"c91d9eec420160730d825604e0"`）からセッションを初期化する
    ///
    /// # エラー
    /// - `CryptoError::InvalidHexKey`: 16進として解釈できない
    /// - `CryptoError::InvalidKeyLength`: デコード後の鍵長が不正
    pub fn from_hex_key(key_hex: &str) -> Result<Self, CryptoError> {
        let key = decode_hex_key(key_hex)?;
        Self::new(&key)
    }

    /// キーストリームを 1 バイト生成し、内部状態を 1 ステップ進める
    #[inline]
    pub fn next_keystream_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.table[self.i as usize]);
        self.table.swap(self.i as usize, self.j as usize);
        let k = self.table[self.i as usize].wrapping_add(self.table[self.j as usize]);
        self.table[k as usize]
    }

    /// `buf[offset..]` を先頭から順にキーストリームと XOR する
    ///
    /// RC4 は対称なので暗号化にも復号にも使える。
    /// `offset` がバッファ長以上の場合は何もしない（状態も進めない）。
    pub fn decrypt(&mut self, offset: usize, buf: &mut [u8]) {
        if let Some(tail) = buf.get_mut(offset..) {
            for b in tail {
                *b ^= self.next_keystream_byte();
            }
        }
    }

    /// バッファ全体にキーストリームを適用する（`decrypt(0, buf)` と同じ）
    pub fn apply_keystream(&mut self, buf: &mut [u8]) {
        self.decrypt(0, buf);
    }

    /// 出力を捨てて `n` ステップ分状態を進める
    ///
    /// `n` 回 `next_keystream_byte()` を呼んで結果を捨てるのと同じ状態になる。
    pub fn skip(&mut self, n: usize) -> &mut Self {
        for _ in 0..n {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.table[self.i as usize]);
            self.table.swap(self.i as usize, self.j as usize);
        }
        self
    }

    /// 独立したコピーを作る
    ///
    /// フォーク側をいくら進めても元のセッションの `table` / `i` / `j` は変わらない。
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// 自分の現在状態を `other` に上書きコピーする（アロケーションなし）
    pub fn copy_into(&self, other: &mut CipherSession) {
        other.table = self.table;
        other.init_table = self.init_table;
        other.i = self.i;
        other.j = self.j;
    }

    /// 鍵スケジュール直後の状態に戻す
    pub fn reset(&mut self) {
        self.table = self.init_table;
        self.i = 0;
        self.j = 0;
    }

    /// 1 ステップ巻き戻す
    ///
    /// RC4 の 1 ステップ（i += 1; j += S[i]; swap）は逆算できる:
    /// swap を戻した後の S[i] が j の加算に使われた値そのものになる。
    #[inline]
    pub fn step_back(&mut self) {
        self.table.swap(self.i as usize, self.j as usize);
        self.j = self.j.wrapping_sub(self.table[self.i as usize]);
        self.i = self.i.wrapping_sub(1);
    }

    /// 先頭 4 バイトをビッグエンディアンの i32 として復号した値を返す
    ///
    /// 状態は呼び出し前と同じに戻る（4 ステップ進めて 4 ステップ巻き戻す）。
    pub fn peek_i32(&mut self, ciphertext: &[u8; 4]) -> i32 {
        let mut plain = [0u8; 4];
        for (p, c) in plain.iter_mut().zip(ciphertext) {
            *p = c ^ self.next_keystream_byte();
        }
        for _ in 0..4 {
            self.step_back();
        }
        i32::from_be_bytes(plain)
    }

    /// 現在のカーソル `(i, j)`（テスト・診断用）
    pub fn cursors(&self) -> (u8, u8) {
        (self.i, self.j)
    }

    /// 現在の置換テーブル（テスト・診断用）
    pub fn table(&self) -> &[u8; TABLE_LEN] {
        &self.table
    }
}

impl core::fmt::Debug for CipherSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // テーブル本体は 256 バイトあるので出さない
        f.debug_struct("CipherSession")
            .field("i", &self.i)
            .field("j", &self.j)
            .finish_non_exhaustive()
    }
}
