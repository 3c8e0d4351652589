//! キャプチャスレッド → 処理スレッドの受け渡しキュー

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// 既定の初期容量
pub const DEFAULT_CAPACITY: usize = 32;

/// 停止フラグを確認する間隔
const STOP_POLL: Duration = Duration::from_millis(50);

struct Queue<T> {
    items: VecDeque<T>,
    /// 論理容量（満杯になったら倍にする）
    capacity: usize,
}

/// 容量が倍々に伸びる FIFO
///
/// 書き込み側（キャプチャ）はブロックも取りこぼしもしない。
/// 読み出し側（処理スレッド）は空のとき条件変数で待つ。
/// push と pop は 1 つの Mutex で守る。
pub struct InterFrameBuffer<T> {
    queue: Mutex<Queue<T>>,
    not_empty: Condvar,
}

impl<T> InterFrameBuffer<T> {
    /// 初期容量を指定して生成する（0 は 1 として扱う）
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        InterFrameBuffer {
            queue: Mutex::new(Queue {
                items: VecDeque::with_capacity(capacity),
                capacity,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// 末尾に追加し、待っている読み出し側を起こす
    pub fn push(&self, item: T) {
        let mut queue = self.lock();
        if queue.items.len() == queue.capacity {
            queue.capacity *= 2;
            let additional = queue.capacity - queue.items.len();
            queue.items.reserve(additional);
            tracing::debug!(capacity = queue.capacity, "frame buffer grown");
        }
        queue.items.push_back(item);
        drop(queue);
        self.not_empty.notify_one();
    }

    /// 先頭を取り出す（空なら `None`、待たない）
    pub fn pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// 先頭を取り出す。空なら届くか `stop` が立つまで待つ
    ///
    /// # 戻り値
    /// - `Some(item)`: 取り出した要素
    /// - `None`: `stop` が立った
    pub fn pop_wait(&self, stop: &AtomicBool) -> Option<T> {
        let mut queue = self.lock();
        loop {
            if let Some(item) = queue.items.pop_front() {
                return Some(item);
            }
            if stop.load(Ordering::Acquire) {
                return None;
            }
            queue = self
                .not_empty
                .wait_timeout(queue, STOP_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// 待っているすべての読み出し側を起こす（停止時に使う）
    pub fn wake_all(&self) {
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// 現在の論理容量
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// すべて捨てる
    pub fn clear(&self) {
        self.lock().items.clear();
    }

    // ===== Private メソッド =====

    fn lock(&self) -> MutexGuard<'_, Queue<T>> {
        // 要素の移動だけなので、パニックしたスレッドがいても中身は壊れていない
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for InterFrameBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
