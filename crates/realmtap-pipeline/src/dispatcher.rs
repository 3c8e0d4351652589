//! デコード済みメッセージの購読と配信
//!
//! ## 配信順
//! ```text
//! publish(message)
//!   1. message.kind() を購読しているハンドラ（登録順）
//!   2. Topic::All を購読しているハンドラ（登録順）
//! ```
//!
//! ハンドラの中から `subscribe` / `unsubscribe` を呼んでもよい。
//! 配信中の解除は配信が終わるまで保留し、配信中の追加は次の配信から有効になる。

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use realmtap_proto::{Message, MessageKind};

/// 購読ハンドラ
pub type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

/// 購読対象
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// すべてのメッセージ
    All,
    /// 特定の種別のみ
    Kind(MessageKind),
}

impl From<MessageKind> for Topic {
    fn from(kind: MessageKind) -> Self {
        Topic::Kind(kind)
    }
}

/// `unsubscribe` に渡す購読 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    topic: Topic,
    handler: Handler,
}

#[derive(Default)]
struct Inner {
    subscribers: Vec<Subscriber>,
    next_id: u64,
    /// 実行中の publish の数（ハンドラからの再入を含む）
    publishing: usize,
    /// 配信中に解除された購読
    pending_removals: Vec<SubscriptionId>,
}

/// メッセージ配信器
///
/// 処理スレッドとアプリケーションで `Arc` 共有する。
/// ハンドラはロックを外した状態で呼ぶ。
#[derive(Default)]
pub struct Dispatcher {
    inner: Mutex<Inner>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// ハンドラを登録する
    ///
    /// # 戻り値
    /// 解除に使う ID
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, handler: F) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let mut inner = self.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.subscribers.push(Subscriber {
            id,
            topic,
            handler: Arc::new(handler),
        });
        tracing::debug!(?topic, id = id.0, "subscribed");
        id
    }

    /// 購読を解除する
    ///
    /// 配信中に呼ばれた場合、実際の削除はその配信が終わってから行う。
    ///
    /// # 戻り値
    /// 登録されていた（まだ解除されていなかった）ら true
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let exists = inner.subscribers.iter().any(|s| s.id == id)
            && !inner.pending_removals.contains(&id);
        if !exists {
            return false;
        }

        if inner.publishing > 0 {
            inner.pending_removals.push(id);
        } else {
            inner.subscribers.retain(|s| s.id != id);
        }
        tracing::debug!(id = id.0, "unsubscribed");
        true
    }

    /// メッセージを配信する
    ///
    /// パニックしたハンドラはログに残して次のハンドラへ進む。
    ///
    /// # 戻り値
    /// 呼び出したハンドラの数
    pub fn publish(&self, message: &Message) -> usize {
        let handlers = {
            let mut inner = self.lock();
            inner.publishing += 1;
            inner.snapshot(message.kind())
        };

        for handler in &handlers {
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler(message)));
            if result.is_err() {
                tracing::warn!(kind = %message.kind(), "subscriber panicked, continuing");
            }
        }

        let mut inner = self.lock();
        inner.publishing -= 1;
        if inner.publishing == 0 && !inner.pending_removals.is_empty() {
            let removals = std::mem::take(&mut inner.pending_removals);
            inner.subscribers.retain(|s| !removals.contains(&s.id));
        }
        handlers.len()
    }

    /// 登録中のハンドラ数（解除保留中を除く）
    pub fn len(&self) -> usize {
        let inner = self.lock();
        inner.subscribers.len() - inner.pending_removals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ===== Private メソッド =====

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    /// 配信対象を配信順に並べて複製する
    fn snapshot(&self, kind: MessageKind) -> Vec<Handler> {
        let by_kind = self
            .subscribers
            .iter()
            .filter(|s| s.topic == Topic::Kind(kind));
        let wildcard = self.subscribers.iter().filter(|s| s.topic == Topic::All);
        by_kind
            .chain(wildcard)
            .filter(|s| !self.pending_removals.contains(&s.id))
            .map(|s| Arc::clone(&s.handler))
            .collect()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Dispatcher")
            .field("subscribers", &inner.subscribers.len())
            .field("publishing", &inner.publishing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realmtap_proto::{MovePacket, ServerAddress};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tick_message() -> Message {
        Message::Move(MovePacket {
            tick_id: 1,
            time: 0,
            records: Vec::new(),
        })
    }

    fn address_message() -> Message {
        Message::ServerAddress(ServerAddress::new([1, 2, 3, 4]))
    }

    #[test]
    fn test_type_subscribers_before_wildcard() {
        let dispatcher = Dispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (topic, label) in [
            (Topic::All, "all-1"),
            (Topic::Kind(MessageKind::Move), "move-1"),
            (Topic::All, "all-2"),
            (Topic::Kind(MessageKind::Move), "move-2"),
            (Topic::Kind(MessageKind::Text), "text"),
        ] {
            let order = Arc::clone(&order);
            dispatcher.subscribe(topic, move |_| order.lock().unwrap().push(label));
        }

        assert_eq!(dispatcher.publish(&tick_message()), 4);
        assert_eq!(
            *order.lock().unwrap(),
            vec!["move-1", "move-2", "all-1", "all-2"]
        );
    }

    #[test]
    fn test_unsubscribe_outside_publish() {
        let dispatcher = Dispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = {
            let count = Arc::clone(&count);
            dispatcher.subscribe(Topic::All, move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        dispatcher.publish(&address_message());
        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        dispatcher.publish(&address_message());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_unsubscribe_during_publish_is_deferred() {
        let dispatcher = Arc::new(Dispatcher::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let victim_id = Arc::new(Mutex::new(None));

        // 1 番目のハンドラが 2 番目を解除する
        {
            let dispatcher_ref = Arc::downgrade(&dispatcher);
            let victim_id = Arc::clone(&victim_id);
            dispatcher.subscribe(Topic::All, move |_| {
                if let (Some(d), Some(id)) = (dispatcher_ref.upgrade(), *victim_id.lock().unwrap()) {
                    assert!(d.unsubscribe(id));
                }
            });
        }
        let id = {
            let calls = Arc::clone(&calls);
            dispatcher.subscribe(Topic::All, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        *victim_id.lock().unwrap() = Some(id);

        // この配信では 2 番目も呼ばれる
        assert_eq!(dispatcher.publish(&address_message()), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // 次からは呼ばれない
        assert_eq!(dispatcher.publish(&address_message()), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.len(), 1);
    }

    #[test]
    fn test_subscribe_during_publish_applies_next_time() {
        let dispatcher = Arc::new(Dispatcher::new());
        let late_calls = Arc::new(AtomicUsize::new(0));
        {
            let dispatcher_ref = Arc::downgrade(&dispatcher);
            let late_calls = Arc::clone(&late_calls);
            dispatcher.subscribe(MessageKind::ServerAddress, move |_| {
                if let Some(d) = dispatcher_ref.upgrade() {
                    let late_calls = Arc::clone(&late_calls);
                    d.subscribe(Topic::All, move |_| {
                        late_calls.fetch_add(1, Ordering::SeqCst);
                    });
                }
            });
        }

        dispatcher.publish(&address_message());
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        dispatcher.publish(&tick_message());
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_subscriber_does_not_stop_others() {
        let dispatcher = Dispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        dispatcher.subscribe(Topic::All, |_| panic!("boom"));
        {
            let count = Arc::clone(&count);
            dispatcher.subscribe(Topic::All, move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(dispatcher.publish(&tick_message()), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // publishing カウンタが戻っているので即時解除できる
        let id = dispatcher.subscribe(Topic::All, |_| {});
        assert!(dispatcher.unsubscribe(id));
        assert_eq!(dispatcher.len(), 2);
    }
}
