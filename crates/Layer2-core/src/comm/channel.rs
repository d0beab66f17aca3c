//! Event Channel - 플러그인 간 publish/subscribe
//!
//! `publish`는 현재 구독자에게 구독 순서대로 동기 전달한다.
//! 한 구독자가 실패해도 나머지 구독자에게는 계속 전달된다.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};
use weave_foundation::{ErrorKind, ErrorReport, ErrorTracker, Result};

/// 구독 콜백
pub type EventCallback = Arc<dyn Fn(&Value) -> Result<()> + Send + Sync>;

struct SubscriptionEntry {
    id: u64,
    event: String,
    subscriber: String,
    callback: EventCallback,
}

/// 전달 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// 정상 전달된 구독자 수
    pub delivered: usize,
    /// 실패한 구독자 이름
    pub failed: Vec<String>,
}

struct ChannelInner {
    /// 구독 순서 유지를 위해 Vec 사용 (id 오름차순)
    subscriptions: RwLock<Vec<Arc<SubscriptionEntry>>>,
    next_id: AtomicU64,
    tracker: Arc<ErrorTracker>,
}

impl ChannelInner {
    fn remove(&self, id: u64) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }
}

/// 이벤트 채널
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<ChannelInner>,
}

impl EventChannel {
    pub fn new(tracker: Arc<ErrorTracker>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                subscriptions: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                tracker,
            }),
        }
    }

    /// 구독. 반환된 핸들로 해제한다 (핸들을 버려도 구독은 유지됨)
    pub fn subscribe<F>(
        &self,
        event: impl Into<String>,
        subscriber: impl Into<String>,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&Value) -> Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(SubscriptionEntry {
            id,
            event: event.into(),
            subscriber: subscriber.into(),
            callback: Arc::new(callback),
        });
        debug!(event = %entry.event, subscriber = %entry.subscriber, "Subscribed");
        self.inner.subscriptions.write().push(entry);

        Subscription {
            id,
            channel: Arc::downgrade(&self.inner),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// 이벤트 발행
    pub fn publish(&self, event: &str, payload: &Value) -> PublishReport {
        let targets: Vec<Arc<SubscriptionEntry>> = self
            .inner
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.event == event)
            .cloned()
            .collect();

        let mut report = PublishReport::default();
        for target in targets {
            match (target.callback)(payload) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(event = %event, subscriber = %target.subscriber, error = %e, "Subscriber failed");
                    self.inner.tracker.capture(
                        ErrorReport::from_error(ErrorKind::Communication, &e)
                            .plugin(target.subscriber.clone())
                            .frame(format!("event:{}", event)),
                    );
                    report.failed.push(target.subscriber.clone());
                }
            }
        }
        report
    }

    /// 구독자의 모든 구독 해제. 해제된 개수 반환
    pub fn remove_subscriber(&self, subscriber: &str) -> usize {
        let mut subscriptions = self.inner.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.subscriber != subscriber);
        let removed = before - subscriptions.len();
        if removed > 0 {
            debug!(subscriber = %subscriber, removed, "Removed subscriptions");
        }
        removed
    }

    /// 이벤트별 구독자 수
    pub fn subscriber_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for s in self.inner.subscriptions.read().iter() {
            *counts.entry(s.event.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.subscriptions.read().is_empty()
    }
}

/// 구독 해제 핸들
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    channel: Weak<ChannelInner>,
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// 구독 해제. 여러 번 호출해도 안전하다
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.channel
            .upgrade()
            .map(|inner| inner.remove(self.id))
            .unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use weave_foundation::Error;

    fn channel() -> EventChannel {
        EventChannel::new(Arc::new(ErrorTracker::default()))
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let channel = channel();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let log = log.clone();
            channel.subscribe("user:created", name, move |payload| {
                log.lock().push(format!("{}:{}", name, payload["id"]));
                Ok(())
            });
        }

        let report = channel.publish("user:created", &serde_json::json!({ "id": 7 }));
        assert_eq!(report.delivered, 3);
        assert_eq!(*log.lock(), vec!["first:7", "second:7", "third:7"]);
    }

    #[test]
    fn test_failing_subscriber_does_not_stop_delivery() {
        let channel = channel();
        let reached = Arc::new(AtomicBool::new(false));

        channel.subscribe("e", "bad", |_| Err(Error::Plugin("nope".into())));
        let flag = reached.clone();
        channel.subscribe("e", "good", move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        let report = channel.publish("e", &Value::Null);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, vec!["bad"]);
        assert!(reached.load(Ordering::SeqCst));
        assert_eq!(channel.inner.tracker.len(), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let channel = channel();
        let sub = channel.subscribe("e", "p", |_| Ok(()));
        let other = channel.subscribe("e", "p", |_| Ok(()));

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert!(!sub.is_active());
        assert_eq!(channel.len(), 1);
        assert!(other.is_active());
    }

    #[test]
    fn test_dropping_handle_keeps_subscription() {
        let channel = channel();
        drop(channel.subscribe("e", "p", |_| Ok(())));
        assert_eq!(channel.publish("e", &Value::Null).delivered, 1);
    }

    #[test]
    fn test_remove_subscriber() {
        let channel = channel();
        channel.subscribe("a", "alive", |_| Ok(()));
        channel.subscribe("a", "gone", |_| Ok(()));
        channel.subscribe("b", "gone", |_| Ok(()));

        assert_eq!(channel.remove_subscriber("gone"), 2);
        assert_eq!(channel.subscriber_counts().get("a"), Some(&1));
        assert_eq!(channel.subscriber_counts().get("b"), None);
    }
}
