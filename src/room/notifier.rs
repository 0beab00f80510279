//! Two-phase disconnect notification
//!
//! Phase one calls every external subscriber in registration order.
//! Phase two runs a single finalizer owned by the room connection, so
//! subscribers always observe the room before it is reset.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::room::handle::DisconnectReason;

pub type DisconnectListener = Arc<dyn Fn(&DisconnectReason) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct DisconnectNotifier {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionId, DisconnectListener)>>,
}

impl DisconnectNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: DisconnectListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Broadcast `reason`, then run `finalize`
    pub fn notify(&self, reason: &DisconnectReason, finalize: impl FnOnce(&DisconnectReason)) {
        let subscribers: Vec<DisconnectListener> =
            self.subscribers.lock().iter().map(|(_, l)| l.clone()).collect();

        for subscriber in &subscribers {
            subscriber(reason);
        }
        finalize(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalizer_runs_last() {
        let notifier = DisconnectNotifier::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["participants", "chat"] {
            let order = order.clone();
            notifier.subscribe(Arc::new(move |_| order.lock().push(name)));
        }

        let log = order.clone();
        notifier.notify(&DisconnectReason::Local, move |_| log.lock().push("finalize"));
        assert_eq!(*order.lock(), vec!["participants", "chat", "finalize"]);
    }

    #[test]
    fn test_unsubscribe() {
        let notifier = DisconnectNotifier::new();
        let id = notifier.subscribe(Arc::new(|_| {}));
        assert_eq!(notifier.subscriber_count(), 1);
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));

        let mut finalized = false;
        notifier.notify(&DisconnectReason::Remote("room completed".into()), |_| finalized = true);
        assert!(finalized);
    }
}
