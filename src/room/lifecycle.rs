//! Environment page-lifecycle signals
//!
//! The host environment (browser shell, desktop window, or the demo
//! binary's Ctrl-C handler) emits signals here; listeners are plain
//! callbacks registered and removed by id.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Environment signal that the page is going away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleSignal {
    BeforeUnload,
    /// Emitted by mobile browsers instead of a reliable unload
    PageHidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFactor {
    #[default]
    Desktop,
    Mobile,
}

/// Identifies a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type SignalListener = Arc<dyn Fn() + Send + Sync>;

struct Registration {
    id: ListenerId,
    signal: LifecycleSignal,
    listener: SignalListener,
}

/// Registry of page-lifecycle listeners
pub struct PageLifecycle {
    form_factor: FormFactor,
    next_id: AtomicU64,
    listeners: Mutex<Vec<Registration>>,
}

impl PageLifecycle {
    pub fn new(form_factor: FormFactor) -> Self {
        Self {
            form_factor,
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn is_mobile(&self) -> bool {
        self.form_factor == FormFactor::Mobile
    }

    /// Signals that mean "the user is leaving" on this form factor
    pub fn teardown_signals(&self) -> &'static [LifecycleSignal] {
        if self.is_mobile() {
            &[LifecycleSignal::BeforeUnload, LifecycleSignal::PageHidden]
        } else {
            &[LifecycleSignal::BeforeUnload]
        }
    }

    pub fn add_listener(&self, signal: LifecycleSignal, listener: SignalListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(Registration { id, signal, listener });
        id
    }

    /// Returns false if `id` was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self, signal: LifecycleSignal) -> usize {
        self.listeners.lock().iter().filter(|r| r.signal == signal).count()
    }

    /// Invoke every listener for `signal`; returns how many ran.
    /// Listeners may add or remove registrations while running.
    pub fn emit(&self, signal: LifecycleSignal) -> usize {
        let listeners: Vec<SignalListener> = self
            .listeners
            .lock()
            .iter()
            .filter(|r| r.signal == signal)
            .map(|r| r.listener.clone())
            .collect();

        tracing::debug!("Emitting {:?} to {} listeners", signal, listeners.len());
        for listener in &listeners {
            listener();
        }
        listeners.len()
    }
}

impl Default for PageLifecycle {
    fn default() -> Self {
        Self::new(FormFactor::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_add_emit_remove() {
        let lifecycle = PageLifecycle::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        let id = lifecycle.add_listener(
            LifecycleSignal::BeforeUnload,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(lifecycle.emit(LifecycleSignal::PageHidden), 0);
        assert_eq!(lifecycle.emit(LifecycleSignal::BeforeUnload), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(lifecycle.remove_listener(id));
        assert!(!lifecycle.remove_listener(id));
        assert_eq!(lifecycle.listener_count(LifecycleSignal::BeforeUnload), 0);
    }

    #[test]
    fn test_listener_can_unregister_itself() {
        let lifecycle = Arc::new(PageLifecycle::new(FormFactor::Mobile));
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let registry = lifecycle.clone();
        let own_id = slot.clone();
        let id = lifecycle.add_listener(
            LifecycleSignal::PageHidden,
            Arc::new(move || {
                if let Some(id) = *own_id.lock() {
                    registry.remove_listener(id);
                }
            }),
        );
        *slot.lock() = Some(id);

        assert_eq!(lifecycle.emit(LifecycleSignal::PageHidden), 1);
        assert_eq!(lifecycle.listener_count(LifecycleSignal::PageHidden), 0);
    }

    #[test]
    fn test_teardown_signals() {
        assert_eq!(PageLifecycle::default().teardown_signals(), &[LifecycleSignal::BeforeUnload]);
        assert!(PageLifecycle::new(FormFactor::Mobile)
            .teardown_signals()
            .contains(&LifecycleSignal::PageHidden));
    }
}
