// Replaces the source runtime's process-wide `VloVersionListener` registry
// (see [9. DESIGN NOTES]): an explicit event bus owned by the runtime
// instance rather than a global. `subscribe` returns a handle whose `Drop`
// unsubscribes, so listeners never have to remember to clean up.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

type ListenerId = u64;

struct Inner<T> {
    next_id: ListenerId,
    listeners: BTreeMap<ListenerId, Arc<dyn Fn(&T) + Send + Sync>>,
}

/// A process-local, instance-owned publish/subscribe point. `notify`
/// iterates a snapshot of the current listeners, so a listener added or
/// dropped during a notification never observes a torn iteration.
pub struct EventBus<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        EventBus { inner: self.inner.clone() }
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        EventBus {
            inner: Arc::new(Mutex::new(Inner { next_id: 0, listeners: BTreeMap::new() })),
        }
    }
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().expect("event bus mutex poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.insert(id, Arc::new(listener));
        Subscription { bus: self.inner.clone(), id }
    }

    pub fn notify(&self, event: &T) {
        // Snapshot the listeners and release the lock before invoking any of
        // them, so a listener that drops a `Subscription` or calls
        // `subscribe`/`listener_count` on this same bus doesn't deadlock.
        let snapshot: Vec<_> = {
            let inner = self.inner.lock().expect("event bus mutex poisoned");
            inner.listeners.values().cloned().collect()
        };
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().expect("event bus mutex poisoned").listeners.len()
    }
}

/// A live subscription. Dropping it unsubscribes the listener.
pub struct Subscription<T> {
    bus: Arc<Mutex<Inner<T>>>,
    id: ListenerId,
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.bus.lock() {
            inner.listeners.remove(&self.id);
        }
    }
}
