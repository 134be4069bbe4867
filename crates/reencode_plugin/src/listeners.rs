//! Event listener registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value;

/// Callback receiving an event's JSON payload.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

struct Entry {
    id: u64,
    event: String,
    listener: Listener,
}

/// Listeners keyed by event name, notified in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    entries: RwLock<Vec<Entry>>,
}

impl ListenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(self: &Arc<Self>, event: &str, listener: Listener) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().push(Entry {
            id,
            event: event.to_string(),
            listener,
        });
        tracing::debug!(event, id, "Listener added");
        ListenerHandle {
            id,
            registry: Arc::downgrade(self),
        }
    }

    pub fn remove_all(&self) {
        let removed = std::mem::take(&mut *self.entries.write()).len();
        tracing::debug!(removed, "Removed all listeners");
    }

    pub fn count(&self, event: &str) -> usize {
        self.entries.read().iter().filter(|e| e.event == event).count()
    }

    /// Call every listener for `event`. Listeners may add or remove
    /// listeners; the change applies from the next event.
    pub fn notify(&self, event: &str, data: &Value) {
        let listeners: Vec<Listener> = self
            .entries
            .read()
            .iter()
            .filter(|e| e.event == event)
            .map(|e| Arc::clone(&e.listener))
            .collect();
        for listener in listeners {
            listener(data);
        }
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }
}

/// Returned by `add`; removes that one listener.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl ListenerHandle {
    /// Returns false if the listener was already gone.
    pub fn remove(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.id))
    }
}
