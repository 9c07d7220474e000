//! Registry of listeners attached to a connection.
//!
//! `ListenerRegistry` hands out [`ListenerId`]s and fans notifications out to
//! every registered [`ConnectionListener`]. Dispatch works on a snapshot of
//! the registered listeners so a callback may unsubscribe itself, or others,
//! without deadlocking the map.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;
use dashmap::DashMap;

use super::{ConnectionError, ConnectionListener, ListenerId};

/// Concurrent registry of listeners keyed by [`ListenerId`].
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: DashMap<ListenerId, Arc<dyn ConnectionListener>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register a listener and return its identifier.
    pub fn insert(&self, listener: Arc<dyn ConnectionListener>) -> ListenerId {
        let id = ListenerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(id, listener);
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool { self.listeners.remove(&id).is_some() }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize { self.listeners.len() }

    /// Returns `true` when no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.listeners.is_empty() }

    /// Deliver a message to every listener.
    pub fn dispatch_message(&self, payload: &Bytes) {
        for listener in self.snapshot() {
            listener.on_message(payload.clone());
        }
    }

    /// Deliver an error to every listener.
    pub fn dispatch_error(&self, error: &ConnectionError) {
        for listener in self.snapshot() {
            listener.on_error(error);
        }
    }

    /// Notify every listener that the connection closed.
    pub fn dispatch_close(&self) {
        for listener in self.snapshot() {
            listener.on_close();
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn ConnectionListener>> {
        self.listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}
