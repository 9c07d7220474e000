//! In-process connection driven directly by the caller.
//!
//! `MemoryConnection` has no socket behind it: whoever owns it pushes
//! messages, errors and state changes by hand. It is the connection used for
//! embedding a producer in the same process and for exercising the adapter in
//! tests.

use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use bytes::Bytes;

use super::{
    ConnectionError,
    ConnectionListener,
    ListenerId,
    ListenerRegistry,
    MessageConnection,
    ReadyState,
};

/// A connection whose events are produced by the owning code.
///
/// # Examples
///
/// ```
/// use streamplex::connection::{MemoryConnection, MessageConnection, ReadyState};
///
/// let conn = MemoryConnection::open();
/// assert_eq!(conn.ready_state(), ReadyState::Open);
/// conn.deliver(r#"{"x":1}"#);
/// conn.close();
/// assert_eq!(conn.ready_state(), ReadyState::Closed);
/// ```
#[derive(Debug)]
pub struct MemoryConnection {
    state: AtomicU8,
    listeners: ListenerRegistry,
}

impl MemoryConnection {
    /// Create a connection in the given state.
    #[must_use]
    pub fn new(state: ReadyState) -> Self {
        Self {
            state: AtomicU8::new(state.as_u8()),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Create a shared connection that is already open.
    #[must_use]
    pub fn open() -> Arc<Self> { Arc::new(Self::new(ReadyState::Open)) }

    /// Push one message to every listener.
    pub fn deliver(&self, payload: impl Into<Bytes>) {
        self.listeners.dispatch_message(&payload.into());
    }

    /// Report an error to every listener.
    pub fn fail(&self, error: ConnectionError) { self.listeners.dispatch_error(&error); }

    /// Change the state without notifying listeners.
    pub fn set_state(&self, state: ReadyState) { self.state.store(state.as_u8(), Ordering::Release); }

    /// Mark the connection closed and notify listeners.
    ///
    /// Closing an already closed connection does nothing.
    pub fn close(&self) {
        let previous = self.state.swap(ReadyState::Closed.as_u8(), Ordering::AcqRel);
        if ReadyState::from_u8(previous) != ReadyState::Closed {
            self.listeners.dispatch_close();
        }
    }
}

impl Default for MemoryConnection {
    fn default() -> Self { Self::new(ReadyState::Open) }
}

impl MessageConnection for MemoryConnection {
    fn ready_state(&self) -> ReadyState { ReadyState::from_u8(self.state.load(Ordering::Acquire)) }

    fn subscribe(&self, listener: Arc<dyn ConnectionListener>) -> ListenerId {
        self.listeners.insert(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool { self.listeners.remove(id) }

    fn listener_count(&self) -> usize { self.listeners.len() }
}
