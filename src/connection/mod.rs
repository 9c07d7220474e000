//! Push-based, message-oriented connections.
//!
//! A [`MessageConnection`] delivers discrete messages to subscribed
//! [`ConnectionListener`]s as they arrive. It also exposes a readable
//! [`ReadyState`] so consumers can decide whether more values may still come.
//! The adapter in [`crate::adapter`] turns such a connection into a
//! pull-based stream.

mod memory;
mod registry;
#[cfg(feature = "websocket")]
mod websocket;

use std::{io, sync::Arc};

use bytes::Bytes;
pub use memory::MemoryConnection;
pub use registry::ListenerRegistry;
use thiserror::Error;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;

/// Lifecycle state of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReadyState {
    /// The connection is being established.
    Connecting,
    /// Messages may be delivered.
    Open,
    /// A close has been requested but not yet completed.
    Closing,
    /// No further messages will be delivered.
    Closed,
}

impl ReadyState {
    /// Returns `true` only for [`ReadyState::Open`].
    #[must_use]
    pub fn is_open(self) -> bool { matches!(self, Self::Open) }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Open => 1,
            Self::Closing => 2,
            Self::Closed => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl std::fmt::Display for ReadyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Errors reported by a connection.
///
/// Errors are cloneable so a single failure can be fanned out to every
/// subscribed listener.
#[non_exhaustive]
#[derive(Clone, Debug, Error)]
pub enum ConnectionError {
    /// The transport reported a failure.
    #[error("transport error: {reason}")]
    Transport {
        /// Human-readable description supplied by the transport.
        reason: String,
    },
    /// An I/O error on the underlying socket.
    #[error("i/o error: {0}")]
    Io(#[source] Arc<io::Error>),
    /// The peer dropped the connection without a closing handshake.
    #[error("connection closed")]
    Closed,
}

impl ConnectionError {
    /// Build a [`ConnectionError::Transport`] from any displayable reason.
    #[must_use]
    pub fn transport(reason: impl std::fmt::Display) -> Self {
        Self::Transport {
            reason: reason.to_string(),
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(error: io::Error) -> Self { Self::Io(Arc::new(error)) }
}

/// Identifier returned by [`MessageConnection::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Create a new [`ListenerId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ListenerId({})", self.0)
    }
}

/// Receiver of connection notifications.
///
/// Callbacks run on whichever task drives the connection and must not block.
pub trait ConnectionListener: Send + Sync {
    /// A complete message arrived.
    fn on_message(&self, payload: Bytes);

    /// The connection reported an error.
    fn on_error(&self, error: &ConnectionError);

    /// The connection transitioned to [`ReadyState::Closed`].
    fn on_close(&self) {}
}

/// A live connection that pushes messages to its listeners.
pub trait MessageConnection: Send + Sync + 'static {
    /// Current lifecycle state.
    fn ready_state(&self) -> ReadyState;

    /// Register `listener` for message, error and close notifications.
    fn subscribe(&self, listener: Arc<dyn ConnectionListener>) -> ListenerId;

    /// Remove a listener. Returns `false` if `id` was not registered.
    fn unsubscribe(&self, id: ListenerId) -> bool;

    /// Number of listeners currently registered.
    fn listener_count(&self) -> usize;
}
