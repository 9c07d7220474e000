//! Canonical error and result types for the crate.
//!
//! [`AdapterError`] is raised by socket streams. [`MergeError`] wraps the
//! failure of one merged source together with the label it was registered
//! under. Construction-time problems have their own types next to the
//! builders that report them.

use thiserror::Error;

use crate::{connection::ConnectionError, decoder::DecodeError, multiplex::Label};

/// Errors yielded by a [`SocketStream`](crate::adapter::SocketStream).
///
/// Both variants are terminal: the stream yields `None` afterwards.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AdapterError {
    /// A message could not be decoded into the expected structure.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    /// The connection reported an error while a request was waiting.
    #[error("connection failed: {0}")]
    Connection(#[from] ConnectionError),
}

impl AdapterError {
    /// Returns `true` for [`AdapterError::Decode`].
    #[must_use]
    pub fn is_decode(&self) -> bool { matches!(self, Self::Decode(_)) }

    /// Returns `true` for [`AdapterError::Connection`].
    #[must_use]
    pub fn is_connection(&self) -> bool { matches!(self, Self::Connection(_)) }
}

/// A merged source failed.
///
/// The merge ends after yielding this error; the remaining sources are
/// dropped without being drained.
#[derive(Debug, Error)]
#[error("source `{label}` failed: {source}")]
pub struct MergeError<E> {
    /// Label of the failing source.
    pub label: Label,
    /// The error the source produced.
    #[source]
    pub source: E,
}

impl<E> MergeError<E> {
    /// Create a new error for `label`.
    #[must_use]
    pub fn new(label: Label, source: E) -> Self { Self { label, source } }

    /// Consume the error, returning the source's own error.
    #[must_use]
    pub fn into_source(self) -> E { self.source }
}

/// Result alias used by socket streams.
pub type Result<T, E = AdapterError> = std::result::Result<T, E>;
