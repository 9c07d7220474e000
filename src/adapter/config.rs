//! Configuration for [`SocketStream`](super::SocketStream).

/// What happens to a connection error that arrives while nobody is waiting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdleErrorPolicy {
    /// Log the error and discard it.
    ///
    /// With no pending request there is nothing to fail, so the error is lost.
    /// A `warn!` event and the idle-error metric record each occurrence.
    #[default]
    Drop,
    /// Queue the error behind any buffered messages and raise it from the
    /// request that reaches it.
    Defer,
}

/// What happens to buffered messages once the connection is no longer open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClosePolicy {
    /// End the stream as soon as a non-open state is observed.
    ///
    /// The state is checked before the buffer is consulted, so messages that
    /// were received but not yet consumed are discarded.
    #[default]
    Discard,
    /// Deliver every buffered message, then end the stream.
    Drain,
}

/// Settings controlling how a [`SocketStream`](super::SocketStream) treats
/// errors without a waiter and messages left over at close.
///
/// # Examples
///
/// ```
/// use streamplex::adapter::{AdapterConfig, ClosePolicy, IdleErrorPolicy};
///
/// let config = AdapterConfig::default()
///     .with_idle_errors(IdleErrorPolicy::Defer)
///     .with_close_policy(ClosePolicy::Drain);
/// assert_eq!(config.idle_errors(), IdleErrorPolicy::Defer);
/// assert_eq!(config.close_policy(), ClosePolicy::Drain);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdapterConfig {
    idle_errors: IdleErrorPolicy,
    on_close: ClosePolicy,
}

impl AdapterConfig {
    /// Set the policy for errors that arrive while no request is pending.
    #[must_use]
    pub fn with_idle_errors(mut self, policy: IdleErrorPolicy) -> Self {
        self.idle_errors = policy;
        self
    }

    /// Set the policy for buffered messages at close.
    #[must_use]
    pub fn with_close_policy(mut self, policy: ClosePolicy) -> Self {
        self.on_close = policy;
        self
    }

    /// Policy for errors that arrive while no request is pending.
    #[must_use]
    pub fn idle_errors(&self) -> IdleErrorPolicy { self.idle_errors }

    /// Policy for buffered messages at close.
    #[must_use]
    pub fn close_policy(&self) -> ClosePolicy { self.on_close }
}
