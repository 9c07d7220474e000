//! Inbound buffer shared between a connection's callbacks and its consumer.
//!
//! The inbox is a FIFO queue plus at most one waiter. An arrival either
//! satisfies the waiter or is queued; a request either dequeues or installs a
//! new waiter. A waiter only exists while the queue is empty.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::warn;

use super::config::IdleErrorPolicy;
use crate::{
    connection::{ConnectionError, ConnectionListener},
    metrics,
};

/// An item travelling from the connection to the consumer.
#[derive(Debug)]
pub(crate) enum Inbound {
    Message(Bytes),
    Error(ConnectionError),
}

/// Result of a consumer request against the inbox.
#[derive(Debug)]
pub(crate) enum Take {
    /// The oldest queued item.
    Ready(Inbound),
    /// The queue was empty; the receiver resolves with the next arrival.
    Wait(oneshot::Receiver<Inbound>),
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<Inbound>,
    waiter: Option<oneshot::Sender<Inbound>>,
}

#[derive(Debug)]
pub(crate) struct Inbox {
    state: Mutex<State>,
    idle_errors: IdleErrorPolicy,
}

impl Inbox {
    pub(crate) fn new(idle_errors: IdleErrorPolicy) -> Self {
        Self {
            state: Mutex::new(State::default()),
            idle_errors,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push_message(&self, payload: Bytes) {
        metrics::inc_messages_received();
        let mut state = self.lock();
        let inbound = match Self::hand_to_waiter(&mut state, Inbound::Message(payload)) {
            Ok(()) => return,
            Err(inbound) => inbound,
        };
        state.queue.push_back(inbound);
    }

    pub(crate) fn push_error(&self, error: &ConnectionError) {
        let mut state = self.lock();
        let inbound = match Self::hand_to_waiter(&mut state, Inbound::Error(error.clone())) {
            Ok(()) => return,
            Err(inbound) => inbound,
        };
        match self.idle_errors {
            IdleErrorPolicy::Drop => {
                metrics::inc_idle_errors_dropped();
                warn!(%error, "connection error dropped: no request was waiting");
            }
            IdleErrorPolicy::Defer => state.queue.push_back(inbound),
        }
    }

    /// Deliver `inbound` to the current waiter, returning it if there is none
    /// or the waiter has gone away.
    fn hand_to_waiter(state: &mut State, inbound: Inbound) -> Result<(), Inbound> {
        let Some(waiter) = state.waiter.take() else {
            return Err(inbound);
        };
        debug_assert!(state.queue.is_empty(), "waiter installed over a non-empty queue");
        waiter.send(inbound)
    }

    /// Pop the oldest item or install a waiter for the next one.
    pub(crate) fn take_or_wait(&self) -> Take {
        let mut state = self.lock();
        if let Some(inbound) = state.queue.pop_front() {
            return Take::Ready(inbound);
        }
        let (tx, rx) = oneshot::channel();
        state.waiter = Some(tx);
        Take::Wait(rx)
    }

    /// Pop the oldest item without installing a waiter.
    pub(crate) fn pop(&self) -> Option<Inbound> { self.lock().queue.pop_front() }

    /// Remove the current waiter so no further item can be handed to it.
    ///
    /// The paired receiver resolves with an error unless an item was handed
    /// over first.
    pub(crate) fn withdraw_waiter(&self) { self.lock().waiter = None; }

    /// Number of queued items.
    pub(crate) fn buffered(&self) -> usize { self.lock().queue.len() }

    /// Returns `true` while a consumer is waiting.
    pub(crate) fn is_waiting(&self) -> bool {
        self.lock()
            .waiter
            .as_ref()
            .is_some_and(|waiter| !waiter.is_closed())
    }
}

/// Listener feeding connection events into an [`Inbox`].
pub(crate) struct InboxListener {
    inbox: std::sync::Arc<Inbox>,
}

impl InboxListener {
    pub(crate) fn new(inbox: std::sync::Arc<Inbox>) -> Self { Self { inbox } }
}

impl ConnectionListener for InboxListener {
    fn on_message(&self, payload: Bytes) { self.inbox.push_message(payload); }

    fn on_error(&self, error: &ConnectionError) { self.inbox.push_error(error); }

    fn on_close(&self) { self.inbox.withdraw_waiter(); }
}
