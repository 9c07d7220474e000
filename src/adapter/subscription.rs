//! Listener registration owned by a socket stream, and its release.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tracing::debug;

use super::inbox::{Inbox, InboxListener};
use crate::{
    connection::{ListenerId, MessageConnection},
    metrics,
};

/// An [`InboxListener`] registered on a connection.
///
/// Releasing unsubscribes the listener and wakes any waiting consumer. It runs
/// at most once, whether triggered by the stream finishing, a
/// [`CancelHandle`], or drop.
pub(crate) struct Subscription {
    conn: Arc<dyn MessageConnection>,
    id: ListenerId,
    inbox: Arc<Inbox>,
    released: AtomicBool,
}

impl Subscription {
    pub(crate) fn attach(conn: Arc<dyn MessageConnection>, inbox: Arc<Inbox>) -> Arc<Self> {
        let id = conn.subscribe(Arc::new(InboxListener::new(Arc::clone(&inbox))));
        metrics::inc_subscriptions();
        debug!(listener = %id, "socket stream subscribed");
        Arc::new(Self {
            conn,
            id,
            inbox,
            released: AtomicBool::new(false),
        })
    }

    /// Unsubscribe and wake the consumer. Returns `false` if already released.
    pub(crate) fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.conn.unsubscribe(self.id);
        self.inbox.withdraw_waiter();
        metrics::dec_subscriptions();
        debug!(listener = %self.id, "socket stream unsubscribed");
        true
    }

    pub(crate) fn is_released(&self) -> bool { self.released.load(Ordering::Acquire) }
}

impl Drop for Subscription {
    fn drop(&mut self) { self.release(); }
}

/// Cloneable handle that cancels a [`SocketStream`](super::SocketStream)
/// from outside.
///
/// Cancelling unsubscribes from the connection immediately, even if the stream
/// is not being polled. A pending request resolves and the stream ends
/// cleanly.
#[derive(Clone)]
pub struct CancelHandle {
    subscription: Arc<Subscription>,
}

impl CancelHandle {
    pub(crate) fn new(subscription: Arc<Subscription>) -> Self { Self { subscription } }

    /// Release the stream's subscription. Later calls do nothing.
    pub fn cancel(&self) { self.subscription.release(); }

    /// Returns `true` once the subscription has been released for any reason.
    #[must_use]
    pub fn is_cancelled(&self) -> bool { self.subscription.is_released() }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
