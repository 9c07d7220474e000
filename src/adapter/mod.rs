//! Pull-based streams over push-based connections.
//!
//! [`SocketStream`] subscribes to a [`MessageConnection`], buffers every
//! inbound message, and yields decoded values one request at a time. The
//! connection's state is checked before each request: once it is no longer
//! open the stream ends cleanly. Decode failures and connection errors are
//! raised from the request they affect and end the stream.
//!
//! The listener registration lives exactly as long as the stream is active.
//! It is released when the stream ends, fails, is cancelled through a
//! [`CancelHandle`], or is dropped.

mod config;
mod inbox;
mod subscription;

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

pub use config::{AdapterConfig, ClosePolicy, IdleErrorPolicy};
use futures::{Future, Stream, stream::FusedStream};
use inbox::{Inbound, Inbox, Take};
pub use subscription::CancelHandle;
use subscription::Subscription;
use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::debug;

use crate::{
    connection::MessageConnection,
    decoder::{Decoder, JsonDecoder},
    error::AdapterError,
    metrics,
};

/// Expose `conn` as a stream of JSON values using the default configuration.
///
/// # Examples
///
/// ```
/// use futures::StreamExt;
/// use streamplex::{adapter::from_connection, connection::MemoryConnection};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let conn = MemoryConnection::open();
/// let mut stream = from_connection(conn.clone());
/// conn.deliver(r#"{"x":1}"#);
///
/// let first = stream.next().await.expect("one value").expect("valid json");
/// assert_eq!(first["x"], 1);
///
/// conn.close();
/// assert!(stream.next().await.is_none());
/// # }
/// ```
#[must_use]
pub fn from_connection<C: MessageConnection>(conn: Arc<C>) -> SocketStream {
    SocketStream::builder(conn).build()
}

/// Builder for [`SocketStream`].
pub struct AdapterBuilder<D = JsonDecoder> {
    conn: Arc<dyn MessageConnection>,
    decoder: D,
    config: AdapterConfig,
    cancellation: Option<CancellationToken>,
}

impl AdapterBuilder {
    fn new(conn: Arc<dyn MessageConnection>) -> Self {
        Self {
            conn,
            decoder: JsonDecoder::new(),
            config: AdapterConfig::default(),
            cancellation: None,
        }
    }
}

impl<D> AdapterBuilder<D> {
    /// Decode messages with `decoder` instead of the JSON default.
    #[must_use]
    pub fn decoder<D2: Decoder>(self, decoder: D2) -> AdapterBuilder<D2> {
        AdapterBuilder {
            conn: self.conn,
            decoder,
            config: self.config,
            cancellation: self.cancellation,
        }
    }

    /// Replace the adapter configuration.
    #[must_use]
    pub fn config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    /// End the stream at its next poll once `token` is cancelled.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Subscribe to the connection and return the stream.
    ///
    /// Messages arriving from this point on are buffered, even before the
    /// first poll.
    #[must_use]
    pub fn build(self) -> SocketStream<D>
    where
        D: Decoder,
    {
        let inbox = Arc::new(Inbox::new(self.config.idle_errors()));
        let subscription = Subscription::attach(Arc::clone(&self.conn), Arc::clone(&inbox));
        SocketStream {
            conn: self.conn,
            inbox,
            subscription,
            decoder: self.decoder,
            config: self.config,
            waiter: None,
            cancelled: self.cancellation.map(|token| Box::pin(token.cancelled_owned())),
            finished: false,
            delivered: 0,
        }
    }
}

enum Request {
    Ready(Inbound),
    Wait(oneshot::Receiver<Inbound>),
    End,
}

/// A stream of decoded values read from a [`MessageConnection`].
///
/// Only one consumer may poll a `SocketStream`; the type is not `Clone`.
pub struct SocketStream<D = JsonDecoder> {
    conn: Arc<dyn MessageConnection>,
    inbox: Arc<Inbox>,
    subscription: Arc<Subscription>,
    decoder: D,
    config: AdapterConfig,
    waiter: Option<oneshot::Receiver<Inbound>>,
    cancelled: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
    finished: bool,
    delivered: u64,
}

impl SocketStream {
    /// Start building a stream over `conn`.
    #[must_use]
    pub fn builder<C: MessageConnection>(conn: Arc<C>) -> AdapterBuilder { AdapterBuilder::new(conn) }
}

impl<D: Decoder> SocketStream<D> {
    /// Handle that cancels this stream from another task.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle { CancelHandle::new(Arc::clone(&self.subscription)) }

    /// Number of messages received but not yet consumed.
    #[must_use]
    pub fn buffered(&self) -> usize { self.inbox.buffered() }

    /// Returns `true` while a request is suspended waiting for an arrival.
    #[must_use]
    pub fn is_waiting(&self) -> bool { self.inbox.is_waiting() }

    /// Number of values successfully decoded and yielded so far.
    #[must_use]
    pub fn delivered(&self) -> u64 { self.delivered }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> AdapterConfig { self.config }

    fn request(&mut self) -> Request {
        if !self.conn.ready_state().is_open() {
            return self.request_after_close();
        }
        match self.inbox.take_or_wait() {
            Take::Ready(inbound) => Request::Ready(inbound),
            Take::Wait(mut rx) => {
                if self.conn.ready_state().is_open() {
                    return Request::Wait(rx);
                }
                // The connection closed between the state check and the
                // waiter install, so its close notification may have missed us.
                self.inbox.withdraw_waiter();
                match rx.try_recv() {
                    Ok(inbound) => Request::Ready(inbound),
                    Err(_) => self.request_after_close(),
                }
            }
        }
    }

    fn request_after_close(&mut self) -> Request {
        match self.config.close_policy() {
            ClosePolicy::Drain => self.inbox.pop().map_or(Request::End, Request::Ready),
            ClosePolicy::Discard => Request::End,
        }
    }

    fn deliver(&mut self, inbound: Inbound) -> Result<D::Value, AdapterError> {
        match inbound {
            Inbound::Message(raw) => match self.decoder.decode(&raw) {
                Ok(value) => {
                    self.delivered += 1;
                    metrics::inc_messages_decoded();
                    Ok(value)
                }
                Err(error) => {
                    metrics::inc_decode_errors();
                    self.finish("decode error");
                    Err(AdapterError::Decode(error))
                }
            },
            Inbound::Error(error) => {
                self.finish("connection error");
                Err(AdapterError::Connection(error))
            }
        }
    }

    fn finish(&mut self, reason: &'static str) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.waiter = None;
        self.cancelled = None;
        let discarded = self.inbox.buffered();
        if discarded > 0 {
            debug!(discarded, reason, "discarding buffered messages");
        }
        self.subscription.release();
        debug!(reason, delivered = self.delivered, "socket stream finished");
    }
}

impl<D> Stream for SocketStream<D>
where
    D: Decoder + Unpin,
{
    type Item = Result<D::Value, AdapterError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if let Some(cancelled) = this.cancelled.as_mut() {
            if cancelled.as_mut().poll(cx).is_ready() {
                this.finish("cancelled");
                return Poll::Ready(None);
            }
        }

        loop {
            if this.subscription.is_released() {
                this.finish("cancelled");
                return Poll::Ready(None);
            }

            if let Some(waiter) = this.waiter.as_mut() {
                match Pin::new(waiter).poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(inbound)) => {
                        this.waiter = None;
                        return Poll::Ready(Some(this.deliver(inbound)));
                    }
                    // Woken by close or cancellation; re-check below.
                    Poll::Ready(Err(_)) => this.waiter = None,
                }
                continue;
            }

            match this.request() {
                Request::Ready(inbound) => return Poll::Ready(Some(this.deliver(inbound))),
                Request::Wait(rx) => this.waiter = Some(rx),
                Request::End => {
                    this.finish("connection not open");
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl<D> FusedStream for SocketStream<D>
where
    D: Decoder + Unpin,
{
    fn is_terminated(&self) -> bool { self.finished }
}

impl<D> Drop for SocketStream<D> {
    fn drop(&mut self) { self.subscription.release(); }
}

impl<D> std::fmt::Debug for SocketStream<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketStream")
            .field("state", &self.conn.ready_state())
            .field("buffered", &self.inbox.buffered())
            .field("finished", &self.finished)
            .field("delivered", &self.delivered)
            .finish_non_exhaustive()
    }
}
