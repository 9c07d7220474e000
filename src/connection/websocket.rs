//! WebSocket client connection.
//!
//! `WebSocketConnection` owns a spawned reader task that forwards every Text
//! or Binary frame to the registered listeners as one message. Frames and
//! errors read before the first listener subscribes are held and replayed to
//! that listener. Transport failures are reported through
//! [`ConnectionListener::on_error`]; a peer that drops the socket without a
//! closing handshake is reported as [`ConnectionError::Closed`]. A Close
//! frame, or the end of the underlying stream, marks the connection closed.
//! There is no reconnect: once closed, a new connection must be made.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU8, Ordering},
    },
};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Error as WsError,
        Message,
        client::IntoClientRequest,
        error::ProtocolError,
        http::{HeaderName, HeaderValue},
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    ConnectionError,
    ConnectionListener,
    ListenerId,
    ListenerRegistry,
    MessageConnection,
    ReadyState,
};

enum Held {
    Message(Bytes),
    Error(ConnectionError),
}

struct Shared {
    state: AtomicU8,
    listeners: ListenerRegistry,
    /// Events read before anyone subscribed. `None` once they were replayed.
    held: Mutex<Option<VecDeque<Held>>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(ReadyState::Open.as_u8()),
            listeners: ListenerRegistry::new(),
            held: Mutex::new(Some(VecDeque::new())),
        }
    }

    fn held(&self) -> MutexGuard<'_, Option<VecDeque<Held>>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, event: Held) {
        {
            let mut held = self.held();
            if let Some(queue) = held.as_mut() {
                queue.push_back(event);
                return;
            }
        }
        match event {
            Held::Message(payload) => self.listeners.dispatch_message(&payload),
            Held::Error(error) => self.listeners.dispatch_error(&error),
        }
    }

    fn subscribe(&self, listener: Arc<dyn ConnectionListener>) -> ListenerId {
        // The lock stays held while replaying so the reader cannot overtake
        // the held events.
        let mut held = self.held();
        let id = self.listeners.insert(Arc::clone(&listener));
        if let Some(queue) = held.take() {
            if !queue.is_empty() {
                debug!(held = queue.len(), listener = %id, "replaying early websocket events");
            }
            for event in queue {
                match event {
                    Held::Message(payload) => listener.on_message(payload),
                    Held::Error(error) => listener.on_error(&error),
                }
            }
        }
        id
    }

    fn set_state(&self, state: ReadyState) { self.state.store(state.as_u8(), Ordering::Release); }

    fn mark_closed(&self) {
        let previous = self.state.swap(ReadyState::Closed.as_u8(), Ordering::AcqRel);
        if ReadyState::from_u8(previous) != ReadyState::Closed {
            self.listeners.dispatch_close();
        }
    }
}

/// A client WebSocket exposed as a [`MessageConnection`].
pub struct WebSocketConnection {
    url: String,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketConnection {
    /// Connect to `url`, sending `headers` with the opening handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Transport`] if the URL or a header is
    /// invalid, or if the handshake fails.
    pub async fn connect<I, K, V>(url: &str, headers: I) -> Result<Arc<Self>, ConnectionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut request = url.into_client_request().map_err(ConnectionError::transport)?;
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_ref().as_bytes())
                .map_err(ConnectionError::transport)?;
            let value = HeaderValue::from_str(value.as_ref()).map_err(ConnectionError::transport)?;
            request.headers_mut().insert(name, value);
        }

        let (socket, _response) = connect_async(request)
            .await
            .map_err(ConnectionError::transport)?;
        info!(url, "websocket connected");

        let shared = Arc::new(Shared::new());
        let shutdown = CancellationToken::new();
        let reader = tokio::spawn(read_loop(socket, Arc::clone(&shared), shutdown.clone()));

        Ok(Arc::new(Self {
            url: url.to_owned(),
            shared,
            shutdown,
            reader: Mutex::new(Some(reader)),
        }))
    }

    /// The URL this connection was opened against.
    #[must_use]
    pub fn url(&self) -> &str { &self.url }

    /// Send a Close frame and wait for the reader task to finish.
    ///
    /// Calling `close` more than once is harmless.
    pub async fn close(&self) {
        if self.ready_state().is_open() {
            self.shared.set_state(ReadyState::Closing);
        }
        self.shutdown.cancel();
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            if let Err(error) = reader.await {
                warn!(url = %self.url, %error, "websocket reader task failed");
            }
        }
        self.shared.mark_closed();
        info!(url = %self.url, "websocket closed");
    }
}

impl MessageConnection for WebSocketConnection {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// The first subscriber also receives every frame read before it
    /// attached.
    fn subscribe(&self, listener: Arc<dyn ConnectionListener>) -> ListenerId {
        self.shared.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool { self.shared.listeners.remove(id) }

    fn listener_count(&self) -> usize { self.shared.listeners.len() }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) { self.shutdown.cancel(); }
}

impl std::fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("url", &self.url)
            .field("state", &self.ready_state())
            .finish_non_exhaustive()
    }
}

async fn read_loop<S>(socket: S, shared: Arc<Shared>, shutdown: CancellationToken)
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message>
        + Unpin,
{
    let (mut write, mut read) = socket.split();
    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                shared.set_state(ReadyState::Closing);
                if write.send(Message::Close(None)).await.is_err() {
                    debug!("close frame could not be sent");
                }
                break;
            }

            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.dispatch(Held::Message(Bytes::from(text))),
                Some(Ok(Message::Binary(data))) => shared.dispatch(Held::Message(Bytes::from(data))),
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "peer closed websocket");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    warn!(%error, "websocket read failed");
                    shared.dispatch(Held::Error(read_error(error)));
                    break;
                }
                None => break,
            },
        }
    }
    shared.mark_closed();
}

fn read_error(error: WsError) -> ConnectionError {
    match error {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => ConnectionError::Closed,
        WsError::Io(error) => ConnectionError::from(error),
        other => ConnectionError::transport(other),
    }
}
