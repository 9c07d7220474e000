#![cfg(feature = "websocket")]
//! Tests for the WebSocket connection against a local server.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use serde_json::json;
use streamplex::{
    adapter::{AdapterConfig, ClosePolicy, IdleErrorPolicy, SocketStream, from_connection},
    connection::{ConnectionError, MessageConnection, ReadyState, WebSocketConnection},
    error::AdapterError,
};
use streamplex_testing::{end_expect, next_expect};
use tokio::{net::TcpListener, task::JoinHandle, time};
use tokio_tungstenite::{
    accept_async,
    accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
    },
};

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("listener addr");
    (listener, addr)
}

/// Serve one client: send `frames`, then close.
async fn serve_frames(frames: Vec<Message>) -> (SocketAddr, JoinHandle<()>) {
    let (listener, addr) = bind().await;
    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept client");
        let mut ws = accept_async(tcp).await.expect("server handshake");
        for frame in frames {
            ws.send(frame).await.expect("send frame");
        }
        let _ = ws.close(None).await;
    });
    (addr, handle)
}

#[tokio::test]
async fn text_and_binary_frames_become_messages() {
    let (addr, server) = serve_frames(vec![
        Message::Text(r#"{"seq":1}"#.into()),
        Message::Ping(vec![1]),
        Message::Binary(br#"{"seq":2}"#.to_vec()),
    ])
    .await;

    let conn = WebSocketConnection::connect(&format!("ws://{addr}"), Vec::<(&str, &str)>::new())
        .await
        .expect("connect");
    let mut stream = SocketStream::builder(Arc::clone(&conn))
        .config(AdapterConfig::default().with_close_policy(ClosePolicy::Drain))
        .build();

    assert_eq!(next_expect!(stream).expect("valid json"), json!({"seq": 1}));
    assert_eq!(next_expect!(stream).expect("valid json"), json!({"seq": 2}));
    end_expect!(stream);
    assert_eq!(conn.ready_state(), ReadyState::Closed);
    server.await.expect("server task");
}

#[tokio::test]
async fn handshake_carries_headers() {
    let (listener, addr) = bind().await;
    let seen = Arc::new(Mutex::new(None));
    let capture = Arc::clone(&seen);
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept client");
        let callback = move |request: &Request, response: Response| {
            let value = request
                .headers()
                .get("x-workspace")
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            *capture.lock().expect("header lock") = value;
            Ok::<_, ErrorResponse>(response)
        };
        let mut ws = accept_hdr_async(tcp, callback)
            .await
            .expect("server handshake");
        let _ = ws.close(None).await;
    });

    let conn = WebSocketConnection::connect(&format!("ws://{addr}"), [("x-workspace", "demo")])
        .await
        .expect("connect");
    server.await.expect("server task");
    assert_eq!(seen.lock().expect("header lock").as_deref(), Some("demo"));
    conn.close().await;
}

#[tokio::test]
async fn close_ends_a_waiting_stream() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept client");
        let mut ws = accept_async(tcp).await.expect("server handshake");
        // Hold the socket open until the client closes it.
        while let Some(Ok(frame)) = ws.next().await {
            if frame.is_close() {
                break;
            }
        }
    });

    let conn = WebSocketConnection::connect(&format!("ws://{addr}"), Vec::<(&str, &str)>::new())
        .await
        .expect("connect");
    let mut stream = from_connection(Arc::clone(&conn));
    let consumer = tokio::spawn(async move { stream.next().await.is_none() });

    conn.close().await;
    assert!(consumer.await.expect("consumer task"), "stream should end");
    assert_eq!(conn.ready_state(), ReadyState::Closed);
    assert_eq!(conn.listener_count(), 0);
    server.await.expect("server task");
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    let (listener, addr) = bind().await;
    drop(listener);

    let err = WebSocketConnection::connect(&format!("ws://{addr}"), Vec::<(&str, &str)>::new())
        .await
        .expect_err("nothing is listening");
    assert!(matches!(err, ConnectionError::Transport { .. }));
}

#[tokio::test]
async fn invalid_header_is_rejected_before_connecting() {
    let err = WebSocketConnection::connect("ws://127.0.0.1:9", [("bad header", "x")])
        .await
        .expect_err("invalid header name");
    assert!(matches!(err, ConnectionError::Transport { .. }));
}

/// Frames sent straight after the handshake reach the first subscriber even
/// when the reader runs before the stream is built.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frames_read_before_subscribing_are_replayed() {
    for round in 0..10 {
        let (addr, server) = serve_frames(vec![Message::Text(r#"{"hello":1}"#.into())]).await;

        let conn =
            WebSocketConnection::connect(&format!("ws://{addr}"), Vec::<(&str, &str)>::new())
                .await
                .expect("connect");
        if round % 2 == 1 {
            // Give the reader time to consume the frame and the close.
            time::sleep(Duration::from_millis(20)).await;
        }
        let mut stream = SocketStream::builder(Arc::clone(&conn))
            .config(AdapterConfig::default().with_close_policy(ClosePolicy::Drain))
            .build();

        let first = next_expect!(stream, format!("first frame lost in round {round}"));
        assert_eq!(first.expect("valid json"), json!({"hello": 1}));
        end_expect!(stream);
        server.await.expect("server task");
    }
}

/// A peer that drops the socket without a closing handshake is reported as
/// a closed connection.
#[tokio::test]
async fn reset_without_close_handshake_is_reported_as_closed() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept client");
        let ws = accept_async(tcp).await.expect("server handshake");
        drop(ws);
    });

    let conn = WebSocketConnection::connect(&format!("ws://{addr}"), Vec::<(&str, &str)>::new())
        .await
        .expect("connect");
    let mut stream = SocketStream::builder(Arc::clone(&conn))
        .config(
            AdapterConfig::default()
                .with_idle_errors(IdleErrorPolicy::Defer)
                .with_close_policy(ClosePolicy::Drain),
        )
        .build();
    server.await.expect("server task");

    let err = next_expect!(stream).expect_err("reset connection");
    assert!(matches!(err, AdapterError::Connection(ConnectionError::Closed)));
    end_expect!(stream);
    assert_eq!(conn.ready_state(), ReadyState::Closed);
}
