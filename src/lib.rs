#![doc(html_root_url = "https://docs.rs/streamplex/latest")]
//! Public API for the `streamplex` library.
//!
//! This crate turns push-based, message-oriented connections into pull-based
//! streams and merges many labelled streams into one arrival-ordered stream.
//!
//! Data flows from connection events into a [`SocketStream`] buffer, out as
//! decoded values, and through [`merge`] (one source per label) to the
//! consumer.

pub mod adapter;
pub mod connection;
pub mod decoder;
pub mod error;
pub mod metrics;
pub mod multiplex;

pub use adapter::{AdapterConfig, CancelHandle, SocketStream, from_connection};
pub use connection::{ConnectionError, MemoryConnection, MessageConnection, ReadyState};
pub use decoder::{DecodeError, Decoder, JsonDecoder};
pub use error::{AdapterError, MergeError, Result};
pub use multiplex::{Label, Merged, SpawnedMerge, merge, spawn_merge};
