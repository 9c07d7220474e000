//! Message decoding traits.
//!
//! This module defines the [`Decoder`] trait used by the socket adapter to turn
//! a raw message into a structured value. A [`JsonDecoder`] is provided as the
//! default: each message must be UTF-8 text holding exactly one JSON document.

use std::{error::Error, marker::PhantomData};

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors raised while decoding a message.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload was not valid UTF-8 text.
    #[error("message is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    /// The payload could not be parsed into the expected structure.
    #[error("malformed message: {0}")]
    Format(#[source] Box<dyn Error + Send + Sync>),
}

impl DecodeError {
    /// Wrap a format-specific parse error.
    #[must_use]
    pub fn format(error: impl Error + Send + Sync + 'static) -> Self { Self::Format(Box::new(error)) }
}

/// Trait for decoding raw messages into values.
///
/// Decoding happens when a message is handed to the consumer, not when it
/// arrives, so a slow consumer never pays for messages it has not read yet.
pub trait Decoder {
    /// The decoded value type.
    type Value;

    /// Decode one complete message.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if `raw` is not a valid message.
    fn decode(&self, raw: &[u8]) -> Result<Self::Value, DecodeError>;
}

/// Decodes each message as one JSON document.
///
/// # Examples
///
/// ```
/// use streamplex::decoder::{Decoder, JsonDecoder};
///
/// let value = JsonDecoder::<serde_json::Value>::new()
///     .decode(br#"{"x":1}"#)
///     .expect("valid json");
/// assert_eq!(value["x"], 1);
/// ```
pub struct JsonDecoder<T = serde_json::Value> {
    _value: PhantomData<fn() -> T>,
}

impl<T> JsonDecoder<T> {
    /// Create a decoder for `T`.
    #[must_use]
    pub fn new() -> Self { Self { _value: PhantomData } }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self { Self::new() }
}

impl<T> Clone for JsonDecoder<T> {
    fn clone(&self) -> Self { Self::new() }
}

impl<T> std::fmt::Debug for JsonDecoder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonDecoder")
    }
}

impl<T: DeserializeOwned> Decoder for JsonDecoder<T> {
    type Value = T;

    fn decode(&self, raw: &[u8]) -> Result<T, DecodeError> {
        let text = std::str::from_utf8(raw)?;
        serde_json::from_str(text).map_err(DecodeError::format)
    }
}

impl<F, T> Decoder for F
where
    F: Fn(&[u8]) -> Result<T, DecodeError>,
{
    type Value = T;

    fn decode(&self, raw: &[u8]) -> Result<T, DecodeError> { self(raw) }
}
