//! Test utilities for `streamplex`.
//!
//! Provides scripted sources with controlled timing, fixtures for in-process
//! connections, and assertion macros for stepping through streams.
//!
//! ```rust
//! use std::{convert::Infallible, time::Duration};
//!
//! use streamplex::multiplex::merge;
//! use streamplex_testing::{end_expect, next_expect, paced};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut merged = merge([("a", paced::<_, Infallible>(vec![1], Duration::from_millis(1)))]);
//! let (label, value) = next_expect!(merged).expect("infallible");
//! assert_eq!((label.as_str(), value), ("a", 1));
//! end_expect!(merged);
//! # }
//! ```

pub mod connection;
pub mod macros;
pub mod sources;

pub use connection::{deliver_all, open_connection};
#[doc(hidden)]
pub use futures;
pub use sources::{Source, Tracked, at_offsets, failing_after, never, paced, ready};
