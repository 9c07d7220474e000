//! Metric helpers for `streamplex`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the counter tracking messages received from connections.
pub const MESSAGES_RECEIVED: &str = "streamplex_messages_received_total";
/// Name of the counter tracking messages decoded and yielded.
pub const MESSAGES_DECODED: &str = "streamplex_messages_decoded_total";
/// Name of the counter tracking messages that failed to decode.
pub const DECODE_ERRORS: &str = "streamplex_decode_errors_total";
/// Name of the counter tracking connection errors lost with no waiter.
pub const IDLE_ERRORS_DROPPED: &str = "streamplex_idle_errors_dropped_total";
/// Name of the gauge tracking attached adapter subscriptions.
pub const SUBSCRIPTIONS_ACTIVE: &str = "streamplex_subscriptions_active";
/// Name of the gauge tracking merge sources still being driven.
pub const SOURCES_ACTIVE: &str = "streamplex_sources_active";
/// Name of the counter tracking items yielded by merges.
pub const MERGED_ITEMS: &str = "streamplex_merged_items_total";

/// Record a message received from a connection.
pub fn inc_messages_received() {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_RECEIVED).increment(1);
}

/// Record a message decoded and yielded to a consumer.
pub fn inc_messages_decoded() {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_DECODED).increment(1);
}

/// Record a message that failed to decode.
pub fn inc_decode_errors() {
    #[cfg(feature = "metrics")]
    counter!(DECODE_ERRORS).increment(1);
}

/// Record a connection error dropped because nobody was waiting.
pub fn inc_idle_errors_dropped() {
    #[cfg(feature = "metrics")]
    counter!(IDLE_ERRORS_DROPPED).increment(1);
}

/// Increment the active subscriptions gauge.
pub fn inc_subscriptions() {
    #[cfg(feature = "metrics")]
    gauge!(SUBSCRIPTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active subscriptions gauge.
pub fn dec_subscriptions() {
    #[cfg(feature = "metrics")]
    gauge!(SUBSCRIPTIONS_ACTIVE).decrement(1.0);
}

/// Add `count` sources to the active sources gauge.
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn add_active_sources(count: usize) {
    #[cfg(feature = "metrics")]
    gauge!(SOURCES_ACTIVE).increment(as_gauge(count));
}

/// Remove `count` sources from the active sources gauge.
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn sub_active_sources(count: usize) {
    #[cfg(feature = "metrics")]
    gauge!(SOURCES_ACTIVE).decrement(as_gauge(count));
}

/// Record an item yielded by a merge.
pub fn inc_merged_items() {
    #[cfg(feature = "metrics")]
    counter!(MERGED_ITEMS).increment(1);
}

#[cfg(feature = "metrics")]
#[expect(
    clippy::cast_precision_loss,
    reason = "source counts stay far below 2^52"
)]
fn as_gauge(count: usize) -> f64 { count as f64 }
