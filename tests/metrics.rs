#![cfg(feature = "metrics")]
//! Tests for `streamplex` metrics.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.

use std::{convert::Infallible, sync::Arc};

use futures::{FutureExt, StreamExt, stream};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use streamplex::{
    adapter::from_connection,
    connection::{ConnectionError, MemoryConnection},
    metrics::{
        DECODE_ERRORS,
        IDLE_ERRORS_DROPPED,
        MERGED_ITEMS,
        MESSAGES_DECODED,
        MESSAGES_RECEIVED,
        SOURCES_ACTIVE,
        SUBSCRIPTIONS_ACTIVE,
    },
    multiplex::merge,
};

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

struct Recorded(Vec<(String, DebugValue)>);

impl Recorded {
    fn take(snapshotter: &Snapshotter) -> Self {
        Self(
            snapshotter
                .snapshot()
                .into_vec()
                .into_iter()
                .map(|(key, _, _, value)| (key.key().name().to_owned(), value))
                .collect(),
        )
    }

    fn counter(&self, name: &str) -> u64 {
        self.0
            .iter()
            .find_map(|(key, value)| match value {
                DebugValue::Counter(count) if key == name => Some(*count),
                _ => None,
            })
            .unwrap_or(0)
    }

    fn gauge(&self, name: &str) -> Option<f64> {
        self.0.iter().find_map(|(key, value)| match value {
            DebugValue::Gauge(level) if key == name => Some(level.into_inner()),
            _ => None,
        })
    }
}

#[test]
fn adapter_counts_received_decoded_and_failed_messages() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let conn = MemoryConnection::open();
        let mut stream = from_connection(Arc::clone(&conn));
        conn.deliver("1");
        conn.deliver("oops");
        assert!(matches!(stream.next().now_or_never(), Some(Some(Ok(_)))));
        assert!(matches!(stream.next().now_or_never(), Some(Some(Err(_)))));
    });

    let recorded = Recorded::take(&snapshotter);
    assert_eq!(recorded.counter(MESSAGES_RECEIVED), 2);
    assert_eq!(recorded.counter(MESSAGES_DECODED), 1);
    assert_eq!(recorded.counter(DECODE_ERRORS), 1);
    assert_eq!(recorded.gauge(SUBSCRIPTIONS_ACTIVE), Some(0.0));
}

#[test]
fn dropped_idle_error_is_counted() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let conn = MemoryConnection::open();
        let _stream = from_connection(Arc::clone(&conn));
        conn.fail(ConnectionError::Closed);
    });

    assert_eq!(Recorded::take(&snapshotter).counter(IDLE_ERRORS_DROPPED), 1);
}

#[rstest]
#[case::all_consumed(usize::MAX)]
#[case::dropped_early(1)]
fn merge_tracks_items_and_active_sources(#[case] take: usize) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let merged = merge([
            ("a", stream::iter(vec![Ok::<u32, Infallible>(1), Ok(2)])),
            ("b", stream::iter(vec![Ok(3)])),
        ]);
        let items = merged
            .take(take)
            .collect::<Vec<_>>()
            .now_or_never()
            .expect("ready sources finish synchronously");
        assert_eq!(items.len(), take.min(3));
    });

    let recorded = Recorded::take(&snapshotter);
    let expected = u64::try_from(take.min(3)).expect("small count");
    assert_eq!(recorded.counter(MERGED_ITEMS), expected);
    assert_eq!(recorded.gauge(SOURCES_ACTIVE), Some(0.0));
}
