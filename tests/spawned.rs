//! Tests for the task-per-source merge.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::{StreamExt, stream};
use streamplex::multiplex::{SpawnConfig, spawn_merge};
use streamplex_testing::{Tracked, end_expect, failing_after, never, next_expect, paced, ready};
use thiserror::Error;
use tokio::time;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("upstream failed: {0}")]
struct Upstream(&'static str);

async fn wait_for(flag: &AtomicBool) {
    time::timeout(Duration::from_secs(5), async {
        while !flag.load(Ordering::Acquire) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("flag was never set");
}

/// Every value arrives once, in source order per label, on either runtime.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delivers_all_values_multi_thread() { assert_complete().await; }

#[tokio::test]
async fn delivers_all_values_current_thread() { assert_complete().await; }

async fn assert_complete() {
    let mut merged = spawn_merge(
        [
            ("a", paced::<u32, Upstream>(vec![1, 2, 3], Duration::from_millis(1))),
            ("b", ready(vec![10, 20])),
            ("c", ready(Vec::new())),
        ],
        SpawnConfig::default(),
    );

    let mut grouped: HashMap<String, Vec<u32>> = HashMap::new();
    while let Some(item) = merged.next().await {
        let (label, value) = item.expect("no source fails");
        grouped.entry(label.to_string()).or_default().push(value);
    }
    assert_eq!(grouped["a"], vec![1, 2, 3]);
    assert_eq!(grouped["b"], vec![10, 20]);
    assert!(!grouped.contains_key("c"));
    assert_eq!(merged.yielded(), 5);
}

/// A failure is yielded once and stops the remaining workers.
#[tokio::test]
async fn failure_cancels_other_workers() {
    let (survivor, dropped) = Tracked::new(never::<u32, Upstream>());
    let mut merged = spawn_merge(
        [
            ("bad", failing_after(Vec::new(), Upstream("boom"))),
            ("idle", survivor.boxed()),
        ],
        SpawnConfig::default(),
    );

    let err = next_expect!(merged).expect_err("source failure");
    assert_eq!(err.label, "bad");
    assert_eq!(err.into_source(), Upstream("boom"));
    end_expect!(merged);

    merged.shutdown().await;
    assert!(dropped.load(Ordering::Acquire));
}

/// Dropping the merged stream cancels every worker.
#[tokio::test]
async fn drop_cancels_workers() {
    let (source, dropped) = Tracked::new(never::<u32, Upstream>());
    let merged = spawn_merge([("idle", source.boxed())], SpawnConfig::default());
    tokio::task::yield_now().await;
    assert!(!dropped.load(Ordering::Acquire));

    drop(merged);
    wait_for(&dropped).await;
}

/// `cancel` ends the stream even while workers are idle.
#[tokio::test]
async fn cancel_ends_stream() {
    let mut merged = spawn_merge(
        [("idle", never::<u32, Upstream>())],
        SpawnConfig::default(),
    );
    merged.cancel();
    end_expect!(merged);
}

/// Workers run ahead of the consumer only as far as the channel allows.
#[tokio::test]
async fn channel_capacity_bounds_read_ahead() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pulled);
    let source = stream::iter((0..100).map(Ok::<u32, Upstream>)).inspect(move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    let config = SpawnConfig::new(1).expect("valid capacity");
    let mut merged = spawn_merge([("fast", source)], config);

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    // One value queued in the channel and one held by the blocked send.
    assert_eq!(pulled.load(Ordering::Relaxed), 2);

    let (_, first) = next_expect!(merged).expect("no source fails");
    assert_eq!(first, 0);
    merged.shutdown().await;
}
