//! Property tests for merge completeness and ordering, and for adapter FIFO
//! delivery.
//!
//! Sources interleave by yielding to the scheduler a random number of times
//! before each value, so every case exercises a different settlement order.

use std::{collections::HashMap, convert::Infallible, sync::Arc};

use async_stream::stream;
use futures::{
    FutureExt,
    StreamExt,
    stream::{self, BoxStream},
};
use proptest::prelude::*;
use streamplex::{
    adapter::from_connection,
    connection::MemoryConnection,
    multiplex::{Label, merge},
};

type Scripted = BoxStream<'static, Result<u32, Infallible>>;

/// Yield each value after `delay` scheduler round trips.
fn scripted(items: Vec<(u32, u8)>) -> Scripted {
    stream! {
        for (value, delay) in items {
            for _ in 0..delay {
                tokio::task::yield_now().await;
            }
            yield Ok(value);
        }
    }
    .boxed()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
}

fn sources_strategy() -> impl Strategy<Value = Vec<Vec<(u32, u8)>>> {
    proptest::collection::vec(
        proptest::collection::vec((any::<u32>(), 0u8..4), 0..12),
        0..6,
    )
}

#[derive(Debug, Clone)]
enum Op {
    Deliver(u16),
    Read,
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![any::<u16>().prop_map(Op::Deliver), Just(Op::Read)],
        0..64,
    )
}

proptest! {
    #[test]
    fn merge_preserves_every_value_in_source_order(sources in sources_strategy()) {
        let labelled: Vec<(String, Scripted)> = sources
            .iter()
            .enumerate()
            .map(|(i, items)| (format!("s{i}"), scripted(items.clone())))
            .collect();

        let (items, max_in_flight) = runtime().block_on(async move {
            let mut merged = merge(labelled);
            let mut items: Vec<(Label, u32)> = Vec::new();
            let mut max_in_flight = merged.in_flight();
            while let Some(item) = merged.next().await {
                let (label, value) = match item {
                    Ok(pair) => pair,
                    Err(err) => match err.into_source() {},
                };
                let active = merged.active_labels();
                let mut unique = active.clone();
                unique.sort();
                unique.dedup();
                assert_eq!(unique.len(), active.len(), "two fetches in flight for one label");
                max_in_flight = max_in_flight.max(merged.in_flight());
                items.push((label, value));
            }
            (items, max_in_flight)
        });

        let total: usize = sources.iter().map(Vec::len).sum();
        prop_assert_eq!(items.len(), total);
        prop_assert!(max_in_flight <= sources.len());

        let mut grouped: HashMap<&str, Vec<u32>> = HashMap::new();
        for (label, value) in &items {
            grouped.entry(label.as_str()).or_default().push(*value);
        }
        for (i, source) in sources.iter().enumerate() {
            let expected: Vec<u32> = source.iter().map(|(value, _)| *value).collect();
            let label = format!("s{i}");
            let actual = grouped.remove(label.as_str()).unwrap_or_default();
            prop_assert_eq!(actual, expected, "order differs for {}", label);
        }
        prop_assert!(grouped.is_empty(), "values under unknown labels");
    }

    #[test]
    fn endless_source_keeps_merge_producing(
        finite in proptest::collection::vec(any::<u32>(), 0..8),
        take in 1usize..200,
    ) {
        let count = runtime().block_on(async move {
            let endless: Scripted = stream::repeat(Ok(0)).boxed();
            let finite: Scripted = stream::iter(finite.into_iter().map(Ok)).boxed();
            merge([("endless", endless), ("finite", finite)])
                .take(take)
                .count()
                .await
        });
        prop_assert_eq!(count, take);
    }

    #[test]
    fn adapter_reads_in_arrival_order(ops in ops_strategy()) {
        let conn = MemoryConnection::open();
        let mut stream = from_connection(Arc::clone(&conn));
        let mut delivered = Vec::new();
        let mut read = Vec::new();

        for op in ops {
            match op {
                Op::Deliver(n) => {
                    conn.deliver(n.to_string());
                    delivered.push(u64::from(n));
                }
                Op::Read => {
                    if let Some(item) = stream.next().now_or_never() {
                        let value = item.expect("stream open").expect("valid json");
                        read.push(value.as_u64().expect("integer payload"));
                    }
                }
            }
            prop_assert!(
                !((&stream).buffered() > 0 && stream.is_waiting()),
                "buffer and waiter held at once"
            );
        }
        while let Some(Some(item)) = stream.next().now_or_never() {
            read.push(item.expect("valid json").as_u64().expect("integer payload"));
        }

        prop_assert_eq!(read, delivered);
    }
}
