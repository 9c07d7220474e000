//! Scripted sources for merge tests.
//!
//! Timing helpers sleep on the tokio clock, so tests running with paused time
//! get exact, repeatable interleavings.

use std::{
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use async_stream::stream;
use futures::{
    Stream,
    StreamExt,
    stream::{self, BoxStream},
};
use tokio::time::{Instant, sleep, sleep_until};

/// A boxed fallible source.
pub type Source<T, E> = BoxStream<'static, Result<T, E>>;

/// Yield `values` in order, sleeping `delay` before each one.
pub fn paced<T, E>(values: Vec<T>, delay: Duration) -> Source<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    stream! {
        for value in values {
            sleep(delay).await;
            yield Ok(value);
        }
    }
    .boxed()
}

/// Yield each value once `offset` has elapsed since the first poll.
///
/// Offsets must be non-decreasing.
pub fn at_offsets<T, E>(schedule: Vec<(Duration, T)>) -> Source<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    stream! {
        let start = Instant::now();
        for (offset, value) in schedule {
            sleep_until(start + offset).await;
            yield Ok(value);
        }
    }
    .boxed()
}

/// Yield `values` without delay.
pub fn ready<T, E>(values: Vec<T>) -> Source<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    stream::iter(values.into_iter().map(Ok)).boxed()
}

/// Yield `values`, then fail with `error`.
pub fn failing_after<T, E>(values: Vec<T>, error: E) -> Source<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    stream::iter(values.into_iter().map(Ok))
        .chain(stream::once(async move { Err(error) }))
        .boxed()
}

/// A source that never yields and never ends.
pub fn never<T, E>() -> Source<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    stream::pending().boxed()
}

/// Wraps a source and records when it is dropped.
pub struct Tracked<S> {
    inner: S,
    dropped: Arc<AtomicBool>,
}

impl<S> Tracked<S> {
    /// Wrap `inner`, returning the flag set once the wrapper is dropped.
    pub fn new(inner: S) -> (Self, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner,
                dropped: Arc::clone(&dropped),
            },
            dropped,
        )
    }
}

impl<S: Stream + Unpin> Stream for Tracked<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<S> Drop for Tracked<S> {
    fn drop(&mut self) { self.dropped.store(true, Ordering::Release); }
}
