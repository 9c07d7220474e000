//! Task-per-source merging.
//!
//! Each source runs on its own tokio task and pushes `(label, value)` pairs
//! into one shared bounded channel. The merged stream reads that channel
//! until every worker has finished. Unlike [`Merged`](super::Merged), sources
//! keep advancing while the consumer is busy, up to the channel capacity.

use std::{
    pin::Pin,
    task::{Context, Poll, ready},
};

use futures::{Stream, TryStream, TryStreamExt, stream::FusedStream};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::{
    sync::{CancellationToken, DropGuard},
    task::TaskTracker,
};
use tracing::debug;

use super::{Label, MergeItem};
use crate::{error::MergeError, metrics};

/// Channel capacity used by [`SpawnConfig::default`].
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;
/// Highest allowed channel capacity for [`SpawnConfig`].
pub const MAX_CHANNEL_CAPACITY: usize = 10_000;

/// Errors returned when configuring a spawned merge.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SpawnConfigError {
    /// The capacity was zero or exceeded [`MAX_CHANNEL_CAPACITY`].
    #[error("invalid channel capacity {0}; must be between 1 and {max}", max = MAX_CHANNEL_CAPACITY)]
    InvalidCapacity(usize),
}

/// Settings for [`spawn_merge`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpawnConfig {
    capacity: usize,
}

impl SpawnConfig {
    /// Create a configuration with the given channel capacity.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnConfigError::InvalidCapacity`] if `capacity` is zero or
    /// exceeds [`MAX_CHANNEL_CAPACITY`].
    pub fn new(capacity: usize) -> Result<Self, SpawnConfigError> {
        if capacity == 0 || capacity > MAX_CHANNEL_CAPACITY {
            return Err(SpawnConfigError::InvalidCapacity(capacity));
        }
        Ok(Self { capacity })
    }

    /// Channel capacity shared by all workers.
    #[must_use]
    pub fn capacity(&self) -> usize { self.capacity }
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Spawn one worker per source and merge their output.
///
/// Must be called from within a tokio runtime.
pub fn spawn_merge<I, L, S>(sources: I, config: SpawnConfig) -> SpawnedMerge<S::Ok, S::Error>
where
    I: IntoIterator<Item = (L, S)>,
    L: Into<Label>,
    S: TryStream + Send + Unpin + 'static,
    S::Ok: Send + 'static,
    S::Error: Send + 'static,
{
    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();
    let (tx, rx) = mpsc::channel(config.capacity());
    let mut spawned = 0;
    for (label, stream) in sources {
        tracker.spawn(drive(label.into(), stream, tx.clone(), shutdown.clone()));
        spawned += 1;
    }
    tracker.close();
    metrics::add_active_sources(spawned);

    SpawnedMerge {
        rx,
        tracker,
        shutdown: shutdown.clone(),
        _guard: shutdown.drop_guard(),
        done: false,
        yielded: 0,
    }
}

async fn drive<S>(
    label: Label,
    mut stream: S,
    tx: mpsc::Sender<MergeItem<S::Ok, S::Error>>,
    shutdown: CancellationToken,
) where
    S: TryStream + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;

            () = shutdown.cancelled() => break,
            next = stream.try_next() => next,
        };
        let item = match next {
            Ok(Some(value)) => Ok((label.clone(), value)),
            Ok(None) => {
                debug!(%label, "source exhausted");
                break;
            }
            Err(error) => Err(MergeError::new(label.clone(), error)),
        };
        let failed = item.is_err();
        let sent = tokio::select! {
            biased;

            () = shutdown.cancelled() => break,
            sent = tx.send(item) => sent,
        };
        if sent.is_err() || failed {
            break;
        }
    }
    metrics::sub_active_sources(1);
}

/// Stream produced by [`spawn_merge`].
///
/// Dropping it cancels every worker.
pub struct SpawnedMerge<T, E> {
    rx: mpsc::Receiver<MergeItem<T, E>>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    _guard: DropGuard,
    done: bool,
    yielded: u64,
}

impl<T, E> SpawnedMerge<T, E> {
    /// Number of workers that have not finished yet.
    #[must_use]
    pub fn workers(&self) -> usize { self.tracker.len() }

    /// Number of values yielded so far.
    #[must_use]
    pub fn yielded(&self) -> u64 { self.yielded }

    /// Stop every worker and end the stream.
    ///
    /// Values already queued in the channel are discarded.
    pub fn cancel(&mut self) {
        self.shutdown.cancel();
        self.rx.close();
        self.done = true;
    }

    /// Cancel and wait until every worker has dropped its source.
    pub async fn shutdown(mut self) {
        self.cancel();
        self.tracker.wait().await;
    }
}

impl<T, E> Stream for SpawnedMerge<T, E> {
    type Item = MergeItem<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match ready!(this.rx.poll_recv(cx)) {
            Some(Ok(item)) => {
                this.yielded += 1;
                metrics::inc_merged_items();
                Poll::Ready(Some(Ok(item)))
            }
            Some(Err(error)) => {
                this.cancel();
                Poll::Ready(Some(Err(error)))
            }
            None => {
                this.done = true;
                debug!(yielded = this.yielded, "spawned merge finished");
                Poll::Ready(None)
            }
        }
    }
}

impl<T, E> FusedStream for SpawnedMerge<T, E> {
    fn is_terminated(&self) -> bool { self.done }
}

impl<T, E> std::fmt::Debug for SpawnedMerge<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedMerge")
            .field("workers", &self.tracker.len())
            .field("done", &self.done)
            .field("yielded", &self.yielded)
            .finish_non_exhaustive()
    }
}
