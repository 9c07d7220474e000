//! Merging labelled sources into one arrival-ordered stream.
//!
//! [`merge`] keeps one pending fetch per live source and races them. Whichever
//! settles first is yielded as `(label, value)` and its next fetch is issued
//! straight away. A source that ends is retired; a source that fails ends the
//! whole merge. Output order follows settlement order, not input order.
//! Consumers that need a global order must carry their own sequence numbers.
//!
//! [`spawn_merge`] is the task-per-source alternative for `Send` sources.

mod label;
mod pending;
mod spawned;

use std::{
    collections::HashSet,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{Future, Stream, StreamExt, TryStream, stream::FusedStream, stream::FuturesUnordered};
pub use label::Label;
use pending::{PendingFetch, Settled};
pub use spawned::{
    DEFAULT_CHANNEL_CAPACITY,
    MAX_CHANNEL_CAPACITY,
    SpawnConfig,
    SpawnConfigError,
    SpawnedMerge,
    spawn_merge,
};
use thiserror::Error;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::debug;

use crate::{error::MergeError, metrics};

/// Item yielded by a merged stream.
pub type MergeItem<T, E> = Result<(Label, T), MergeError<E>>;

/// Errors returned when building a merge.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MergeConfigError {
    /// Two sources were registered under the same label.
    #[error("label `{0}` was already registered")]
    DuplicateLabel(Label),
}

/// Merge labelled sources into one stream of `(label, value)` pairs.
///
/// Labels are expected to be unique; pass a map to guarantee it, or use
/// [`Merged::builder`] to have duplicates rejected. Sources are driven only
/// while the merged stream is polled.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
///
/// use futures::{StreamExt, TryStreamExt, stream};
/// use streamplex::multiplex::merge;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let sources = BTreeMap::from([
///     ("a", stream::iter(vec![Ok::<_, std::io::Error>(1), Ok(2)])),
///     ("b", stream::iter(vec![Ok(10)])),
/// ]);
/// let items: Vec<_> = merge(sources).try_collect().await.expect("no source fails");
/// assert_eq!(items.len(), 3);
/// # }
/// ```
pub fn merge<I, L, S>(sources: I) -> Merged<S>
where
    I: IntoIterator<Item = (L, S)>,
    L: Into<Label>,
    S: TryStream + Unpin,
{
    Merged::new(
        sources
            .into_iter()
            .map(|(label, stream)| (label.into(), stream)),
        None,
    )
}

/// Builder for [`Merged`] that validates labels.
pub struct MergeBuilder<S> {
    sources: Vec<(Label, S)>,
    seen: HashSet<Label>,
    duplicate: Option<Label>,
    cancellation: Option<CancellationToken>,
}

impl<S> Default for MergeBuilder<S> {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            seen: HashSet::new(),
            duplicate: None,
            cancellation: None,
        }
    }
}

impl<S> MergeBuilder<S>
where
    S: TryStream + Unpin,
{
    /// Register `stream` under `label`.
    ///
    /// A repeated label is reported by [`MergeBuilder::build`].
    #[must_use]
    pub fn source(mut self, label: impl Into<Label>, stream: S) -> Self {
        let label = label.into();
        if !self.seen.insert(label.clone()) && self.duplicate.is_none() {
            self.duplicate = Some(label.clone());
        }
        self.sources.push((label, stream));
        self
    }

    /// End the merge at its next poll once `token` is cancelled.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Build the merged stream.
    ///
    /// # Errors
    ///
    /// Returns [`MergeConfigError::DuplicateLabel`] for the first label that
    /// was registered twice.
    pub fn build(self) -> Result<Merged<S>, MergeConfigError> {
        if let Some(label) = self.duplicate {
            return Err(MergeConfigError::DuplicateLabel(label));
        }
        Ok(Merged::new(self.sources, self.cancellation))
    }
}

/// Stream produced by [`merge`].
///
/// Holds exactly one pending fetch per source that has neither ended nor
/// failed. Values are never buffered here; each in-flight value lives inside
/// its source's pending fetch.
pub struct Merged<S> {
    active: FuturesUnordered<PendingFetch<S>>,
    cancelled: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
    done: bool,
    yielded: u64,
}

impl<S> Merged<S>
where
    S: TryStream + Unpin,
{
    /// Start building a merge with label validation.
    #[must_use]
    pub fn builder() -> MergeBuilder<S> { MergeBuilder::default() }

    fn new(
        sources: impl IntoIterator<Item = (Label, S)>,
        cancellation: Option<CancellationToken>,
    ) -> Self {
        let active: FuturesUnordered<_> = sources
            .into_iter()
            .map(|(label, stream)| PendingFetch::new(label, stream))
            .collect();
        metrics::add_active_sources(active.len());
        Self {
            active,
            cancelled: cancellation.map(|token| Box::pin(token.cancelled_owned())),
            done: false,
            yielded: 0,
        }
    }

    /// Number of sources with a fetch in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize { self.active.len() }

    /// Labels of the sources still being driven.
    #[must_use]
    pub fn active_labels(&self) -> Vec<Label> {
        self.active
            .iter()
            .filter_map(PendingFetch::label)
            .cloned()
            .collect()
    }

    /// Number of values yielded so far.
    #[must_use]
    pub fn yielded(&self) -> u64 { self.yielded }

    /// Drop every remaining source and end the stream.
    pub fn cancel(&mut self) { self.shut_down("cancelled"); }

    fn shut_down(&mut self, reason: &'static str) {
        if self.done {
            return;
        }
        self.done = true;
        self.cancelled = None;
        let abandoned = self.active.len();
        metrics::sub_active_sources(abandoned);
        self.active.clear();
        debug!(reason, abandoned, yielded = self.yielded, "merge finished");
    }

    fn retire(label: &Label) {
        metrics::sub_active_sources(1);
        debug!(%label, "source exhausted");
    }
}

impl<S> Stream for Merged<S>
where
    S: TryStream + Unpin,
{
    type Item = MergeItem<S::Ok, S::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        if let Some(cancelled) = this.cancelled.as_mut() {
            if cancelled.as_mut().poll(cx).is_ready() {
                this.shut_down("cancelled");
                return Poll::Ready(None);
            }
        }

        loop {
            let Some(Settled {
                label,
                outcome,
                stream,
            }) = futures::ready!(this.active.poll_next_unpin(cx))
            else {
                this.shut_down("all sources exhausted");
                return Poll::Ready(None);
            };

            match outcome {
                Some(Ok(value)) => {
                    this.active.push(PendingFetch::new(label.clone(), stream));
                    this.yielded += 1;
                    metrics::inc_merged_items();
                    return Poll::Ready(Some(Ok((label, value))));
                }
                Some(Err(error)) => {
                    metrics::sub_active_sources(1);
                    drop(stream);
                    debug!(%label, "source failed");
                    this.shut_down("source failed");
                    return Poll::Ready(Some(Err(MergeError::new(label, error))));
                }
                None => Self::retire(&label),
            }
        }
    }
}

impl<S> FusedStream for Merged<S>
where
    S: TryStream + Unpin,
{
    fn is_terminated(&self) -> bool { self.done }
}

impl<S> Drop for Merged<S> {
    fn drop(&mut self) {
        if !self.done {
            metrics::sub_active_sources(self.active.len());
        }
    }
}

impl<S> std::fmt::Debug for Merged<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Merged")
            .field("in_flight", &self.active.len())
            .field("done", &self.done)
            .field("yielded", &self.yielded)
            .finish_non_exhaustive()
    }
}
