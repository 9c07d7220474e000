//! The in-flight "fetch next" request for one source.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::{Future, TryStream};

use super::Label;

/// Outcome of a settled fetch, carrying the stream back for reinsertion.
pub(super) struct Settled<S: TryStream> {
    pub(super) label: Label,
    pub(super) outcome: Option<Result<S::Ok, S::Error>>,
    pub(super) stream: S,
}

/// Future resolving to the next item of one labelled source.
///
/// Owns the source while in flight, so at most one fetch per source can exist.
pub(super) struct PendingFetch<S> {
    inner: Option<(Label, S)>,
}

impl<S> PendingFetch<S> {
    pub(super) fn new(label: Label, stream: S) -> Self {
        Self {
            inner: Some((label, stream)),
        }
    }

    pub(super) fn label(&self) -> Option<&Label> { self.inner.as_ref().map(|(label, _)| label) }
}

impl<S> Future for PendingFetch<S>
where
    S: TryStream + Unpin,
{
    type Output = Settled<S>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some((label, mut stream)) = self.inner.take() else {
            panic!("PendingFetch polled after completion");
        };
        match Pin::new(&mut stream).try_poll_next(cx) {
            Poll::Pending => {
                self.inner = Some((label, stream));
                Poll::Pending
            }
            Poll::Ready(outcome) => Poll::Ready(Settled {
                label,
                outcome,
                stream,
            }),
        }
    }
}
