//! Cancellable incremental result sequence.
//!
//! An `AggregateStream` is lazy, finite and not restartable. It ends when
//! the producer drops its `StreamSender`, after the producer reports an
//! error, or as soon as it is cancelled. Cancelling also tells the
//! producer to stop, through the shared token.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sensordash_types::AggregationResult;

use crate::coordinator::Generation;
use crate::error::QueryError;

type Item = Result<AggregationResult, QueryError>;

/// Consumer side of a streamed aggregation.
#[derive(Debug)]
pub struct AggregateStream {
    rx: mpsc::Receiver<Item>,
    cancel: CancellationToken,
    generation: Generation,
    done: bool,
}

/// Producer side of a streamed aggregation.
#[derive(Debug, Clone)]
pub struct StreamSender {
    tx: mpsc::Sender<Item>,
    cancel: CancellationToken,
}

impl AggregateStream {
    /// Create a connected sender/stream pair buffering up to `capacity` batches.
    pub fn channel(generation: Generation, capacity: usize) -> (StreamSender, AggregateStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        (
            StreamSender {
                tx,
                cancel: cancel.clone(),
            },
            AggregateStream {
                rx,
                cancel,
                generation,
                done: false,
            },
        )
    }

    /// Generation the stream was opened for.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Stop the stream. Idempotent; the producer observes it best-effort.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for AggregateStream {
    type Item = Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done || self.cancel.is_cancelled() {
            self.done = true;
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Err(e))) => {
                self.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl Drop for AggregateStream {
    fn drop(&mut self) {
        // Nobody is listening any more; let the producer stop early.
        self.cancel.cancel();
    }
}

impl StreamSender {
    /// Deliver a snapshot. Returns `false` once the stream is cancelled or gone.
    pub async fn send(&self, batch: AggregationResult) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(Ok(batch)).await.is_ok()
    }

    /// Terminate the stream with an error.
    pub async fn fail(self, error: QueryError) {
        let _ = self.tx.send(Err(error)).await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the consumer cancels.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
