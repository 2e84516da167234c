//! Live subscriptions over broadcast channels and per-subscriber queues.

use futures::stream::{BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream, UnboundedReceiverStream};
use tracing::warn;

/// A live, non-restartable stream of items pushed to one subscriber.
///
/// Only items sent after the subscription was created are observed. Over a
/// broadcast channel, a subscriber that falls more than the channel capacity
/// behind has the gap logged and skipped rather than ending the stream. Over
/// an unbounded queue nothing is skipped.
///
/// # Example
///
/// ```rust,ignore
/// use futures::StreamExt;
///
/// let mut events = hub.events();
/// while let Some(event) = events.next().await {
///     println!("{} -> {}", event.provider_id, event.status);
/// }
/// ```
pub struct Subscription<T> {
    inner: BoxStream<'static, Result<T, BroadcastStreamRecvError>>,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Wrap a broadcast receiver.
    pub fn new(receiver: broadcast::Receiver<T>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver).boxed(),
        }
    }

    /// Wrap the receiving half of a per-subscriber queue.
    pub fn from_unbounded(receiver: mpsc::UnboundedReceiver<T>) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(receiver).map(Ok).boxed(),
        }
    }

    /// Receive the next item.
    ///
    /// Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.next().await
    }

    /// Erase into a boxed stream (the shape providers hand to the core).
    pub fn boxed(self) -> BoxStream<'static, T> {
        Box::pin(self)
    }
}

impl<T: Clone + Send + 'static> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.inner.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(item))) => return Poll::Ready(Some(item)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!(skipped, "Subscriber lagged behind, items skipped");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
