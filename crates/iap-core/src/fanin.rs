//! # Event Fan-in
//!
//! Merges every ready provider's purchase-event stream into one stream for the
//! host. Events are forwarded as they arrive: per-provider order is kept,
//! nothing is deduplicated or filtered, and events are dropped while nobody is
//! subscribed.

use crate::purchase::PurchaseEvent;
use crate::stream::Subscription;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Subscribers = Arc<Mutex<Vec<UnboundedSender<PurchaseEvent>>>>;

/// Multiplexer from provider event streams to host subscribers.
///
/// Every subscriber owns an unbounded queue, so a slow subscriber never loses
/// events and never holds back the others.
#[derive(Default)]
pub struct EventFanIn {
    subscribers: Subscribers,
}

impl EventFanIn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events from every ready provider
    pub fn subscribe(&self) -> Subscription<PurchaseEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        Subscription::from_unbounded(rx)
    }

    /// Number of host subscribers currently attached
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    /// Forward `events` until the stream ends or `cancel` fires.
    ///
    /// Cancellation drops the provider stream, unsubscribing from it.
    pub(crate) fn attach(
        &self,
        provider_id: &str,
        mut events: BoxStream<'static, PurchaseEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let subscribers = Arc::clone(&self.subscribers);
        let provider_id = provider_id.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = events.next() => match next {
                        Some(mut event) => {
                            if event.provider_id.is_empty() {
                                event.provider_id = provider_id.clone();
                            }
                            deliver(&subscribers, event, &provider_id);
                        }
                        None => break,
                    },
                }
            }
            drop(events);
            debug!(provider = %provider_id, "Event subscription closed");
        })
    }
}

/// Push one event to every live subscriber, pruning the closed ones.
fn deliver(subscribers: &Subscribers, event: PurchaseEvent, provider_id: &str) {
    let mut subscribers = subscribers.lock();
    subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    if subscribers.is_empty() {
        debug!(provider = %provider_id, "No event subscribers, event dropped");
    }
}
