//! # Purchase Event Handling
//!
//! Per-status callbacks for the aggregated purchase-event stream.
//! Hosts implement [`PurchaseEventHandler`] to grant entitlements, update UI,
//! or record analytics; the default methods only log.

use crate::error::IapResult;
use crate::purchase::{PurchaseEvent, PurchaseStatus};
use crate::stream::Subscription;
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Purchase event handler trait
///
/// Implement this trait to react to purchase events from any provider.
#[allow(unused_variables)]
pub trait PurchaseEventHandler: Send + Sync {
    /// Called when a purchase is awaiting store confirmation
    fn on_pending(&self, event: &PurchaseEvent) -> IapResult<()> {
        debug!(provider = %event.provider_id, product = %event.product_id, "Purchase pending");
        Ok(())
    }

    /// Called when a purchase completes
    fn on_purchased(&self, event: &PurchaseEvent) -> IapResult<()> {
        info!(
            provider = %event.provider_id,
            product = %event.product_id,
            transaction = %event.transaction_id,
            "Purchase completed"
        );
        Ok(())
    }

    /// Called when a prior purchase is restored
    fn on_restored(&self, event: &PurchaseEvent) -> IapResult<()> {
        info!(provider = %event.provider_id, product = %event.product_id, "Purchase restored");
        Ok(())
    }

    /// Called when the user cancels a purchase
    fn on_canceled(&self, event: &PurchaseEvent) -> IapResult<()> {
        info!(provider = %event.provider_id, product = %event.product_id, "Purchase canceled");
        Ok(())
    }

    /// Called when a subscription or entitlement expires
    fn on_expired(&self, event: &PurchaseEvent) -> IapResult<()> {
        info!(provider = %event.provider_id, product = %event.product_id, "Purchase expired");
        Ok(())
    }

    /// Called when the store reports a purchase error
    fn on_error(&self, event: &PurchaseEvent) -> IapResult<()> {
        warn!(provider = %event.provider_id, product = %event.product_id, "Purchase failed");
        Ok(())
    }
}

/// Default handler (just logs events)
pub struct LoggingEventHandler;

impl PurchaseEventHandler for LoggingEventHandler {}

/// Dispatch an event to the appropriate handler method
pub fn dispatch_purchase_event(
    handler: &dyn PurchaseEventHandler,
    event: &PurchaseEvent,
) -> IapResult<()> {
    match event.status {
        PurchaseStatus::Pending => handler.on_pending(event),
        PurchaseStatus::Purchased => handler.on_purchased(event),
        PurchaseStatus::Restored => handler.on_restored(event),
        PurchaseStatus::Canceled => handler.on_canceled(event),
        PurchaseStatus::Expired => handler.on_expired(event),
        PurchaseStatus::Error => handler.on_error(event),
    }
}

/// Feed every event from `events` to `handler` on a background task.
///
/// Handler errors are logged; the task ends when the stream closes.
pub fn spawn_event_dispatcher(
    handler: Arc<dyn PurchaseEventHandler>,
    mut events: Subscription<PurchaseEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let Err(e) = dispatch_purchase_event(handler.as_ref(), &event) {
                warn!(provider = %event.provider_id, error = %e, "Purchase handler failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IapError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast;

    #[derive(Default)]
    struct CountingHandler {
        purchased: AtomicUsize,
        errors: AtomicUsize,
    }

    impl PurchaseEventHandler for CountingHandler {
        fn on_purchased(&self, _event: &PurchaseEvent) -> IapResult<()> {
            self.purchased.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_error(&self, event: &PurchaseEvent) -> IapResult<()> {
            self.errors.fetch_add(1, Ordering::SeqCst);
            Err(IapError::Store(format!("cannot handle {}", event.product_id)))
        }
    }

    #[test]
    fn test_dispatch_by_status() {
        let handler = CountingHandler::default();

        dispatch_purchase_event(&handler, &PurchaseEvent::new("play", "pro", PurchaseStatus::Purchased))
            .unwrap();
        dispatch_purchase_event(&handler, &PurchaseEvent::new("play", "pro", PurchaseStatus::Pending))
            .unwrap();
        let err = dispatch_purchase_event(&handler, &PurchaseEvent::new("play", "pro", PurchaseStatus::Error));

        assert!(err.is_err());
        assert_eq!(handler.purchased.load(Ordering::SeqCst), 1);
        assert_eq!(handler.errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatcher_drains_stream() {
        let handler = Arc::new(CountingHandler::default());
        let (tx, rx) = broadcast::channel(8);
        let task = spawn_event_dispatcher(handler.clone(), Subscription::new(rx));

        tx.send(PurchaseEvent::new("play", "a", PurchaseStatus::Purchased)).unwrap();
        tx.send(PurchaseEvent::new("play", "b", PurchaseStatus::Error)).unwrap();
        tx.send(PurchaseEvent::new("play", "c", PurchaseStatus::Purchased)).unwrap();
        drop(tx);

        task.await.unwrap();
        assert_eq!(handler.purchased.load(Ordering::SeqCst), 2);
        assert_eq!(handler.errors.load(Ordering::SeqCst), 1);
    }
}
