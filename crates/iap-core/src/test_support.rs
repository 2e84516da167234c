//! In-memory provider used by the core's unit tests.

use crate::descriptor::ProviderDescriptor;
use crate::error::{IapError, IapResult};
use crate::product::{Capabilities, Platform, Product, ProductType};
use crate::provider::{factory, ProviderFactory, ProviderStatus, StoreProvider};
use crate::purchase::{PurchaseEvent, PurchaseStatus};
use crate::stream::Subscription;
use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Call counters and stream senders shared by every instance a factory builds
pub(crate) struct MockHandle {
    pub init_calls: AtomicUsize,
    pub dispose_calls: AtomicUsize,
    pub buy_calls: AtomicUsize,
    pub restore_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    events: broadcast::Sender<PurchaseEvent>,
    statuses: broadcast::Sender<ProviderStatus>,
}

impl MockHandle {
    fn new() -> Self {
        Self {
            init_calls: AtomicUsize::new(0),
            dispose_calls: AtomicUsize::new(0),
            buy_calls: AtomicUsize::new(0),
            restore_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            events: broadcast::channel(64).0,
            statuses: broadcast::channel(16).0,
        }
    }

    pub fn emit(&self, event: PurchaseEvent) {
        let _ = self.events.send(event);
    }

    pub fn push_status(&self, status: ProviderStatus) {
        let _ = self.statuses.send(status);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub(crate) struct MockProvider {
    id: String,
    capabilities: Capabilities,
    products: Vec<Product>,
    purchases: Vec<PurchaseEvent>,
    fail_init: bool,
    fail_calls: bool,
    init_delay: Option<Duration>,
    handle: Arc<MockHandle>,
    status: Arc<Mutex<ProviderStatus>>,
}

impl MockProvider {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            capabilities: BTreeSet::new(),
            products: Vec::new(),
            purchases: Vec::new(),
            fail_init: false,
            fail_calls: false,
            init_delay: None,
            handle: Arc::new(MockHandle::new()),
            status: Arc::new(Mutex::new(ProviderStatus::offline())),
        }
    }

    pub fn with_capabilities(mut self, caps: &[ProductType]) -> Self {
        self.capabilities = caps.iter().copied().collect();
        self
    }

    pub fn with_product(mut self, id: &str, product_type: ProductType) -> Self {
        self.capabilities.insert(product_type);
        self.products
            .push(Product::new(id, id, "$0.99", product_type, self.id.clone()));
        self
    }

    pub fn with_purchase(mut self, event: PurchaseEvent) -> Self {
        self.purchases.push(event);
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn failing_calls(mut self) -> Self {
        self.fail_calls = true;
        self
    }

    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = Some(delay);
        self
    }

    pub fn handle(&self) -> Arc<MockHandle> {
        self.handle.clone()
    }

    pub fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor::current(
            self.id.clone(),
            self.id.clone(),
            Platform::Any,
            self.capabilities.iter().copied(),
        )
        .unwrap()
    }

    /// Descriptor + factory pair, plus the handle shared by every instance
    pub fn into_parts(self) -> (ProviderDescriptor, ProviderFactory, Arc<MockHandle>) {
        let descriptor = self.descriptor();
        let handle = self.handle();
        (descriptor, factory(move || self.clone()), handle)
    }

    fn check_calls(&self) -> IapResult<()> {
        if self.fail_calls {
            Err(IapError::Store(format!("{} backend unavailable", self.id)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StoreProvider for MockProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    async fn init(&self) -> IapResult<()> {
        self.handle.init_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.init_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_init {
            return Err(IapError::Store("store client missing".to_string()));
        }
        let status = ProviderStatus::online(true);
        *self.status.lock() = status.clone();
        self.handle.push_status(status);
        Ok(())
    }

    async fn dispose(&self) -> IapResult<()> {
        self.handle.dispose_calls.fetch_add(1, Ordering::SeqCst);
        *self.status.lock() = ProviderStatus::offline();
        self.check_calls()
    }

    fn status(&self) -> ProviderStatus {
        self.status.lock().clone()
    }

    fn status_stream(&self) -> BoxStream<'static, ProviderStatus> {
        Subscription::new(self.handle.statuses.subscribe()).boxed()
    }

    async fn refresh_status(&self) -> IapResult<ProviderStatus> {
        Ok(self.status())
    }

    fn events(&self) -> BoxStream<'static, PurchaseEvent> {
        Subscription::new(self.handle.events.subscribe()).boxed()
    }

    async fn query_products(&self, ids: &BTreeSet<String>) -> IapResult<Vec<Product>> {
        self.handle.query_calls.fetch_add(1, Ordering::SeqCst);
        self.check_calls()?;
        Ok(self
            .products
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn buy(&self, product_id: &str, _offer_id: Option<&str>) -> IapResult<()> {
        self.handle.buy_calls.fetch_add(1, Ordering::SeqCst);
        self.check_calls()?;
        self.handle.emit(
            PurchaseEvent::new(self.id.clone(), product_id, PurchaseStatus::Purchased)
                .with_transaction(format!("{}-tx", product_id)),
        );
        Ok(())
    }

    async fn restore(&self) -> IapResult<()> {
        self.handle.restore_calls.fetch_add(1, Ordering::SeqCst);
        self.check_calls()
    }

    async fn get_purchases(
        &self,
        _product_type: Option<ProductType>,
        _status: Option<PurchaseStatus>,
    ) -> IapResult<Vec<PurchaseEvent>> {
        self.check_calls()?;
        // No server-side filtering: the router must filter.
        Ok(self.purchases.clone())
    }
}
