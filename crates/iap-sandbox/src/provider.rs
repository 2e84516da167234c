//! # Sandbox Provider
//!
//! In-memory implementation of `StoreProvider`.
//!
//! Purchases complete immediately: `buy()` emits `pending` followed by
//! `purchased` (or `error` for entries marked `fail_purchase`). The purchase
//! ledger outlives individual instances, so a provider rebuilt by the
//! registry after `dispose()` still remembers what the user owns.

use crate::catalog::{CatalogEntry, SandboxCatalog};
use crate::config::SandboxConfig;
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use iap_core::{
    factory, Capabilities, IapError, IapResult, Product, ProductType, ProviderDescriptor,
    ProviderStatus, ProviderToken, PurchaseEvent, PurchaseStatus, RegistrationHook, StoreProvider,
    Subscription,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;
const STATUS_CAPACITY: usize = 16;

/// Purchases recorded by the sandbox store, shared by every instance
pub type Ledger = Arc<Mutex<Vec<PurchaseEvent>>>;

/// Sandbox store provider
pub struct SandboxProvider {
    config: SandboxConfig,
    catalog: Arc<SandboxCatalog>,
    ledger: Ledger,
    status: Mutex<ProviderStatus>,
    events: broadcast::Sender<PurchaseEvent>,
    statuses: broadcast::Sender<ProviderStatus>,
}

impl SandboxProvider {
    pub fn new(config: SandboxConfig, catalog: SandboxCatalog) -> Self {
        Self::with_ledger(config, Arc::new(catalog), Ledger::default())
    }

    /// Create a provider over an existing catalog and ledger
    pub fn with_ledger(config: SandboxConfig, catalog: Arc<SandboxCatalog>, ledger: Ledger) -> Self {
        Self {
            config,
            catalog,
            ledger,
            status: Mutex::new(ProviderStatus::offline()),
            events: broadcast::channel(EVENT_CAPACITY).0,
            statuses: broadcast::channel(STATUS_CAPACITY).0,
        }
    }

    /// Descriptor advertising the catalog's product types
    pub fn descriptor(config: &SandboxConfig, catalog: &SandboxCatalog) -> IapResult<ProviderDescriptor> {
        ProviderDescriptor::current(
            config.provider_id.clone(),
            config.name.clone(),
            config.platform,
            catalog.capabilities(),
        )
    }

    /// Register a sandbox provider through `hook`.
    ///
    /// Every instance the registry builds shares one catalog and ledger.
    pub fn register_with(
        hook: &RegistrationHook,
        config: SandboxConfig,
        catalog: SandboxCatalog,
    ) -> IapResult<ProviderToken> {
        let descriptor = Self::descriptor(&config, &catalog)?;
        let catalog = Arc::new(catalog);
        let ledger = Ledger::default();

        let token = hook.register(
            descriptor,
            factory(move || SandboxProvider::with_ledger(config.clone(), catalog.clone(), ledger.clone())),
        )?;
        info!(provider = %token.provider_id(), "Sandbox provider registered");
        Ok(token)
    }

    /// Purchases recorded so far
    pub fn ledger(&self) -> Vec<PurchaseEvent> {
        self.ledger.lock().clone()
    }

    /// Expire an owned subscription, emitting an `expired` event
    pub fn expire(&self, product_id: &str) -> IapResult<()> {
        self.ensure_initialized()?;
        let entry = self.catalog_entry(product_id)?;
        if entry.product_type != ProductType::Subscription {
            return Err(IapError::InvalidRequest(format!(
                "{} is not a subscription",
                product_id
            )));
        }

        let mut ledger = self.ledger.lock();
        let before = ledger.len();
        ledger.retain(|p| p.product_id != product_id);
        if ledger.len() == before {
            return Err(IapError::Store(format!("{} is not owned", product_id)));
        }
        drop(ledger);

        self.emit(
            PurchaseEvent::new(self.id(), product_id, PurchaseStatus::Expired)
                .with_product_type(ProductType::Subscription),
        );
        Ok(())
    }

    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn ensure_initialized(&self) -> IapResult<()> {
        if self.status.lock().initialized {
            Ok(())
        } else {
            Err(IapError::Store(format!("{} is not initialized", self.id())))
        }
    }

    fn catalog_entry(&self, product_id: &str) -> IapResult<&CatalogEntry> {
        self.catalog.get(product_id).ok_or_else(|| IapError::ProductNotFound {
            product_id: product_id.to_string(),
        })
    }

    fn set_status(&self, status: ProviderStatus) {
        *self.status.lock() = status.clone();
        let _ = self.statuses.send(status);
    }

    fn emit(&self, event: PurchaseEvent) {
        debug!(
            provider = %event.provider_id,
            product = %event.product_id,
            status = %event.status,
            "Sandbox event"
        );
        let _ = self.events.send(event);
    }

    fn online_status(&self) -> ProviderStatus {
        ProviderStatus::online(self.config.user_authorized)
            .with_detail("platform", self.config.platform.as_str())
            .with_detail("catalog_size", self.catalog.len() as u64)
    }
}

#[async_trait]
impl StoreProvider for SandboxProvider {
    fn provider_id(&self) -> &str {
        self.id()
    }

    fn capabilities(&self) -> Capabilities {
        self.catalog.capabilities()
    }

    async fn init(&self) -> IapResult<()> {
        if self.status.lock().initialized {
            return Ok(());
        }
        self.set_status(self.online_status());
        info!(provider = %self.id(), products = self.catalog.len(), "Sandbox store connected");
        Ok(())
    }

    async fn dispose(&self) -> IapResult<()> {
        if !self.status.lock().initialized {
            return Ok(());
        }
        self.set_status(ProviderStatus::offline());
        info!(provider = %self.id(), "Sandbox store disconnected");
        Ok(())
    }

    fn status(&self) -> ProviderStatus {
        self.status.lock().clone()
    }

    fn status_stream(&self) -> BoxStream<'static, ProviderStatus> {
        Subscription::new(self.statuses.subscribe()).boxed()
    }

    async fn refresh_status(&self) -> IapResult<ProviderStatus> {
        Ok(self.status())
    }

    fn events(&self) -> BoxStream<'static, PurchaseEvent> {
        Subscription::new(self.events.subscribe()).boxed()
    }

    async fn query_products(&self, ids: &BTreeSet<String>) -> IapResult<Vec<Product>> {
        self.ensure_initialized()?;
        Ok(self
            .catalog
            .products
            .iter()
            .filter(|entry| ids.contains(&entry.id))
            .map(|entry| entry.to_product(self.id()))
            .collect())
    }

    async fn buy(&self, product_id: &str, offer_id: Option<&str>) -> IapResult<()> {
        self.ensure_initialized()?;
        let entry = self.catalog_entry(product_id)?;
        if !self.config.user_authorized {
            return Err(IapError::Store("user is not signed in to the store".to_string()));
        }

        let product_type = entry.product_type;
        let event = |status| {
            let event = PurchaseEvent::new(self.id(), product_id, status).with_product_type(product_type);
            match offer_id {
                Some(offer) => event.with_raw("offer_id", offer),
                None => event,
            }
        };

        if product_type != ProductType::Consumable {
            let owned = self
                .ledger
                .lock()
                .iter()
                .any(|p| p.product_id == product_id && p.status.is_entitled());
            if owned {
                warn!(provider = %self.id(), product = %product_id, "Product already owned");
                self.emit(event(PurchaseStatus::Error).with_raw("reason", "already_owned"));
                return Ok(());
            }
        }

        self.emit(event(PurchaseStatus::Pending));

        if entry.fail_purchase {
            self.emit(event(PurchaseStatus::Error).with_raw("reason", "declined"));
            return Ok(());
        }

        let purchased = event(PurchaseStatus::Purchased)
            .with_transaction(format!("sandbox-{}", Uuid::new_v4()));
        self.ledger.lock().push(purchased.clone());
        self.emit(purchased);
        Ok(())
    }

    async fn restore(&self) -> IapResult<()> {
        self.ensure_initialized()?;
        let restorable: Vec<PurchaseEvent> = self
            .ledger
            .lock()
            .iter()
            .filter(|p| p.product_type.map(|t| t.is_restorable()).unwrap_or(false))
            .cloned()
            .collect();

        info!(provider = %self.id(), count = restorable.len(), "Restoring purchases");
        for purchase in restorable {
            let mut restored = purchase;
            restored.status = PurchaseStatus::Restored;
            restored.occurred_at = Utc::now();
            self.emit(restored);
        }
        Ok(())
    }

    async fn get_purchases(
        &self,
        product_type: Option<ProductType>,
        status: Option<PurchaseStatus>,
    ) -> IapResult<Vec<PurchaseEvent>> {
        self.ensure_initialized()?;
        Ok(self
            .ledger
            .lock()
            .iter()
            .filter(|p| p.matches(product_type, status))
            .cloned()
            .collect())
    }
}
