//! # Store Provider Contract
//!
//! The polymorphic interface every store integration implements.
//! The core only ever calls these methods; how a provider talks to its native
//! store SDK is entirely its own business.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   StoreProvider (trait)                     │
//! │  ├── init() / dispose()                                     │
//! │  ├── status() / status_stream() / refresh_status()          │
//! │  ├── events()                                               │
//! │  └── query_products() / buy() / restore() / get_purchases() │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!          ┌─────────────────┼─────────────────┐
//!          │                 │                 │
//!  ┌───────┴───────┐ ┌───────┴───────┐ ┌───────┴───────┐
//!  │ PlayBilling   │ │  StoreKit     │ │   Sandbox     │
//!  │  (android)    │ │   (ios)       │ │    (any)      │
//!  └───────────────┘ └───────────────┘ └───────────────┘
//! ```

use crate::error::IapResult;
use crate::product::{Capabilities, Product, ProductType};
use crate::purchase::{PurchaseEvent, PurchaseStatus};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Point-in-time provider health as reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatus {
    /// `init()` has completed
    pub initialized: bool,
    /// The store backend is reachable
    pub available: bool,
    /// The device user is signed in to the store
    pub user_authorized: bool,
    /// Opaque provider details, for diagnostics only
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl ProviderStatus {
    /// Status of a provider that has not been initialized
    pub fn offline() -> Self {
        Self::default()
    }

    /// Status of an initialized, reachable provider
    pub fn online(user_authorized: bool) -> Self {
        Self {
            initialized: true,
            available: true,
            user_authorized,
            details: Map::new(),
        }
    }

    /// Builder: add a details entry
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Ready for catalog and purchase calls
    pub fn ready(&self) -> bool {
        self.initialized && self.available
    }
}

/// Core trait for store provider implementations.
///
/// `init()` and `dispose()` must be idempotent. `capabilities()` must be a
/// subset of the capabilities declared in the provider's descriptor; the
/// registry rejects the registration otherwise.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    /// Stable id, equal to the descriptor id.
    fn provider_id(&self) -> &str;

    /// Product types this instance can handle.
    fn capabilities(&self) -> Capabilities;

    /// Connect to the store.
    async fn init(&self) -> IapResult<()>;

    /// Release store resources.
    async fn dispose(&self) -> IapResult<()>;

    /// Latest status snapshot.
    fn status(&self) -> ProviderStatus;

    /// Live status changes from the point of subscription onward.
    fn status_stream(&self) -> BoxStream<'static, ProviderStatus>;

    /// Ask the store for fresh status.
    async fn refresh_status(&self) -> IapResult<ProviderStatus>;

    /// Live purchase events from the point of subscription onward.
    fn events(&self) -> BoxStream<'static, PurchaseEvent>;

    /// Look up products by store id. Unknown ids are omitted.
    async fn query_products(&self, ids: &BTreeSet<String>) -> IapResult<Vec<Product>>;

    /// Start a purchase. The outcome arrives on `events()`.
    async fn buy(&self, product_id: &str, offer_id: Option<&str>) -> IapResult<()>;

    /// Replay owned purchases. Results arrive on `events()`.
    async fn restore(&self) -> IapResult<()>;

    /// Known purchases, optionally filtered by the store.
    async fn get_purchases(
        &self,
        product_type: Option<ProductType>,
        status: Option<PurchaseStatus>,
    ) -> IapResult<Vec<PurchaseEvent>>;
}

/// Shared, dynamically dispatched provider instance
pub type SharedProvider = Arc<dyn StoreProvider>;

/// Zero-argument constructor the registry uses to build provider instances
pub type ProviderFactory = Arc<dyn Fn() -> SharedProvider + Send + Sync>;

/// Wrap a closure as a [`ProviderFactory`].
pub fn factory<F, P>(make: F) -> ProviderFactory
where
    F: Fn() -> P + Send + Sync + 'static,
    P: StoreProvider + 'static,
{
    Arc::new(move || Arc::new(make()) as SharedProvider)
}
