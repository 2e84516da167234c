//! # iap-core
//!
//! Provider registry and multi-store coordination for storehub-rs.
//!
//! This crate provides:
//! - `StoreProvider` trait for implementing in-app purchase providers
//! - `ProviderDescriptor` and contract version gating
//! - `ProviderRegistry` with registration tokens and a bind-once `RegistrationHook`
//! - `LifecycleCoordinator` driving the per-provider state machine
//! - `EventFanIn` merging purchase events from every ready provider
//! - `PurchaseRouter` for catalog and purchase calls with partial-success fan-out
//! - `IapError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use iap_core::{HubConfig, ProductQuery, RegistrationHook, StoreHub};
//!
//! let hub = StoreHub::new(HubConfig::from_env()?);
//! hub.bind_hook(RegistrationHook::global())?;
//!
//! // Providers register themselves through the hook, then:
//! hub.initialize_all().await;
//!
//! let mut events = hub.events();
//! let catalog = hub.router().query_products(&ids, &ProductQuery::default()).await?;
//! hub.router().buy("pro_unlock", "play", None).await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{}: {} is {}", event.provider_id, event.product_id, event.status);
//! }
//! ```

pub mod config;
pub mod descriptor;
pub mod error;
pub mod fanin;
pub mod handler;
pub mod hook;
pub mod hub;
pub mod lifecycle;
pub mod product;
pub mod provider;
pub mod purchase;
pub mod record;
pub mod registry;
pub mod router;
pub mod stream;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use config::HubConfig;
pub use descriptor::{ProviderDescriptor, API_VERSION};
pub use error::{IapError, IapResult};
pub use fanin::EventFanIn;
pub use handler::{
    dispatch_purchase_event, spawn_event_dispatcher, LoggingEventHandler, PurchaseEventHandler,
};
pub use hook::{RegisterFn, RegistrationHook};
pub use hub::StoreHub;
pub use lifecycle::{LifecycleCoordinator, StatusUpdate};
pub use product::{Capabilities, Platform, Product, ProductType};
pub use provider::{factory, ProviderFactory, ProviderStatus, SharedProvider, StoreProvider};
pub use purchase::{PurchaseEvent, PurchaseStatus};
pub use record::{LifecycleState, ProviderRecord, ProviderToken};
pub use registry::ProviderRegistry;
pub use router::{FanOut, ProductQuery, ProviderFailure, PurchaseQuery, PurchaseRouter};
pub use stream::Subscription;
