//! # Store Hub
//!
//! Host entry point bundling the registry, lifecycle coordinator, event
//! fan-in and router around one shared registry.

use crate::config::HubConfig;
use crate::descriptor::ProviderDescriptor;
use crate::error::IapResult;
use crate::fanin::EventFanIn;
use crate::hook::RegistrationHook;
use crate::lifecycle::{LifecycleCoordinator, StatusUpdate};
use crate::provider::ProviderFactory;
use crate::purchase::PurchaseEvent;
use crate::record::{LifecycleState, ProviderToken};
use crate::registry::ProviderRegistry;
use crate::router::PurchaseRouter;
use crate::stream::Subscription;
use std::sync::Arc;

/// Everything a host application needs to drive its store providers
pub struct StoreHub {
    registry: Arc<ProviderRegistry>,
    fanin: Arc<EventFanIn>,
    lifecycle: LifecycleCoordinator,
    router: PurchaseRouter,
}

impl StoreHub {
    pub fn new(config: HubConfig) -> Self {
        let registry = Arc::new(ProviderRegistry::with_status_buffer(config.status_buffer));
        Self::with_registry(registry, config)
    }

    /// Build a hub around an existing registry
    pub fn with_registry(registry: Arc<ProviderRegistry>, config: HubConfig) -> Self {
        let fanin = Arc::new(EventFanIn::new());
        let lifecycle = LifecycleCoordinator::new(registry.clone(), fanin.clone())
            .with_init_timeout(config.init_timeout);
        let router = PurchaseRouter::new(registry.clone());

        Self {
            registry,
            fanin,
            lifecycle,
            router,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn lifecycle(&self) -> &LifecycleCoordinator {
        &self.lifecycle
    }

    pub fn router(&self) -> &PurchaseRouter {
        &self.router
    }

    /// Point `hook` at this hub's registry
    pub fn bind_hook(&self, hook: &RegistrationHook) -> IapResult<()> {
        hook.bind_registry(&self.registry)
    }

    pub fn register(
        &self,
        descriptor: ProviderDescriptor,
        factory: ProviderFactory,
    ) -> IapResult<ProviderToken> {
        self.registry.register(descriptor, factory)
    }

    pub async fn unregister(&self, token: &ProviderToken) -> IapResult<()> {
        self.registry.unregister(token).await
    }

    pub async fn initialize_all(&self) -> Vec<(String, LifecycleState)> {
        self.lifecycle.initialize_all().await
    }

    /// Purchase events from every ready provider
    pub fn events(&self) -> Subscription<PurchaseEvent> {
        self.fanin.subscribe()
    }

    /// Status changes from every provider
    pub fn status_updates(&self) -> Subscription<StatusUpdate> {
        self.registry.status_updates()
    }

    /// Dispose every provider
    pub async fn shutdown(&self) {
        self.lifecycle.dispose_all().await;
    }
}

impl Default for StoreHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}
