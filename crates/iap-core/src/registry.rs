//! # Provider Registry
//!
//! Process-wide table of registered store providers, in registration order.
//! Owns every `ProviderRecord`, gates registration on contract version
//! compatibility and forwards provider status changes to subscribers.

use crate::descriptor::{ProviderDescriptor, API_VERSION};
use crate::error::{IapError, IapResult};
use crate::lifecycle::StatusUpdate;
use crate::product::ProductType;
use crate::provider::{ProviderFactory, ProviderStatus};
use crate::record::{DisposeStep, ProviderRecord, ProviderToken};
use crate::stream::Subscription;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Default capacity of the aggregated status channel
pub const DEFAULT_STATUS_BUFFER: usize = 64;

/// Registry of all store providers
pub struct ProviderRegistry {
    api_version: u32,
    records: RwLock<Vec<Arc<ProviderRecord>>>,
    next_serial: AtomicU64,
    status_tx: broadcast::Sender<StatusUpdate>,
}

impl ProviderRegistry {
    /// Create an empty registry running the current contract version
    pub fn new() -> Self {
        Self::with_status_buffer(DEFAULT_STATUS_BUFFER)
    }

    /// Create an empty registry with a custom status channel capacity
    pub fn with_status_buffer(capacity: usize) -> Self {
        let (status_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            api_version: API_VERSION,
            records: RwLock::new(Vec::new()),
            next_serial: AtomicU64::new(1),
            status_tx,
        }
    }

    /// Builder: gate registrations on a different contract version
    pub fn with_api_version(mut self, version: u32) -> Self {
        self.api_version = version;
        self
    }

    /// Contract version registrations are checked against
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    /// Register a provider.
    ///
    /// Fails with `VersionIncompatible` when the descriptor does not support
    /// the running contract version, with `DuplicateProvider` when the id is
    /// taken, and with `ProviderMismatch` when the factory's instance disagrees
    /// with the descriptor. The new record starts out `registered`.
    pub fn register(
        &self,
        descriptor: ProviderDescriptor,
        factory: ProviderFactory,
    ) -> IapResult<ProviderToken> {
        // Skip building an instance for an id that is already taken.
        if self.lookup(descriptor.id()).is_some() {
            return Err(IapError::DuplicateProvider {
                provider: descriptor.id().to_string(),
            });
        }
        let record = self.build_record(descriptor, factory)?;

        let mut records = self.records.write();
        if records.iter().any(|r| r.id() == record.id()) {
            return Err(IapError::DuplicateProvider {
                provider: record.id().to_string(),
            });
        }
        let token = record.token();
        records.push(Arc::new(record));
        drop(records);

        info!(provider = token.provider_id(), "Registered provider");
        Ok(token)
    }

    /// Register a provider, replacing any existing one with the same id.
    ///
    /// The replacement keeps the old record's routing position. The previous
    /// provider is disposed best-effort; its token stops resolving.
    pub async fn replace(
        &self,
        descriptor: ProviderDescriptor,
        factory: ProviderFactory,
    ) -> IapResult<ProviderToken> {
        let record = Arc::new(self.build_record(descriptor, factory)?);
        let token = record.token();

        let previous = {
            let mut records = self.records.write();
            match records.iter().position(|r| r.id() == record.id()) {
                Some(index) => Some(std::mem::replace(&mut records[index], record)),
                None => {
                    records.push(record);
                    None
                }
            }
        };

        if let Some(old) = previous {
            info!(provider = token.provider_id(), "Replacing provider");
            if let Err(e) = self.dispose_record(&old).await {
                warn!(provider = old.id(), error = %e, "Replaced provider did not dispose cleanly");
            }
        } else {
            info!(provider = token.provider_id(), "Registered provider");
        }

        Ok(token)
    }

    /// Remove a provider, disposing it first when it was initialized.
    ///
    /// The record is always removed. Failures from the provider's own
    /// `dispose()` are logged, not returned. A provider still initializing is
    /// disposed once its `init()` returns.
    pub async fn unregister(&self, token: &ProviderToken) -> IapResult<()> {
        let record = self.lookup_token(token)?;

        if let Err(e) = self.dispose_record(&record).await {
            warn!(provider = record.id(), error = %e, "Dispose failed during unregister");
        }

        self.records
            .write()
            .retain(|r| !(r.id() == token.provider_id() && r.serial() == token.serial()));

        info!(provider = token.provider_id(), "Unregistered provider");
        Ok(())
    }

    /// Find a provider by id
    pub fn lookup(&self, provider_id: &str) -> Option<Arc<ProviderRecord>> {
        self.records
            .read()
            .iter()
            .find(|r| r.id() == provider_id)
            .cloned()
    }

    /// Find a provider by id or fail with `UnknownProvider`
    pub fn resolve(&self, provider_id: &str) -> IapResult<Arc<ProviderRecord>> {
        self.lookup(provider_id)
            .ok_or_else(|| IapError::UnknownProvider {
                provider: provider_id.to_string(),
            })
    }

    /// Providers declaring the given product type, in registration order
    pub fn providers_for(&self, product_type: ProductType) -> Vec<Arc<ProviderRecord>> {
        self.records
            .read()
            .iter()
            .filter(|r| r.descriptor().handles(product_type))
            .cloned()
            .collect()
    }

    /// All providers, in registration order
    pub fn providers(&self) -> Vec<Arc<ProviderRecord>> {
        self.records.read().clone()
    }

    /// Ready providers, optionally restricted to a product type
    pub fn ready_providers(&self, product_type: Option<ProductType>) -> Vec<Arc<ProviderRecord>> {
        let candidates = match product_type {
            Some(t) => self.providers_for(t),
            None => self.providers(),
        };
        candidates.into_iter().filter(|r| r.is_ready()).collect()
    }

    /// Get all provider ids, in registration order
    pub fn provider_ids(&self) -> Vec<String> {
        self.records.read().iter().map(|r| r.id().to_string()).collect()
    }

    /// Get number of providers
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Subscribe to provider-tagged status updates
    pub fn status_updates(&self) -> Subscription<StatusUpdate> {
        Subscription::new(self.status_tx.subscribe())
    }

    pub(crate) fn publish_status(&self, record: &ProviderRecord, status: ProviderStatus) {
        let update = StatusUpdate::new(record.id(), record.state(), status);
        // No receivers is fine: status updates are live only.
        if self.status_tx.send(update).is_err() {
            debug!(provider = record.id(), "No status subscribers");
        }
    }

    /// Drive a record through `disposing → disposed`.
    ///
    /// Returns `ProviderOperationFailed` when the provider's `dispose()` fails;
    /// the record ends up `disposed` either way.
    pub(crate) async fn dispose_record(&self, record: &ProviderRecord) -> IapResult<()> {
        let outcome = match record.begin_dispose() {
            DisposeStep::Done => return Ok(()),
            DisposeStep::Release => Ok(()),
            DisposeStep::Dispose(provider) => provider
                .dispose()
                .await
                .map_err(|e| IapError::provider_failed(record.id(), "dispose", e)),
        };

        let status = record.finish_dispose();
        self.publish_status(record, status);
        info!(provider = record.id(), "Provider disposed");
        outcome
    }

    fn build_record(
        &self,
        descriptor: ProviderDescriptor,
        factory: ProviderFactory,
    ) -> IapResult<ProviderRecord> {
        if !descriptor.supports(self.api_version) {
            return Err(IapError::VersionIncompatible {
                provider: descriptor.id().to_string(),
                version: self.api_version,
                min: descriptor.api_version_min(),
                max: descriptor.api_version_max(),
            });
        }
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        ProviderRecord::build(descriptor, factory, serial)
    }

    fn lookup_token(&self, token: &ProviderToken) -> IapResult<Arc<ProviderRecord>> {
        self.records
            .read()
            .iter()
            .find(|r| r.id() == token.provider_id() && r.serial() == token.serial())
            .cloned()
            .ok_or_else(|| IapError::UnknownProvider {
                provider: token.provider_id().to_string(),
            })
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::Platform;
    use crate::provider::factory;
    use crate::record::{InitStep, LifecycleState};
    use crate::test_support::{MockHandle, MockProvider};
    use std::sync::atomic::AtomicUsize;

    fn make_ready(record: &ProviderRecord, status: ProviderStatus) {
        match record.begin_init().unwrap() {
            InitStep::Start { attempt, .. } => {
                record.mark_ready(attempt, status).unwrap();
            }
            _ => panic!("{} did not start initializing", record.id()),
        }
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let registry = ProviderRegistry::new();
        let (descriptor, first, _) = MockProvider::new("play")
            .with_product("gems", ProductType::Consumable)
            .into_parts();
        let (_, second, _) = MockProvider::new("play").into_parts();

        let token = registry.register(descriptor.clone(), first).unwrap();
        let renamed = descriptor.with_name("Second Play");
        let err = registry.register(renamed, second).unwrap_err();

        assert!(matches!(err, IapError::DuplicateProvider { ref provider } if provider == "play"));
        assert_eq!(registry.len(), 1);
        let record = registry.lookup("play").unwrap();
        assert_eq!(record.descriptor().name(), "play");
        assert_eq!(record.token(), token);
    }

    #[test]
    fn test_version_incompatible_leaves_registry_unchanged() {
        let registry = ProviderRegistry::new().with_api_version(3);
        let (descriptor, make, _) = MockProvider::new("old").into_parts();
        let descriptor = descriptor.with_api_versions(1, 2).unwrap();

        let err = registry.register(descriptor, make).unwrap_err();
        assert!(matches!(
            err,
            IapError::VersionIncompatible { version: 3, min: 1, max: 2, .. }
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_providers_for_in_registration_order() {
        let registry = ProviderRegistry::new();
        for (id, t) in [
            ("b-store", ProductType::Subscription),
            ("a-store", ProductType::Consumable),
            ("c-store", ProductType::Subscription),
        ] {
            let (d, f, _) = MockProvider::new(id).with_product("x", t).into_parts();
            registry.register(d, f).unwrap();
        }

        let subs: Vec<String> = registry
            .providers_for(ProductType::Subscription)
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(subs, vec!["b-store", "c-store"]);
        assert!(registry.providers_for(ProductType::NonConsumable).is_empty());
        assert_eq!(registry.provider_ids(), vec!["b-store", "a-store", "c-store"]);
    }

    #[test]
    fn test_mismatched_instance_rejected() {
        let registry = ProviderRegistry::new();
        let descriptor =
            ProviderDescriptor::current("play", "Play", Platform::Android, [ProductType::Consumable])
                .unwrap();
        let make = factory(|| MockProvider::new("play").with_capabilities(&[ProductType::Subscription]));

        let err = registry.register(descriptor, make).unwrap_err();
        assert!(matches!(err, IapError::ProviderMismatch { .. }));
        assert!(registry.lookup("play").is_none());
    }

    #[tokio::test]
    async fn test_unregister_ready_provider_disposes_once() {
        let registry = ProviderRegistry::new();
        let (descriptor, make, handle) = MockProvider::new("play").into_parts();
        let token = registry.register(descriptor, make).unwrap();

        let record = registry.lookup("play").unwrap();
        make_ready(&record, ProviderStatus::online(true));

        registry.unregister(&token).await.unwrap();

        assert_eq!(MockHandle::count(&handle.dispose_calls), 1);
        assert_eq!(record.state(), LifecycleState::Disposed);
        assert!(registry.lookup("play").is_none());

        let err = registry.unregister(&token).await.unwrap_err();
        assert!(matches!(err, IapError::UnknownProvider { .. }));
    }

    #[tokio::test]
    async fn test_unregister_registered_provider_skips_dispose() {
        let registry = ProviderRegistry::new();
        let (descriptor, make, handle) = MockProvider::new("play").into_parts();
        let token = registry.register(descriptor, make).unwrap();

        registry.unregister(&token).await.unwrap();
        assert_eq!(MockHandle::count(&handle.dispose_calls), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_swallows_dispose_failure() {
        let registry = ProviderRegistry::new();
        let (descriptor, make, handle) = MockProvider::new("flaky").failing_calls().into_parts();
        let token = registry.register(descriptor, make).unwrap();
        let record = registry.lookup("flaky").unwrap();
        make_ready(&record, ProviderStatus::online(false));

        registry.unregister(&token).await.unwrap();
        assert_eq!(MockHandle::count(&handle.dispose_calls), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_replace_swaps_record_and_invalidates_old_token() {
        let registry = ProviderRegistry::new();
        let (d1, f1, h1) = MockProvider::new("play").into_parts();
        let (other_d, other_f, _) = MockProvider::new("other").into_parts();
        let old_token = registry.register(d1.clone(), f1).unwrap();
        registry.register(other_d, other_f).unwrap();

        let old = registry.lookup("play").unwrap();
        make_ready(&old, ProviderStatus::online(true));

        let (_, f2, _) = MockProvider::new("play").into_parts();
        let new_token = registry
            .replace(d1.with_name("Play v2"), f2)
            .await
            .unwrap();

        assert_ne!(old_token, new_token);
        assert_eq!(MockHandle::count(&h1.dispose_calls), 1);
        assert_eq!(registry.provider_ids(), vec!["play", "other"]);
        assert_eq!(registry.lookup("play").unwrap().descriptor().name(), "Play v2");
        assert!(registry.unregister(&old_token).await.is_err());
        assert!(registry.unregister(&new_token).await.is_ok());
    }

    #[test]
    fn test_duplicate_registration_skips_factory() {
        let registry = ProviderRegistry::new();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let make = factory(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            MockProvider::new("play")
        });
        let descriptor = MockProvider::new("play").descriptor();

        registry.register(descriptor.clone(), make.clone()).unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 1);

        let err = registry.register(descriptor, make).unwrap_err();
        assert!(matches!(err, IapError::DuplicateProvider { .. }));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration_of_one_id() {
        const TASKS: usize = 16;
        let registry = Arc::new(ProviderRegistry::new());
        let start = Arc::new(tokio::sync::Barrier::new(TASKS));

        let tasks: Vec<_> = (0..TASKS)
            .map(|_| {
                let registry = registry.clone();
                let start = start.clone();
                tokio::spawn(async move {
                    let (descriptor, make, _) = MockProvider::new("dup").into_parts();
                    start.wait().await;
                    registry.register(descriptor, make)
                })
            })
            .collect();

        let mut accepted = 0;
        let mut duplicates = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(IapError::DuplicateProvider { provider }) => {
                    assert_eq!(provider, "dup");
                    duplicates += 1;
                }
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(duplicates, TASKS - 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.provider_ids(), vec!["dup"]);
    }
}
