//! # Lifecycle Coordinator
//!
//! Drives registered providers through initialization and disposal, and
//! republishes each ready provider's status stream on the registry's
//! aggregated status channel.
//!
//! Initialization failures never propagate out of `initialize_all()`: the
//! provider moves to `failed`, the error is kept on its record and a status
//! update carrying the error is published. Failed providers are not retried
//! automatically.

use crate::error::{IapError, IapResult};
use crate::fanin::EventFanIn;
use crate::provider::{ProviderStatus, SharedProvider};
use crate::record::{InitStep, LifecycleState, ProviderRecord};
use crate::registry::ProviderRegistry;
use crate::stream::Subscription;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// A provider status change, tagged with its provider
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub provider_id: String,
    pub state: LifecycleState,
    pub status: ProviderStatus,
    pub at: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(provider_id: impl Into<String>, state: LifecycleState, status: ProviderStatus) -> Self {
        Self {
            provider_id: provider_id.into(),
            state,
            status,
            at: Utc::now(),
        }
    }
}

/// Lifecycle control over every registered provider
pub struct LifecycleCoordinator {
    registry: Arc<ProviderRegistry>,
    fanin: Arc<EventFanIn>,
    init_timeout: Option<Duration>,
}

impl LifecycleCoordinator {
    pub fn new(registry: Arc<ProviderRegistry>, fanin: Arc<EventFanIn>) -> Self {
        Self {
            registry,
            fanin,
            init_timeout: None,
        }
    }

    /// Builder: treat an `init()` running longer than `limit` as failed
    pub fn with_init_timeout(mut self, limit: Option<Duration>) -> Self {
        self.init_timeout = limit;
        self
    }

    /// Initialize every provider still in `registered`, concurrently.
    ///
    /// Returns each attempted provider with the state it ended in.
    #[instrument(skip(self))]
    pub async fn initialize_all(&self) -> Vec<(String, LifecycleState)> {
        let pending: Vec<Arc<ProviderRecord>> = self
            .registry
            .providers()
            .into_iter()
            .filter(|r| r.state() == LifecycleState::Registered)
            .collect();

        info!(count = pending.len(), "Initializing providers");

        let results = join_all(pending.iter().map(|record| async move {
            match self.initialize_record(record).await {
                Ok(state) => (record.id().to_string(), state),
                Err(e) => {
                    warn!(provider = record.id(), error = %e, "Could not start initialization");
                    (record.id().to_string(), record.state())
                }
            }
        }))
        .await;

        let ready = results
            .iter()
            .filter(|(_, s)| *s == LifecycleState::Ready)
            .count();
        info!(ready, failed = results.len() - ready, "Provider initialization finished");
        results
    }

    /// Initialize one provider on demand (also retries `failed` ones).
    ///
    /// An `init()` failure is reported through the returned state, not as an
    /// error; errors are reserved for unknown ids and providers mid-disposal.
    #[instrument(skip(self))]
    pub async fn initialize(&self, provider_id: &str) -> IapResult<LifecycleState> {
        let record = self.registry.resolve(provider_id)?;
        self.initialize_record(&record).await
    }

    /// Dispose one provider; its stream subscriptions end immediately.
    #[instrument(skip(self))]
    pub async fn dispose(&self, provider_id: &str) -> IapResult<()> {
        let record = self.registry.resolve(provider_id)?;
        self.registry.dispose_record(&record).await
    }

    /// Dispose every provider, logging failures
    pub async fn dispose_all(&self) {
        for record in self.registry.providers() {
            if let Err(e) = self.registry.dispose_record(&record).await {
                warn!(provider = record.id(), error = %e, "Dispose failed");
            }
        }
    }

    /// Ask a ready provider for fresh status and publish it
    #[instrument(skip(self))]
    pub async fn refresh_status(&self, provider_id: &str) -> IapResult<ProviderStatus> {
        let record = self.registry.resolve(provider_id)?;
        let provider = record.ready_provider()?;
        let status = provider
            .refresh_status()
            .await
            .map_err(|e| IapError::provider_failed(record.id(), "refresh_status", e))?;
        record.record_status(status.clone());
        self.registry.publish_status(&record, status.clone());
        Ok(status)
    }

    /// Subscribe to provider-tagged status updates
    pub fn status_updates(&self) -> Subscription<StatusUpdate> {
        self.registry.status_updates()
    }

    async fn initialize_record(&self, record: &Arc<ProviderRecord>) -> IapResult<LifecycleState> {
        let (provider, attempt) = match record.begin_init()? {
            InitStep::Start { provider, attempt } => (provider, attempt),
            InitStep::AlreadyReady | InitStep::InProgress => return Ok(record.state()),
        };

        debug!(provider = record.id(), attempt, "Calling provider init");
        match self.run_init(&provider).await {
            Ok(()) => self.on_ready(record, &provider, attempt).await,
            Err(e) => {
                let e = IapError::provider_failed(record.id(), "init", e);
                warn!(provider = record.id(), error = %e, "Provider initialization failed");
                match record.mark_failed(attempt, e.to_string()) {
                    Some(status) => self.registry.publish_status(record, status),
                    None => debug!(provider = record.id(), "Init failure superseded by dispose"),
                }
            }
        }
        Ok(record.state())
    }

    async fn run_init(&self, provider: &SharedProvider) -> IapResult<()> {
        match self.init_timeout {
            Some(limit) => tokio::time::timeout(limit, provider.init())
                .await
                .unwrap_or_else(|_| Err(IapError::Store(format!("init timed out after {:?}", limit)))),
            None => provider.init().await,
        }
    }

    async fn on_ready(&self, record: &Arc<ProviderRecord>, provider: &SharedProvider, attempt: u64) {
        // Subscribe before flipping to ready so nothing emitted afterwards is lost.
        let statuses = provider.status_stream();
        let events = provider.events();
        let snapshot = provider.status();

        let Some(cancel) = record.mark_ready(attempt, snapshot.clone()) else {
            // Disposed while init() was running; this instance is ours to release.
            drop(statuses);
            drop(events);
            info!(provider = record.id(), "Provider disposed during init, releasing instance");
            if let Err(e) = provider.dispose().await {
                let e = IapError::provider_failed(record.id(), "dispose", e);
                warn!(provider = record.id(), error = %e, "Dispose failed after init");
            }
            return;
        };

        spawn_status_forwarder(self.registry.clone(), record.clone(), statuses, cancel.clone());
        self.fanin.attach(record.id(), events, cancel);
        self.registry.publish_status(record, snapshot);
        info!(provider = record.id(), "Provider ready");
    }
}

fn spawn_status_forwarder(
    registry: Arc<ProviderRegistry>,
    record: Arc<ProviderRecord>,
    mut statuses: BoxStream<'static, ProviderStatus>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = statuses.next() => match next {
                    Some(status) => {
                        record.record_status(status.clone());
                        registry.publish_status(&record, status);
                    }
                    None => break,
                },
            }
        }
        debug!(provider = record.id(), "Status subscription closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::ProductType;
    use crate::test_support::{MockHandle, MockProvider};
    use std::time::Duration;
    use tokio::time::timeout;

    fn setup() -> (Arc<ProviderRegistry>, LifecycleCoordinator) {
        let registry = Arc::new(ProviderRegistry::new());
        let fanin = Arc::new(EventFanIn::new());
        let lifecycle = LifecycleCoordinator::new(registry.clone(), fanin);
        (registry, lifecycle)
    }

    #[tokio::test]
    async fn test_initialize_all_reaches_ready_or_failed() {
        let (registry, lifecycle) = setup();
        for mock in [
            MockProvider::new("a"),
            MockProvider::new("b").failing_init(),
            MockProvider::new("c").with_product("gems", ProductType::Consumable),
        ] {
            let (d, f, _) = mock.into_parts();
            registry.register(d, f).unwrap();
        }

        let results = lifecycle.initialize_all().await;
        assert_eq!(results.len(), 3);

        for record in registry.providers() {
            assert!(
                matches!(record.state(), LifecycleState::Ready | LifecycleState::Failed),
                "{} left in {}",
                record.id(),
                record.state()
            );
        }
        assert_eq!(registry.lookup("b").unwrap().state(), LifecycleState::Failed);
        assert!(registry
            .lookup("b")
            .unwrap()
            .last_error()
            .unwrap()
            .contains("store client missing"));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (registry, lifecycle) = setup();
        let (d, f, handle) = MockProvider::new("a").into_parts();
        registry.register(d, f).unwrap();

        assert_eq!(lifecycle.initialize("a").await.unwrap(), LifecycleState::Ready);
        assert_eq!(lifecycle.initialize("a").await.unwrap(), LifecycleState::Ready);
        assert_eq!(MockHandle::count(&handle.init_calls), 1);

        lifecycle.initialize_all().await;
        assert_eq!(MockHandle::count(&handle.init_calls), 1);
    }

    #[tokio::test]
    async fn test_failure_surfaces_on_status_stream() {
        let (registry, lifecycle) = setup();
        let (d, f, _) = MockProvider::new("broken").failing_init().into_parts();
        registry.register(d, f).unwrap();

        let mut updates = lifecycle.status_updates();
        lifecycle.initialize_all().await;

        let update = timeout(Duration::from_secs(1), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.provider_id, "broken");
        assert_eq!(update.state, LifecycleState::Failed);
        assert!(!update.status.ready());
        assert!(update.status.details.contains_key("error"));
    }

    #[tokio::test]
    async fn test_failed_provider_retried_only_on_request() {
        let (registry, lifecycle) = setup();
        let (d, f, handle) = MockProvider::new("broken").failing_init().into_parts();
        registry.register(d, f).unwrap();

        lifecycle.initialize_all().await;
        lifecycle.initialize_all().await;
        assert_eq!(MockHandle::count(&handle.init_calls), 1);

        assert_eq!(
            lifecycle.initialize("broken").await.unwrap(),
            LifecycleState::Failed
        );
        assert_eq!(MockHandle::count(&handle.init_calls), 2);
    }

    #[tokio::test]
    async fn test_status_changes_are_forwarded_with_provider_id() {
        let (registry, lifecycle) = setup();
        let (d, f, handle) = MockProvider::new("play").into_parts();
        registry.register(d, f).unwrap();
        lifecycle.initialize("play").await.unwrap();

        let mut updates = lifecycle.status_updates();
        handle.push_status(ProviderStatus::online(false).with_detail("reason", "signed out"));

        let update = timeout(Duration::from_secs(1), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.provider_id, "play");
        assert_eq!(update.state, LifecycleState::Ready);
        assert!(!update.status.user_authorized);
        assert!(!registry.lookup("play").unwrap().latest_status().user_authorized);
    }

    #[tokio::test]
    async fn test_dispose_then_reinitialize() {
        let (registry, lifecycle) = setup();
        let (d, f, handle) = MockProvider::new("play").into_parts();
        registry.register(d, f).unwrap();

        lifecycle.initialize("play").await.unwrap();
        lifecycle.dispose("play").await.unwrap();
        lifecycle.dispose("play").await.unwrap();

        let record = registry.lookup("play").unwrap();
        assert_eq!(record.state(), LifecycleState::Disposed);
        assert_eq!(MockHandle::count(&handle.dispose_calls), 1);

        assert_eq!(lifecycle.initialize("play").await.unwrap(), LifecycleState::Ready);
        assert_eq!(MockHandle::count(&handle.init_calls), 2);
    }

    #[tokio::test]
    async fn test_init_timeout_marks_failed() {
        let registry = Arc::new(ProviderRegistry::new());
        let lifecycle = LifecycleCoordinator::new(registry.clone(), Arc::new(EventFanIn::new()))
            .with_init_timeout(Some(Duration::from_millis(20)));
        let (d, f, _) = MockProvider::new("slow")
            .with_init_delay(Duration::from_secs(5))
            .into_parts();
        registry.register(d, f).unwrap();

        assert_eq!(lifecycle.initialize("slow").await.unwrap(), LifecycleState::Failed);
        assert!(registry
            .lookup("slow")
            .unwrap()
            .last_error()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let (_, lifecycle) = setup();
        assert!(matches!(
            lifecycle.initialize("nope").await,
            Err(IapError::UnknownProvider { .. })
        ));
        assert!(matches!(
            lifecycle.refresh_status("nope").await,
            Err(IapError::UnknownProvider { .. })
        ));
    }

    #[tokio::test]
    async fn test_dispose_during_init() {
        let (registry, lifecycle) = setup();
        let lifecycle = Arc::new(lifecycle);
        let (d, f, handle) = MockProvider::new("slow")
            .with_init_delay(Duration::from_millis(200))
            .into_parts();
        registry.register(d, f).unwrap();

        let init = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move { lifecycle.initialize("slow").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let record = registry.lookup("slow").unwrap();
        assert_eq!(record.state(), LifecycleState::Initializing);
        lifecycle.dispose("slow").await.unwrap();
        assert_eq!(record.state(), LifecycleState::Disposed);

        let reached = init.await.unwrap().unwrap();
        assert_eq!(reached, LifecycleState::Disposed);
        assert_eq!(record.state(), LifecycleState::Disposed);
        assert_eq!(MockHandle::count(&handle.dispose_calls), 1);
        assert!(record.ready_provider().is_err());
    }

    #[tokio::test]
    async fn test_unregister_during_init() {
        let (registry, lifecycle) = setup();
        let lifecycle = Arc::new(lifecycle);
        let (d, f, handle) = MockProvider::new("slow")
            .with_init_delay(Duration::from_millis(200))
            .into_parts();
        let token = registry.register(d, f).unwrap();

        let init = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move { lifecycle.initialize("slow").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        registry.unregister(&token).await.unwrap();
        assert!(registry.lookup("slow").is_none());
        assert!(registry.is_empty());

        init.await.unwrap().unwrap();
        assert!(registry.lookup("slow").is_none());
        assert_eq!(MockHandle::count(&handle.dispose_calls), 1);
    }

    #[tokio::test]
    async fn test_replace_during_init_disposes_old_instance() {
        let (registry, lifecycle) = setup();
        let lifecycle = Arc::new(lifecycle);
        let (d, f, old) = MockProvider::new("play")
            .with_init_delay(Duration::from_millis(200))
            .into_parts();
        registry.register(d.clone(), f).unwrap();

        let init = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move { lifecycle.initialize("play").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (_, f2, _) = MockProvider::new("play").into_parts();
        registry.replace(d, f2).await.unwrap();
        init.await.unwrap().unwrap();

        assert_eq!(MockHandle::count(&old.dispose_calls), 1);
        assert_eq!(registry.lookup("play").unwrap().state(), LifecycleState::Registered);
        assert_eq!(lifecycle.initialize("play").await.unwrap(), LifecycleState::Ready);
    }
}
