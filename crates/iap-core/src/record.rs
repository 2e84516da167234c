//! # Provider Records
//!
//! Registry-owned bookkeeping for one provider: descriptor, factory, live
//! instance, lifecycle state and the latest status snapshot.
//!
//! ```text
//! registered ──► initializing ──► ready
//!     │               │             │
//!     │               └──► failed   │
//!     │                      │      │
//!     └──────────────────────┴──────┴──► disposing ──► disposed
//! ```
//!
//! `failed` and `disposed` providers may be initialized again on request.
//! Disposing an `initializing` provider releases the record at once; the
//! instance is disposed when its in-flight `init()` returns.

use crate::descriptor::ProviderDescriptor;
use crate::error::{IapError, IapResult};
use crate::provider::{ProviderFactory, ProviderStatus, SharedProvider};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a registered provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Registered,
    Initializing,
    Ready,
    Failed,
    Disposing,
    Disposed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Registered => "registered",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Ready => "ready",
            LifecycleState::Failed => "failed",
            LifecycleState::Disposing => "disposing",
            LifecycleState::Disposed => "disposed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle returned by a successful registration.
///
/// Tokens are only minted by the registry. A token outlives its record: once
/// the provider is unregistered (or replaced) the token no longer resolves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderToken {
    key: Arc<str>,
    serial: u64,
}

impl ProviderToken {
    pub(crate) fn new(key: &str, serial: u64) -> Self {
        Self {
            key: Arc::from(key),
            serial,
        }
    }

    /// Provider id this token was issued for
    pub fn provider_id(&self) -> &str {
        &self.key
    }

    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }
}

/// Outcome of asking a record to start initializing
pub(crate) enum InitStep {
    /// Caller must run `init()` on this instance and report back with `attempt`
    Start {
        provider: SharedProvider,
        attempt: u64,
    },
    /// Already ready, nothing to do
    AlreadyReady,
    /// Another caller is running `init()` right now
    InProgress,
}

/// Outcome of asking a record to start disposing
pub(crate) enum DisposeStep {
    /// Provider was initialized; caller must run `dispose()` on it
    Dispose(SharedProvider),
    /// Provider is not initialized; no provider call needed
    Release,
    /// Already disposing or disposed
    Done,
}

struct RecordInner {
    state: LifecycleState,
    provider: SharedProvider,
    latest_status: ProviderStatus,
    last_error: Option<String>,
    subscriptions: Option<CancellationToken>,
    attempt: u64,
}

/// One registered provider
pub struct ProviderRecord {
    descriptor: ProviderDescriptor,
    factory: ProviderFactory,
    serial: u64,
    inner: Mutex<RecordInner>,
}

impl ProviderRecord {
    /// Build the instance from the factory and check it against the descriptor
    pub(crate) fn build(
        descriptor: ProviderDescriptor,
        factory: ProviderFactory,
        serial: u64,
    ) -> IapResult<Self> {
        let provider = instantiate(&descriptor, &factory)?;
        Ok(Self {
            descriptor,
            factory,
            serial,
            inner: Mutex::new(RecordInner {
                state: LifecycleState::Registered,
                provider,
                latest_status: ProviderStatus::offline(),
                last_error: None,
                subscriptions: None,
                attempt: 0,
            }),
        })
    }

    pub fn id(&self) -> &str {
        self.descriptor.id()
    }

    pub fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LifecycleState::Ready
    }

    /// Latest status snapshot seen for this provider
    pub fn latest_status(&self) -> ProviderStatus {
        self.inner.lock().latest_status.clone()
    }

    /// Error recorded by the last failed initialization
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    /// Current provider instance
    pub fn provider(&self) -> SharedProvider {
        self.inner.lock().provider.clone()
    }

    /// Provider instance, only when the record is ready
    pub fn ready_provider(&self) -> IapResult<SharedProvider> {
        let inner = self.inner.lock();
        if inner.state == LifecycleState::Ready {
            Ok(inner.provider.clone())
        } else {
            Err(IapError::ProviderNotReady {
                provider: self.id().to_string(),
                state: inner.state.to_string(),
            })
        }
    }

    pub(crate) fn token(&self) -> ProviderToken {
        ProviderToken::new(self.id(), self.serial)
    }

    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    pub(crate) fn begin_init(&self) -> IapResult<InitStep> {
        let mut inner = self.inner.lock();
        match inner.state {
            LifecycleState::Registered | LifecycleState::Failed => {}
            LifecycleState::Disposed => {
                // The old instance was released; start over with a fresh one.
                inner.provider = instantiate(&self.descriptor, &self.factory)?;
            }
            LifecycleState::Ready => return Ok(InitStep::AlreadyReady),
            LifecycleState::Initializing => return Ok(InitStep::InProgress),
            LifecycleState::Disposing => {
                return Err(IapError::ProviderNotReady {
                    provider: self.id().to_string(),
                    state: inner.state.to_string(),
                })
            }
        }
        inner.state = LifecycleState::Initializing;
        inner.last_error = None;
        inner.attempt += 1;
        Ok(InitStep::Start {
            provider: inner.provider.clone(),
            attempt: inner.attempt,
        })
    }

    /// Finish a successful `init()`; returns the token that scopes the
    /// provider's stream subscriptions.
    ///
    /// Returns `None` when the attempt was overtaken by a dispose (or by a
    /// later attempt); the caller then owns the instance and must dispose it.
    pub(crate) fn mark_ready(&self, attempt: u64, status: ProviderStatus) -> Option<CancellationToken> {
        let mut inner = self.inner.lock();
        if !inner.is_current(attempt) {
            return None;
        }
        let token = CancellationToken::new();
        inner.state = LifecycleState::Ready;
        inner.latest_status = status;
        inner.subscriptions = Some(token.clone());
        Some(token)
    }

    /// Record a failed `init()`; `None` when the attempt is stale.
    pub(crate) fn mark_failed(&self, attempt: u64, error: String) -> Option<ProviderStatus> {
        let mut inner = self.inner.lock();
        if !inner.is_current(attempt) {
            return None;
        }
        inner.state = LifecycleState::Failed;
        inner.latest_status = ProviderStatus::offline().with_detail("error", error.clone());
        inner.last_error = Some(error);
        Some(inner.latest_status.clone())
    }

    pub(crate) fn begin_dispose(&self) -> DisposeStep {
        let mut inner = self.inner.lock();
        let step = match inner.state {
            LifecycleState::Ready => DisposeStep::Dispose(inner.provider.clone()),
            LifecycleState::Registered | LifecycleState::Failed | LifecycleState::Initializing => {
                DisposeStep::Release
            }
            LifecycleState::Disposing | LifecycleState::Disposed => return DisposeStep::Done,
        };
        inner.state = LifecycleState::Disposing;
        if let Some(token) = inner.subscriptions.take() {
            token.cancel();
        }
        step
    }

    pub(crate) fn finish_dispose(&self) -> ProviderStatus {
        let mut inner = self.inner.lock();
        inner.state = LifecycleState::Disposed;
        inner.latest_status = ProviderStatus::offline();
        inner.latest_status.clone()
    }

    /// Store a status snapshot pushed by the provider
    pub(crate) fn record_status(&self, status: ProviderStatus) -> LifecycleState {
        let mut inner = self.inner.lock();
        inner.latest_status = status;
        inner.state
    }
}

impl RecordInner {
    fn is_current(&self, attempt: u64) -> bool {
        self.state == LifecycleState::Initializing && self.attempt == attempt
    }
}

impl fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("id", &self.id())
            .field("serial", &self.serial)
            .field("state", &self.state())
            .finish()
    }
}

fn instantiate(descriptor: &ProviderDescriptor, factory: &ProviderFactory) -> IapResult<SharedProvider> {
    let provider = factory();

    if provider.provider_id() != descriptor.id() {
        return Err(IapError::ProviderMismatch {
            provider: descriptor.id().to_string(),
            reason: format!("instance reports id {}", provider.provider_id()),
        });
    }

    let capabilities = provider.capabilities();
    if !capabilities.is_subset(descriptor.capabilities()) {
        let extra: Vec<&str> = capabilities
            .difference(descriptor.capabilities())
            .map(|t| t.as_str())
            .collect();
        return Err(IapError::ProviderMismatch {
            provider: descriptor.id().to_string(),
            reason: format!("undeclared capabilities: {}", extra.join(", ")),
        });
    }

    Ok(provider)
}
