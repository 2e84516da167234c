//! # Registration Hook
//!
//! Bind-once slot through which providers register themselves.
//!
//! The host binds the slot at startup, before any provider tries to register;
//! providers then call [`RegistrationHook::register`] without needing a handle
//! to the registry. Calling it before binding fails with `HookNotBound`,
//! binding twice fails with `HookAlreadyBound`, and `unbind()` tears it down.
//!
//! ```rust,ignore
//! let hub = StoreHub::new(HubConfig::from_env()?);
//! hub.bind_hook(RegistrationHook::global())?;
//!
//! // inside a provider crate
//! let token = RegistrationHook::global().register(descriptor, factory)?;
//! ```

use crate::descriptor::ProviderDescriptor;
use crate::error::{IapError, IapResult};
use crate::provider::ProviderFactory;
use crate::record::ProviderToken;
use crate::registry::ProviderRegistry;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tracing::info;

/// Function the hook forwards registrations to
pub type RegisterFn =
    Arc<dyn Fn(ProviderDescriptor, ProviderFactory) -> IapResult<ProviderToken> + Send + Sync>;

static GLOBAL_HOOK: RegistrationHook = RegistrationHook::new();

/// Settable registration slot
pub struct RegistrationHook {
    slot: RwLock<Option<RegisterFn>>,
}

impl RegistrationHook {
    /// Create an unbound hook
    pub const fn new() -> Self {
        Self {
            slot: parking_lot::const_rwlock(None),
        }
    }

    /// The process-wide hook
    pub fn global() -> &'static RegistrationHook {
        &GLOBAL_HOOK
    }

    /// Bind the hook to a registration function
    pub fn bind(&self, register: RegisterFn) -> IapResult<()> {
        let mut slot = self.slot.write();
        if slot.is_some() {
            return Err(IapError::HookAlreadyBound);
        }
        *slot = Some(register);
        info!("Registration hook bound");
        Ok(())
    }

    /// Bind the hook to a registry.
    ///
    /// Only a weak reference is kept; once the registry is dropped the hook
    /// behaves as unbound.
    pub fn bind_registry(&self, registry: &Arc<ProviderRegistry>) -> IapResult<()> {
        let weak: Weak<ProviderRegistry> = Arc::downgrade(registry);
        self.bind(Arc::new(move |descriptor, factory| {
            let registry = weak.upgrade().ok_or(IapError::HookNotBound)?;
            registry.register(descriptor, factory)
        }))
    }

    /// Clear the binding; returns whether one was present
    pub fn unbind(&self) -> bool {
        let was_bound = self.slot.write().take().is_some();
        if was_bound {
            info!("Registration hook unbound");
        }
        was_bound
    }

    pub fn is_bound(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Register a provider through the bound function
    pub fn register(
        &self,
        descriptor: ProviderDescriptor,
        factory: ProviderFactory,
    ) -> IapResult<ProviderToken> {
        let register = self.slot.read().clone().ok_or(IapError::HookNotBound)?;
        register(descriptor, factory)
    }
}

impl Default for RegistrationHook {
    fn default() -> Self {
        Self::new()
    }
}
