//! # iap-sandbox
//!
//! In-memory sandbox store provider for storehub-rs.
//!
//! The sandbox behaves like a real store without talking to one: products
//! come from a TOML catalog, purchases complete instantly and owned items are
//! kept in a ledger that survives provider re-initialization. Useful for
//! local development and for exercising the hub end to end.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use iap_core::RegistrationHook;
//! use iap_sandbox::{SandboxCatalog, SandboxConfig, SandboxProvider};
//!
//! let config = SandboxConfig::from_env()?;
//! let catalog = SandboxCatalog::load(path)?;
//!
//! // Host has already bound the hook to its registry
//! let token = SandboxProvider::register_with(RegistrationHook::global(), config, catalog)?;
//! ```

pub mod catalog;
pub mod config;
pub mod provider;

pub use catalog::{CatalogEntry, SandboxCatalog};
pub use config::SandboxConfig;
pub use provider::{Ledger, SandboxProvider};
