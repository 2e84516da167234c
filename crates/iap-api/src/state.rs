//! # Application State
//!
//! Shared state for the Axum application.
//! Wraps the store hub and the host configuration.

use iap_core::config::parse_var;
use iap_core::{HubConfig, IapError, IapResult, RegistrationHook, StoreHub};
use iap_sandbox::{SandboxCatalog, SandboxConfig, SandboxProvider};
use std::net::SocketAddr;
use std::sync::Arc;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Environment (development, staging, production)
    pub environment: String,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> IapResult<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("PORT")?.unwrap_or(8080),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        })
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> IapResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| IapError::Configuration(format!("Invalid socket address: {}", e)))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            environment: "development".to_string(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Provider hub
    pub hub: Arc<StoreHub>,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Build the hub from the environment, bind the global registration hook
    /// to it and register the sandbox provider.
    ///
    /// Providers still need `initialize_all()` before they serve requests.
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let hub = Arc::new(StoreHub::new(HubConfig::from_env()?));

        hub.bind_hook(RegistrationHook::global())?;

        let sandbox = SandboxConfig::from_env()?;
        let catalog = load_sandbox_catalog(&sandbox)?;
        SandboxProvider::register_with(RegistrationHook::global(), sandbox, catalog)?;

        Ok(Self::with_hub(hub, config))
    }

    /// Create state around an existing hub
    pub fn with_hub(hub: Arc<StoreHub>, config: AppConfig) -> Self {
        Self { hub, config }
    }
}

/// Load the sandbox catalog: `SANDBOX_CATALOG` if set, then
/// `config/products.toml`, then the built-in demo catalog.
fn load_sandbox_catalog(config: &SandboxConfig) -> IapResult<SandboxCatalog> {
    if let Some(path) = &config.catalog_path {
        let catalog = SandboxCatalog::load(path)?;
        tracing::info!("Loaded {} products from {}", catalog.len(), path.display());
        return Ok(catalog);
    }

    let config_paths = [
        "config/products.toml",
        "../config/products.toml",
        "../../config/products.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let catalog = SandboxCatalog::from_toml(&content)?;
            tracing::info!("Loaded {} products from {}", catalog.len(), path);
            return Ok(catalog);
        }
    }

    tracing::warn!("No product catalog found, using demo catalog");
    Ok(SandboxCatalog::demo())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_addr() {
        let config = AppConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: "test".to_string(),
        };

        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:3000");
        assert!(!config.is_production());
    }

    #[test]
    fn test_invalid_host() {
        let config = AppConfig {
            host: "not a host".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.socket_addr().unwrap_err(),
            IapError::Configuration(_)
        ));
    }

    #[test]
    fn test_explicit_catalog_path_must_exist() {
        let mut sandbox = SandboxConfig::default();
        sandbox.catalog_path = Some("/nonexistent/products.toml".into());
        assert!(load_sandbox_catalog(&sandbox).is_err());
    }
}
