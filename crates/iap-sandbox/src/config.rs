//! # Sandbox Configuration
//!
//! Configuration for the sandbox store provider.
//! All settings come from environment variables and have working defaults.

use iap_core::config::parse_var;
use iap_core::{IapError, IapResult, Platform};
use std::env;
use std::path::PathBuf;

/// Sandbox provider configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Provider id registered with the hub
    pub provider_id: String,

    /// Display name
    pub name: String,

    /// Platform the sandbox pretends to be
    pub platform: Platform,

    /// Path to a TOML catalog; the built-in demo catalog is used when unset
    pub catalog_path: Option<PathBuf>,

    /// Whether the simulated device user is signed in to the store
    pub user_authorized: bool,
}

impl SandboxConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional env vars:
    /// - `SANDBOX_PROVIDER_ID` (default `sandbox`)
    /// - `SANDBOX_PROVIDER_NAME` (default `Sandbox Store`)
    /// - `SANDBOX_PLATFORM` (`android`, `ios` or `any`; default `any`)
    /// - `SANDBOX_CATALOG` (path to a TOML catalog)
    /// - `SANDBOX_USER_AUTHORIZED` (default `true`)
    pub fn from_env() -> IapResult<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = Self::default();

        let provider_id = env::var("SANDBOX_PROVIDER_ID").unwrap_or(defaults.provider_id);
        if provider_id.trim().is_empty() {
            return Err(IapError::Configuration(
                "SANDBOX_PROVIDER_ID must not be empty".to_string(),
            ));
        }

        let platform = match env::var("SANDBOX_PLATFORM") {
            Ok(raw) => raw
                .parse()
                .map_err(|e: String| IapError::Configuration(format!("SANDBOX_PLATFORM: {}", e)))?,
            Err(_) => defaults.platform,
        };

        Ok(Self {
            provider_id,
            name: env::var("SANDBOX_PROVIDER_NAME").unwrap_or(defaults.name),
            platform,
            catalog_path: env::var("SANDBOX_CATALOG").ok().map(PathBuf::from),
            user_authorized: parse_var("SANDBOX_USER_AUTHORIZED")?.unwrap_or(true),
        })
    }

    /// Create config with an explicit provider id (for tests and embedding)
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            ..Self::default()
        }
    }

    /// Builder: set platform
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Builder: set display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder: simulate a signed-out user
    pub fn signed_out(mut self) -> Self {
        self.user_authorized = false;
        self
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            provider_id: "sandbox".to_string(),
            name: "Sandbox Store".to_string(),
            platform: Platform::Any,
            catalog_path: None,
            user_authorized: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = SandboxConfig::new("play-sandbox")
            .with_platform(Platform::Android)
            .with_name("Play Sandbox")
            .signed_out();

        assert_eq!(config.provider_id, "play-sandbox");
        assert_eq!(config.platform, Platform::Android);
        assert_eq!(config.name, "Play Sandbox");
        assert!(!config.user_authorized);
        assert!(config.catalog_path.is_none());
    }

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.provider_id, "sandbox");
        assert_eq!(config.platform, Platform::Any);
        assert!(config.user_authorized);
    }
}
