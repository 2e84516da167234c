//! # Hub Configuration
//!
//! Tunables for the provider hub, loaded from environment variables.

use crate::error::{IapError, IapResult};
use crate::registry::DEFAULT_STATUS_BUFFER;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Provider hub configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of the aggregated status channel
    pub status_buffer: usize,

    /// Upper bound on a provider's `init()`; `None` waits indefinitely
    pub init_timeout: Option<Duration>,
}

impl HubConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional env vars:
    /// - `IAP_STATUS_BUFFER` (default 64)
    /// - `IAP_INIT_TIMEOUT_SECS` (unset = no timeout)
    pub fn from_env() -> IapResult<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let status_buffer = parse_var("IAP_STATUS_BUFFER")?.unwrap_or(DEFAULT_STATUS_BUFFER);
        let init_timeout = parse_var::<u64>("IAP_INIT_TIMEOUT_SECS")?.map(Duration::from_secs);

        if status_buffer == 0 {
            return Err(IapError::Configuration(
                "IAP_STATUS_BUFFER must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            status_buffer,
            init_timeout,
        })
    }

    /// Builder: set the init timeout
    pub fn with_init_timeout(mut self, limit: Duration) -> Self {
        self.init_timeout = Some(limit);
        self
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            status_buffer: DEFAULT_STATUS_BUFFER,
            init_timeout: None,
        }
    }
}

/// Read and parse an optional env var
pub fn parse_var<T: FromStr>(name: &str) -> IapResult<Option<T>> {
    match env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| IapError::Configuration(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}
