//! # Hub Error Types
//!
//! Typed error handling for the storehub provider core.
//! All registry, lifecycle and routing operations return `Result<T, IapError>`.

use thiserror::Error;

/// Core error type for all provider hub operations
#[derive(Debug, Error)]
pub enum IapError {
    /// Descriptor's supported range excludes the running contract version
    #[error("Provider {provider} supports API versions {min}..={max}, core runs version {version}")]
    VersionIncompatible {
        provider: String,
        version: u32,
        min: u32,
        max: u32,
    },

    /// A provider with this id is already registered
    #[error("Provider already registered: {provider}")]
    DuplicateProvider { provider: String },

    /// Operation references an unregistered provider id
    #[error("Unknown provider: {provider}")]
    UnknownProvider { provider: String },

    /// Operation requires the provider to be ready
    #[error("Provider {provider} is not ready (state: {state})")]
    ProviderNotReady { provider: String, state: String },

    /// Registration attempted before the host bound the hook
    #[error("Registration hook is not bound")]
    HookNotBound,

    /// Host attempted to bind the hook a second time
    #[error("Registration hook is already bound")]
    HookAlreadyBound,

    /// A provider's own async call failed
    #[error("Provider {provider} failed during {operation}: {message}")]
    ProviderOperationFailed {
        provider: String,
        operation: &'static str,
        message: String,
    },

    /// Descriptor violates its own invariants
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Provider instance disagrees with its descriptor
    #[error("Provider {provider} does not match its descriptor: {reason}")]
    ProviderMismatch { provider: String, reason: String },

    /// Failure raised inside a provider implementation (native store, SDK)
    #[error("Store error: {0}")]
    Store(String),

    /// Product not known to the provider
    #[error("Product not found: {product_id}")]
    ProductNotFound { product_id: String },

    /// Configuration errors (invalid env values, unreadable catalog)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IapError {
    /// Wrap a provider-side failure, attaching the provider id and operation.
    ///
    /// Errors that already carry provider context are passed through as-is.
    pub fn provider_failed(provider: &str, operation: &'static str, source: IapError) -> Self {
        match source {
            IapError::ProviderOperationFailed { .. } => source,
            other => IapError::ProviderOperationFailed {
                provider: provider.to_string(),
                operation,
                message: other.to_string(),
            },
        }
    }

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IapError::ProviderNotReady { .. }
                | IapError::ProviderOperationFailed { .. }
                | IapError::Store(_)
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            IapError::VersionIncompatible { .. } => 422,
            IapError::DuplicateProvider { .. } => 409,
            IapError::UnknownProvider { .. } => 404,
            IapError::ProviderNotReady { .. } => 409,
            IapError::HookNotBound => 500,
            IapError::HookAlreadyBound => 500,
            IapError::ProviderOperationFailed { .. } => 502,
            IapError::InvalidDescriptor(_) => 422,
            IapError::ProviderMismatch { .. } => 422,
            IapError::Store(_) => 502,
            IapError::ProductNotFound { .. } => 404,
            IapError::Configuration(_) => 500,
            IapError::InvalidRequest(_) => 400,
            IapError::Internal(_) => 500,
        }
    }
}

/// Result type alias for hub operations
pub type IapResult<T> = Result<T, IapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_failed_wraps_once() {
        let wrapped = IapError::provider_failed("play", "buy", IapError::Store("offline".into()));
        match &wrapped {
            IapError::ProviderOperationFailed {
                provider,
                operation,
                message,
            } => {
                assert_eq!(provider, "play");
                assert_eq!(*operation, "buy");
                assert_eq!(message, "Store error: offline");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let rewrapped = IapError::provider_failed("other", "restore", wrapped);
        assert!(matches!(
            rewrapped,
            IapError::ProviderOperationFailed { ref provider, .. } if provider == "play"
        ));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(IapError::Store("timeout".into()).is_retryable());
        assert!(IapError::ProviderNotReady {
            provider: "play".into(),
            state: "failed".into()
        }
        .is_retryable());
        assert!(!IapError::DuplicateProvider {
            provider: "play".into()
        }
        .is_retryable());
        assert!(!IapError::HookNotBound.is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            IapError::UnknownProvider {
                provider: "x".into()
            }
            .status_code(),
            404
        );
        assert_eq!(
            IapError::DuplicateProvider {
                provider: "x".into()
            }
            .status_code(),
            409
        );
        assert_eq!(IapError::InvalidRequest("bad".into()).status_code(), 400);
    }
}
