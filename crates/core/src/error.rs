//! Error types for the Threadwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Threadwise operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Chat transport errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- Summary store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Capability errors ---
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    // --- Delegate query errors ---
    #[error("Delegate error: {0}")]
    Delegate(#[from] DelegateError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    /// The guarded call path is unhealthy (circuit open or retries exhausted).
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Whether a retry of the same request may succeed.
    ///
    /// Rate limits, timeouts, connection drops and 5xx responses are
    /// transient; authentication, unknown models and other 4xx responses
    /// will fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout(_)
            | Self::Network(_)
            | Self::StreamInterrupted(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 408,
            Self::AuthenticationFailed(_)
            | Self::ModelNotFound(_)
            | Self::NotConfigured(_)
            | Self::Unavailable(_) => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Request to {channel} failed: {reason}")]
    RequestFailed { channel: String, reason: String },

    #[error("Missing permission in {channel}: {permission}")]
    MissingPermission { channel: String, permission: String },

    #[error("Transport connection lost: {0}")]
    ConnectionLost(String),

    #[error("Attachment could not be loaded: {0}")]
    Attachment(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Capability execution failed: {name}: {reason}")]
    ExecutionFailed { name: String, reason: String },

    #[error("Invalid capability arguments: {0}")]
    InvalidArguments(String),

    #[error("Capability unavailable: {0}")]
    Unavailable(String),
}

/// Failures of a delegate sub-query.
///
/// `Validation` and `Unavailable` are expected at runtime and are turned
/// into transcript text by the capability layer; `NotWired` means the
/// gateway was used before its collaborators were installed.
#[derive(Debug, Clone, Error)]
pub enum DelegateError {
    #[error("Invalid delegate query: {0}")]
    Validation(String),

    #[error("Delegate path unavailable: {0}")]
    Unavailable(String),

    #[error("Delegate gateway not initialized: {0}")]
    NotWired(String),

    #[error("Failed to read thread: {0}")]
    Transport(#[from] TransportError),

    #[error("Delegate generation failed: {0}")]
    Provider(#[from] ProviderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn retryable_classification() {
        assert!(ProviderError::RateLimited { retry_after_secs: 1 }.is_retryable());
        assert!(ProviderError::Network("reset".into()).is_retryable());
        assert!(
            ProviderError::ApiError {
                status_code: 529,
                message: "overloaded".into()
            }
            .is_retryable()
        );
        assert!(
            !ProviderError::ApiError {
                status_code: 400,
                message: "bad request".into()
            }
            .is_retryable()
        );
        assert!(!ProviderError::AuthenticationFailed("bad key".into()).is_retryable());
        assert!(!ProviderError::Unavailable("circuit open".into()).is_retryable());
    }

    #[test]
    fn delegate_error_wraps_transport() {
        let err: DelegateError = TransportError::ChannelNotFound("123".into()).into();
        assert!(err.to_string().contains("123"));
        assert!(matches!(err, DelegateError::Transport(_)));
    }
}
