//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the local cache, remote client and dashboard operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// No remote store configured; the client runs in degraded mode
    #[error("Remote cache is not configured")]
    ConfigurationAbsent,

    /// Connecting to the remote store failed (after retries, if any)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Circuit breaker rejected the call without reaching the store
    #[error("Circuit breaker is open")]
    BreakerOpen,

    /// Key failed validation
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Serialized value exceeds the configured limit
    #[error("Value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    /// A shutdown is in progress, new operations are refused
    #[error("Cache client is shutting down")]
    ShuttingDown,

    /// Configured, but no live connection is available
    #[error("Remote cache is not available")]
    NotAvailable,

    /// Failure reported by the transport for a specific command
    #[error("Remote operation failed: {0}")]
    Remote(String),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation did not finish within its time bound
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl CacheError {
    /// Caller-input errors: raised locally, never retried, never reach the network.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CacheError::InvalidKey(_) | CacheError::ValueTooLarge { .. }
        )
    }

    /// Errors that say nothing about the caller's input and may clear up later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CacheError::ConnectionFailed(_)
                | CacheError::BreakerOpen
                | CacheError::NotAvailable
                | CacheError::Remote(_)
                | CacheError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            CacheError::Timeout(err.to_string())
        } else if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error()
        {
            CacheError::ConnectionFailed(err.to_string())
        } else {
            CacheError::Remote(err.to_string())
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidKey(_) | CacheError::ValueTooLarge { .. } => {
                StatusCode::BAD_REQUEST
            }
            CacheError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CacheError::Remote(_) => StatusCode::BAD_GATEWAY,
            CacheError::ConfigurationAbsent
            | CacheError::ConnectionFailed(_)
            | CacheError::BreakerOpen
            | CacheError::ShuttingDown
            | CacheError::NotAvailable => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
