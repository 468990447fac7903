//! Error types for quotagate.

use std::time::Duration;

use thiserror::Error;

/// Main error type for quotagate operations.
///
/// Exceeding a quota is not an error: it is reported as a denied
/// [`Decision`](crate::ratelimit::Decision).
#[derive(Error, Debug)]
pub enum QuotaError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller supplied an empty identifier
    #[error("identifier must not be empty")]
    EmptyIdentifier,

    /// The shared counter store rejected or failed an operation
    #[error("Shared backend error: {0}")]
    Backend(String),

    /// The shared counter store did not answer in time
    #[error("Shared backend timed out after {0:?}")]
    Timeout(Duration),

    /// Redis client errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuotaError {
    /// Whether this error came from the shared backend (connection, command or timeout).
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            QuotaError::Backend(_) | QuotaError::Timeout(_) | QuotaError::Redis(_)
        )
    }
}

impl From<config::ConfigError> for QuotaError {
    fn from(err: config::ConfigError) -> Self {
        QuotaError::Config(err.to_string())
    }
}

/// Result type alias for quotagate operations.
pub type Result<T> = std::result::Result<T, QuotaError>;
