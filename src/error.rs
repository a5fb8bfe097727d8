//! Error types for rategate.

use thiserror::Error;

/// Main error type for rategate operations.
#[derive(Error, Debug)]
pub enum RateGateError {
    /// Invalid limiter configuration (unknown algorithm, non-positive limits, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The decision was a reject; carries the user-visible message
    #[error("{message}")]
    RateLimited { message: String },

    /// The shared store could not produce a decision
    #[error("Backend unavailable: {0}")]
    Backend(String),

    /// Shared store client errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RateGateError {
    /// Returns `true` if this error is the rejection signal rather than a failure.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RateGateError::RateLimited { .. })
    }
}

/// Result type alias for rategate operations.
pub type Result<T> = std::result::Result<T, RateGateError>;
