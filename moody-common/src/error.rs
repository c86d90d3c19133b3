//! Common error types for MoodyTunes
//!
//! The variants follow the service's fault taxonomy. Only provider and
//! client faults are retried by background workers.

use std::time::Duration;
use thiserror::Error;

/// Common result type for MoodyTunes operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across MoodyTunes crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Uniqueness violation (e.g. duplicate vote)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing provider scope or unidentified user
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Request refused by a local per-user limiter
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Upstream provider answered with an HTTP error or timed out
    #[error("Provider error: {message}")]
    Provider {
        message: String,
        status: Option<u16>,
        retry_after: Option<Duration>,
    },

    /// Unexpected failure while talking to the provider
    #[error("Client error: {0}")]
    Client(String),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a background worker should re-queue the task
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Provider { .. } | Error::Client(_))
    }

    /// Provider-supplied delay hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Provider { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// True when the underlying database error is a UNIQUE constraint violation
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_provider_and_client_faults_are_retryable() {
        let provider = Error::Provider {
            message: "503".to_string(),
            status: Some(503),
            retry_after: None,
        };
        assert!(provider.is_retryable());
        assert!(Error::Client("connection reset".to_string()).is_retryable());

        assert!(!Error::Permission("missing scope".to_string()).is_retryable());
        assert!(!Error::NotFound("song".to_string()).is_retryable());
        assert!(!Error::Internal("bad state".to_string()).is_retryable());
    }

    #[test]
    fn test_retry_after_only_on_provider_errors() {
        let err = Error::Provider {
            message: "slow down".to_string(),
            status: Some(429),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(Error::Client("x".to_string()).retry_after(), None);
    }
}
