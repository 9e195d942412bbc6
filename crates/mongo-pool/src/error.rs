//! Pool error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during pool operations.
///
/// Only [`init`](crate::ConnectionPool::init) and
/// [`acquire`](crate::ConnectionPool::acquire) surface these to callers.
/// Release, failure handling and shutdown are best-effort and log instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The registry could not allocate room for a new monitor.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Establishing the transport failed.
    #[error("failed to connect: {0}")]
    Connect(String),

    /// The dial did not complete within the effective timeout.
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The server rejected the credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// IO error on the underlying transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),
}

impl PoolError {
    /// Check if this error is transient and a later dial may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::ConnectTimeout(_) | Self::Io(_)
        )
    }
}

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
