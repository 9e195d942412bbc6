//! Pool configuration.

use std::time::Duration;

/// Default number of idle connections kept per endpoint.
pub const DEFAULT_MAX_IDLE: usize = 50;

/// Default dial timeout used until an endpoint's monitor is given one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the connection pool.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Maximum number of idle connections retained per endpoint.
    ///
    /// Enforced on every release: the most recently released connections
    /// survive, older ones are closed.
    pub max_idle: usize,

    /// Dial timeout for endpoints whose monitor has no timeout of its own.
    pub default_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: DEFAULT_MAX_IDLE,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of idle connections per endpoint.
    #[must_use]
    pub fn max_idle(mut self, count: usize) -> Self {
        self.max_idle = count;
        self
    }

    /// Set the fallback dial timeout.
    #[must_use]
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), crate::error::PoolError> {
        if self.max_idle == 0 {
            return Err(crate::error::PoolError::Configuration(
                "max_idle must be greater than 0".into(),
            ));
        }
        if self.default_timeout.is_zero() {
            return Err(crate::error::PoolError::Configuration(
                "default_timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
