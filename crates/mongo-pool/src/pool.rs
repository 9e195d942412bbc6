//! Pool operations.
//!
//! [`ConnectionPool`] ties the registry to a [`Connector`] and implements the
//! per-handle state machine:
//!
//! ```text
//! Unbound ──acquire──▶ CheckedOut ──release──▶ Connected(idle)
//!                          │                        │
//!                          └──fail (no reconnect)──▶ Disconnected
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::PoolConfig;
use crate::connector::{BoxConnection, Connector};
use crate::error::{PoolError, Result};
use crate::global::acquire_connection_pool_registry;
use crate::handle::ServerHandle;
use crate::key::Endpoint;
use crate::monitor::Monitor;
use crate::registry::Registry;
use crate::stats::PoolStats;

/// A connection pool over a shared [`Registry`].
///
/// Cloning is cheap; clones share the registry, connector and metrics.
///
/// # Example
///
/// ```rust,ignore
/// use mongo_driver_pool::{ConnectionPool, Endpoint, ServerHandle, TcpConnector};
///
/// let pool = ConnectionPool::new(TcpConnector::new());
/// let endpoint = Endpoint::new("localhost", 27017).database("admin");
///
/// pool.init(&endpoint, Some(Duration::from_secs(30)))?;
///
/// let mut handle = ServerHandle::new(endpoint);
/// pool.acquire(&mut handle).await?;
/// // Use the connection...
/// pool.release(&mut handle);
/// ```
#[derive(Clone)]
pub struct ConnectionPool {
    registry: Arc<Registry>,
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    metrics: Arc<PoolMetricsInner>,
}

#[derive(Debug, Default)]
struct PoolMetricsInner {
    dials: AtomicU64,
    dial_failures: AtomicU64,
    idle_reuses: AtomicU64,
    reconnects: AtomicU64,
    flushes: AtomicU64,
}

impl ConnectionPool {
    /// Create a pool over the process-wide registry with default configuration.
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            registry: acquire_connection_pool_registry(),
            connector: Arc::new(connector),
            config: PoolConfig::default(),
            metrics: Arc::default(),
        }
    }

    /// Create a new pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// The registry this pool resolves monitors in.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Resolve the monitor for `endpoint`, creating it if needed.
    pub fn monitor(&self, endpoint: &Endpoint) -> Result<Arc<Monitor>> {
        self.registry.get_or_create(&endpoint.key())
    }

    /// Prepare the pool for `endpoint`.
    ///
    /// Creates the endpoint's monitor and, if `timeout` is non-zero and the
    /// monitor has none yet, sets it. Idempotent.
    pub fn init(&self, endpoint: &Endpoint, timeout: Option<Duration>) -> Result<Arc<Monitor>> {
        let monitor = self.monitor(endpoint)?;
        if let Some(timeout) = timeout {
            if monitor.set_timeout_once(timeout) {
                tracing::debug!(key = %monitor.key(), timeout = ?timeout, "monitor timeout set");
            }
        }
        Ok(monitor)
    }

    /// Give `handle` a connection.
    ///
    /// Reuses the most recently released idle connection if there is one,
    /// otherwise dials. On failure the handle is left disconnected.
    pub async fn acquire(&self, handle: &mut ServerHandle) -> Result<()> {
        let monitor = self.registry.get_or_create(handle.key())?;

        if handle.is_connected() {
            tracing::debug!(handle = %handle.id(), "acquire on connected handle, releasing first");
            self.release(handle);
        }

        if monitor.check_out_idle(handle.slot()) {
            self.metrics.idle_reuses.fetch_add(1, Ordering::Relaxed);
            handle.bind(monitor, self.config.max_idle);
            return Ok(());
        }

        let timeout = self.effective_timeout(&monitor);
        match self.dial(handle.endpoint(), timeout).await {
            Ok(connection) => {
                monitor.attach(handle.slot(), connection);
                let counters = monitor.counters();
                tracing::debug!(
                    key = %monitor.key(),
                    handle = %handle.id(),
                    in_use = counters.in_use,
                    in_pool = counters.in_pool,
                    "dialed new connection"
                );
                handle.bind(monitor, self.config.max_idle);
                Ok(())
            }
            Err(e) => {
                handle.disconnect();
                tracing::debug!(key = %monitor.key(), error = %e, "dial failed");
                Err(e)
            }
        }
    }

    /// Return `handle`'s connection to the idle stack.
    ///
    /// A disconnected handle is only removed from the active set; dead
    /// connections are never pooled. Never fails: if the monitor cannot be
    /// resolved the connection is closed instead.
    pub fn release(&self, handle: &mut ServerHandle) {
        let binding = handle.unbind();

        let monitor = match self.registry.get_or_create(handle.key()) {
            Ok(monitor) => monitor,
            Err(e) => {
                tracing::warn!(key = %handle.key(), error = %e, "no monitor for release, closing connection");
                if let Some(binding) = binding {
                    binding.monitor.unregister(handle.id());
                }
                handle.disconnect();
                return;
            }
        };

        // A handle acquired before a registry shutdown still belongs to the old monitor
        if let Some(binding) = binding {
            if !Arc::ptr_eq(&binding.monitor, &monitor) {
                binding.monitor.unregister(handle.id());
            }
        }

        let outcome = monitor.check_in(handle.slot(), self.config.max_idle);
        tracing::trace!(
            key = %monitor.key(),
            handle = %handle.id(),
            pooled = outcome.pooled,
            evicted = outcome.evicted,
            "released handle"
        );
    }

    /// Report that `handle`'s connection failed.
    ///
    /// The connection is always closed and one reconnect is attempted. If the
    /// reconnect succeeds the handle stays checked out with the new
    /// connection. If it fails the endpoint is considered down and every
    /// active and idle connection of its monitor is closed.
    pub async fn fail(&self, handle: &mut ServerHandle) {
        let monitor = match self.registry.get_or_create(handle.key()) {
            Ok(monitor) => monitor,
            Err(e) => {
                tracing::warn!(key = %handle.key(), error = %e, "no monitor for failed connection");
                return;
            }
        };

        // Some routers cut idle connections; only flush if we cannot reconnect
        handle.disconnect();

        let timeout = self.effective_timeout(&monitor);
        match self.dial(handle.endpoint(), timeout).await {
            Ok(connection) => {
                self.metrics.reconnects.fetch_add(1, Ordering::Relaxed);
                monitor.attach(handle.slot(), connection);
                tracing::info!(key = %monitor.key(), handle = %handle.id(), "reconnected after failure");
                handle.bind(monitor, self.config.max_idle);
            }
            Err(e) => {
                self.metrics.flushes.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    key = %monitor.key(),
                    error = %e,
                    "reconnect failed, flushing endpoint"
                );
                monitor.flush();
                if let Some(binding) = handle.unbind() {
                    if !Arc::ptr_eq(&binding.monitor, &monitor) {
                        binding.monitor.unregister(handle.id());
                    }
                }
            }
        }
    }

    /// Close every connection in the registry and discard all monitors.
    ///
    /// Returns the number of connections closed.
    pub fn shutdown(&self) -> usize {
        self.registry.shutdown()
    }

    /// Statistics for every monitor in the registry.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.registry.snapshot()
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            dials: self.metrics.dials.load(Ordering::Relaxed),
            dial_failures: self.metrics.dial_failures.load(Ordering::Relaxed),
            idle_reuses: self.metrics.idle_reuses.load(Ordering::Relaxed),
            reconnects: self.metrics.reconnects.load(Ordering::Relaxed),
            flushes: self.metrics.flushes.load(Ordering::Relaxed),
        }
    }

    fn effective_timeout(&self, monitor: &Monitor) -> Duration {
        monitor.timeout().unwrap_or(self.config.default_timeout)
    }

    async fn dial(&self, endpoint: &Endpoint, timeout: Duration) -> Result<BoxConnection> {
        self.metrics.dials.fetch_add(1, Ordering::Relaxed);

        let result = match tokio::time::timeout(timeout, self.connector.dial(endpoint, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(PoolError::ConnectTimeout(timeout)),
        };
        if result.is_err() {
            self.metrics.dial_failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("monitors", &self.registry.len())
            .finish()
    }
}

/// Counters accumulated by a [`ConnectionPool`] since it was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Dial attempts, including reconnects.
    pub dials: u64,
    /// Dial attempts that failed or timed out.
    pub dial_failures: u64,
    /// Acquisitions served from the idle stack.
    pub idle_reuses: u64,
    /// Successful reconnects after a reported failure.
    pub reconnects: u64,
    /// Endpoint flushes after a failed reconnect.
    pub flushes: u64,
}

impl PoolMetrics {
    /// Fraction of connection requests served from the idle stack rather
    /// than by dialing (0.0 to 1.0).
    #[must_use]
    pub fn reuse_rate(&self) -> f64 {
        let total = self.idle_reuses + self.dials;
        if total == 0 {
            return 0.0;
        }
        self.idle_reuses as f64 / total as f64
    }
}

/// Builder for creating a connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = ConnectionPool::builder()
///     .connector(TcpConnector::new())
///     .max_idle(20)
///     .build()?;
/// ```
pub struct PoolBuilder {
    connector: Option<Arc<dyn Connector>>,
    registry: Option<Arc<Registry>>,
    pool_config: PoolConfig,
}

impl PoolBuilder {
    /// Create a new pool builder with default settings.
    pub fn new() -> Self {
        Self {
            connector: None,
            registry: None,
            pool_config: PoolConfig::default(),
        }
    }

    /// Set the connector used to dial new connections.
    #[must_use]
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Use a private registry instead of the process-wide one.
    #[must_use]
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the maximum number of idle connections per endpoint.
    #[must_use]
    pub fn max_idle(mut self, count: usize) -> Self {
        self.pool_config.max_idle = count;
        self
    }

    /// Set the fallback dial timeout.
    #[must_use]
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.default_timeout = timeout;
        self
    }

    /// Build the pool.
    pub fn build(self) -> Result<ConnectionPool> {
        self.pool_config.validate()?;
        let connector = self
            .connector
            .ok_or_else(|| PoolError::Configuration("a connector is required".into()))?;
        let registry = self.registry.unwrap_or_else(acquire_connection_pool_registry);

        tracing::info!(
            max_idle = self.pool_config.max_idle,
            default_timeout = ?self.pool_config.default_timeout,
            "connection pool created"
        );

        Ok(ConnectionPool {
            registry,
            connector,
            config: self.pool_config,
            metrics: Arc::default(),
        })
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
