//! # mongo-driver-pool
//!
//! Persistent connection pool for MongoDB servers.
//!
//! Connections are grouped by endpoint identity (host, port, database, user,
//! password). Each identity gets a [`Monitor`] that keeps a bounded LIFO
//! stack of idle connections and tracks the handles currently holding one.
//! Monitors live in a [`Registry`], usually the process-wide one returned by
//! [`acquire_connection_pool_registry`].
//!
//! ## Features
//!
//! - LIFO reuse of idle connections, capped at 50 per identity by default
//! - Oldest idle connections are closed first when the cap is exceeded
//! - On failure, reconnect once; if that fails, flush the whole identity
//! - Per-identity connect timeout, first configured value wins
//! - Redacted statistics snapshots for diagnostics
//! - Pluggable [`Connector`] with a TCP implementation in [`TcpConnector`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use mongo_driver_pool::{ConnectionPool, Endpoint, ServerHandle, TcpConnector};
//!
//! let pool = ConnectionPool::new(TcpConnector::new());
//! let endpoint = Endpoint::new("localhost", 27017).database("app");
//! pool.init(&endpoint, Some(Duration::from_secs(5)))?;
//!
//! let mut handle = ServerHandle::new(endpoint);
//! pool.acquire(&mut handle).await?;
//! // Use connection...
//! pool.release(&mut handle);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connector;
pub mod error;
pub mod global;
pub mod handle;
pub mod key;
pub mod monitor;
pub mod pool;
pub mod registry;
pub mod stats;
pub mod tcp;

pub use config::PoolConfig;
pub use connector::{BoxConnection, Connection, Connector};
pub use error::PoolError;
pub use global::{acquire_connection_pool_registry, shutdown_connection_pool_registry};
pub use handle::{HandleId, ServerHandle};
pub use key::{ConnectionKey, Endpoint};
pub use monitor::{Counters, Monitor};
pub use pool::{ConnectionPool, PoolBuilder, PoolMetrics};
pub use registry::Registry;
pub use stats::{MonitorStats, PoolStats};
pub use tcp::{Authenticator, NoAuthentication, TcpConnection, TcpConnector};
