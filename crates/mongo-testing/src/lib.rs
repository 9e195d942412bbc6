//! # mongo-testing
//!
//! Test infrastructure for the MongoDB connection pool.
//!
//! ## Features
//!
//! - Scripted in-memory connector with dial/close counters
//! - Mock TCP server with a line-based authentication handshake
//! - MongoDB container image for testcontainers
//!
//! ## Mock Connector Example
//!
//! ```rust,ignore
//! use mongo_testing::{MockConnector, label_of};
//!
//! #[tokio::test]
//! async fn test_reuse() {
//!     let connector = MockConnector::new();
//!     let pool = ConnectionPool::builder()
//!         .connector(connector.clone())
//!         .registry(Arc::new(Registry::new()))
//!         .build()
//!         .unwrap();
//!
//!     let mut handle = ServerHandle::new(Endpoint::new("db", 27017));
//!     pool.acquire(&mut handle).await.unwrap();
//!     assert_eq!(label_of(&handle).as_deref(), Some("conn-1"));
//! }
//! ```
//!
//! ## Container Example
//!
//! ```rust,ignore
//! use mongo_testing::MongoContainer;
//! use testcontainers::runners::AsyncRunner;
//!
//! #[tokio::test]
//! async fn test_with_real_server() {
//!     let container = MongoContainer::default().start().await.unwrap();
//!     let port = container.get_host_port_ipv4(27017).await.unwrap();
//!     // Connect to localhost:port...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod container;
pub mod mock_connector;
pub mod mock_server;

pub use container::MongoContainer;
pub use mock_connector::{MockConnection, MockConnector, label_of};
pub use mock_server::{LineAuthenticator, MockDbServer, MockServerBuilder, MockServerConfig, MockServerError};
