//! Mock database server for connector tests.
//!
//! The server speaks a small line protocol instead of the MongoDB wire
//! protocol. It is enough to exercise dialing, authentication and socket
//! lifetime without a real database.
//!
//! ```text
//! client: AUTH <database> <username> <password>\n
//! server: OK\n | DENIED\n
//! client: PING\n
//! server: PONG\n
//! ```
//!
//! Empty components are sent as `-`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mongo_testing::mock_server::{LineAuthenticator, MockDbServer};
//!
//! let server = MockDbServer::builder()
//!     .with_user("app", "alice", "secret")
//!     .build()
//!     .await?;
//!
//! let connector = TcpConnector::new().authenticator(LineAuthenticator);
//! let endpoint = server.endpoint().database("app").credentials("alice", "secret");
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mongo_driver_pool::{Authenticator, Endpoint, PoolError};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

type Credentials = (String, String, String);

/// Configuration for the mock server.
#[derive(Debug, Default)]
pub struct MockServerConfig {
    users: HashSet<Credentials>,
}

impl MockServerConfig {
    fn accepts(&self, database: &str, username: &str, password: &str) -> bool {
        self.users
            .contains(&(database.to_string(), username.to_string(), password.to_string()))
    }
}

/// Builder for [`MockDbServer`].
#[derive(Debug, Default)]
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a builder with no accepted users.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `username`/`password` on `database`.
    pub fn with_user(
        mut self,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.config
            .users
            .insert((database.into(), username.into(), password.into()));
        self
    }

    /// Build and start the mock server.
    pub async fn build(self) -> Result<MockDbServer> {
        MockDbServer::start(self.config).await
    }
}

#[derive(Debug, Default)]
struct Counts {
    accepted: AtomicUsize,
    open: AtomicUsize,
    authenticated: AtomicUsize,
    rejected: AtomicUsize,
}

/// A mock database server listening on localhost.
///
/// The accept loop stops when the server is stopped or dropped. Connections
/// already accepted keep being served until the client hangs up.
#[derive(Debug)]
pub struct MockDbServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    counts: Arc<Counts>,
}

impl MockDbServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start the mock server on an available port.
    pub async fn start(config: MockServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let config = Arc::new(config);
        let counts = Arc::new(Counts::default());

        let server = Self {
            addr,
            shutdown_tx: shutdown_tx.clone(),
            counts: Arc::clone(&counts),
        };

        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _peer_addr)) => {
                                let config = Arc::clone(&config);
                                let counts = Arc::clone(&counts);
                                tokio::spawn(async move {
                                    counts.accepted.fetch_add(1, Ordering::SeqCst);
                                    counts.open.fetch_add(1, Ordering::SeqCst);
                                    if let Err(e) = handle_connection(stream, &config, &counts).await {
                                        tracing::debug!("Connection error: {}", e);
                                    }
                                    counts.open.fetch_sub(1, Ordering::SeqCst);
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Ok(server)
    }

    /// Get the server's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the port number.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// An endpoint pointing at this server, without database or credentials.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.addr.ip().to_string(), self.addr.port())
    }

    /// Connections accepted since start.
    pub fn connection_count(&self) -> usize {
        self.counts.accepted.load(Ordering::SeqCst)
    }

    /// Connections currently open.
    pub fn open_connections(&self) -> usize {
        self.counts.open.load(Ordering::SeqCst)
    }

    /// Successful `AUTH` exchanges.
    pub fn authenticated(&self) -> usize {
        self.counts.authenticated.load(Ordering::SeqCst)
    }

    /// Rejected `AUTH` exchanges.
    pub fn rejected(&self) -> usize {
        self.counts.rejected.load(Ordering::SeqCst)
    }

    /// Stop accepting connections.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockDbServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_connection(stream: TcpStream, config: &MockServerConfig, counts: &Counts) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let reply = match parts.next() {
            Some("AUTH") => {
                let fields: Vec<&str> = parts.collect();
                let [database, username, password] = fields.as_slice() else {
                    return Err(MockServerError::Protocol(format!("malformed AUTH: {line}")));
                };
                if config.accepts(unescape(database), unescape(username), unescape(password)) {
                    counts.authenticated.fetch_add(1, Ordering::SeqCst);
                    "OK\n"
                } else {
                    counts.rejected.fetch_add(1, Ordering::SeqCst);
                    "DENIED\n"
                }
            }
            Some("PING") => "PONG\n",
            _ => return Err(MockServerError::Protocol(format!("unexpected command: {line}"))),
        };
        writer.write_all(reply.as_bytes()).await?;
    }

    // Client hung up
    Ok(())
}

fn escape(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => "-",
    }
}

fn unescape(value: &str) -> &str {
    if value == "-" { "" } else { value }
}

/// [`Authenticator`] speaking the mock server's `AUTH` line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineAuthenticator;

#[async_trait::async_trait]
impl Authenticator for LineAuthenticator {
    async fn authenticate(&self, stream: &mut TcpStream, endpoint: &Endpoint) -> std::result::Result<(), PoolError> {
        let request = format!(
            "AUTH {} {} {}\n",
            escape(endpoint.database.as_deref()),
            escape(endpoint.username.as_deref()),
            escape(endpoint.password.as_deref()),
        );
        stream.write_all(request.as_bytes()).await?;

        let mut reply = String::new();
        BufReader::new(&mut *stream).read_line(&mut reply).await?;
        match reply.trim_end() {
            "OK" => Ok(()),
            "DENIED" => Err(PoolError::Authentication(format!(
                "user {:?} rejected by {}",
                endpoint.username.as_deref().unwrap_or(""),
                endpoint.address()
            ))),
            other => Err(PoolError::Authentication(format!("unexpected reply {other:?}"))),
        }
    }
}
