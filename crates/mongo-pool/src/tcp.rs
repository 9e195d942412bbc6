//! TCP connector.
//!
//! Dials `host:port` with a timeout, enables `TCP_NODELAY`, and runs the
//! configured [`Authenticator`] when the endpoint carries credentials.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::connector::{BoxConnection, Connection, Connector};
use crate::error::{PoolError, Result};
use crate::key::Endpoint;

/// Credential handshake run on a freshly connected stream.
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate `endpoint`'s credentials over `stream`.
    ///
    /// Rejected credentials should be reported as
    /// [`PoolError::Authentication`].
    async fn authenticate(&self, stream: &mut TcpStream, endpoint: &Endpoint) -> Result<()>;
}

/// Accepts every endpoint without exchanging any bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthentication;

#[async_trait::async_trait]
impl Authenticator for NoAuthentication {
    async fn authenticate(&self, _stream: &mut TcpStream, _endpoint: &Endpoint) -> Result<()> {
        Ok(())
    }
}

/// A pooled TCP stream.
pub struct TcpConnection {
    stream: Option<TcpStream>,
}

impl TcpConnection {
    /// Wrap an established stream.
    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// The underlying stream, or `None` once closed.
    pub fn stream_mut(&mut self) -> Option<&mut TcpStream> {
        self.stream.as_mut()
    }
}

impl Connection for TcpConnection {
    fn close(&mut self) {
        // Dropping the stream closes the socket
        self.stream = None;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self.stream.as_ref().and_then(|s| s.local_addr().ok());
        let peer = self.stream.as_ref().and_then(|s| s.peer_addr().ok());
        f.debug_struct("TcpConnection")
            .field("local", &local)
            .field("peer", &peer)
            .finish()
    }
}

/// [`Connector`] over plain TCP.
#[derive(Clone)]
pub struct TcpConnector {
    nodelay: bool,
    authenticator: Arc<dyn Authenticator>,
}

impl TcpConnector {
    /// Create a connector with `TCP_NODELAY` enabled and no authentication.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodelay: true,
            authenticator: Arc::new(NoAuthentication),
        }
    }

    /// Enable or disable `TCP_NODELAY`.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    /// Set the handshake run for endpoints with credentials.
    #[must_use]
    pub fn authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Arc::new(authenticator);
        self
    }

    async fn connect(&self, endpoint: &Endpoint, connect_timeout: Duration) -> Result<TcpStream> {
        let addr = endpoint.address();
        tracing::debug!(addr = %addr, "establishing TCP connection");

        let stream = timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| PoolError::ConnectTimeout(connect_timeout))?
            .map_err(|e| PoolError::Connect(format!("{addr}: {e}")))?;

        if self.nodelay {
            stream.set_nodelay(true)?;
        }
        Ok(stream)
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TcpConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnector")
            .field("nodelay", &self.nodelay)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Connector for TcpConnector {
    async fn dial(&self, endpoint: &Endpoint, timeout: Duration) -> Result<BoxConnection> {
        let mut stream = self.connect(endpoint, timeout).await?;

        if endpoint.has_credentials() {
            tracing::debug!(
                host = %endpoint.host,
                port = endpoint.port,
                database = ?endpoint.database,
                "authenticating"
            );
            self.authenticator.authenticate(&mut stream, endpoint).await?;
        }

        Ok(Box::new(TcpConnection::new(stream)))
    }
}
