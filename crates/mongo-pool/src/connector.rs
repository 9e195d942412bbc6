//! Transport seams.
//!
//! The pool never opens sockets itself. It asks a [`Connector`] to dial and
//! authenticate, and only ever calls [`Connection::close`] on what it gets
//! back. Both traits are object safe so a pool can hold `Arc<dyn Connector>`.

use std::fmt;
use std::time::Duration;

use crate::error::Result;
use crate::key::Endpoint;

/// A boxed, type-erased connection as stored by the pool.
pub type BoxConnection = Box<dyn Connection>;

/// A raw, already-authenticated transport handle.
pub trait Connection: Send + fmt::Debug + 'static {
    /// Release the transport.
    ///
    /// Must be idempotent: the pool may close a connection that the owner
    /// already closed.
    fn close(&mut self);

    /// Whether the transport is still open.
    fn is_open(&self) -> bool {
        true
    }
}

/// Establishes and authenticates new connections.
///
/// Uses `#[async_trait]` so pools can hold `dyn Connector`.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Dial `endpoint` and run the credential handshake.
    ///
    /// `timeout` is the monitor's effective timeout. The pool also bounds the
    /// whole call by it, so implementations may treat it as advisory.
    async fn dial(&self, endpoint: &Endpoint, timeout: Duration) -> Result<BoxConnection>;
}

#[async_trait::async_trait]
impl<C: Connector + ?Sized> Connector for std::sync::Arc<C> {
    async fn dial(&self, endpoint: &Endpoint, timeout: Duration) -> Result<BoxConnection> {
        (**self).dial(endpoint, timeout).await
    }
}

/// Close a connection, logging at trace level.
pub(crate) fn close_connection(mut connection: BoxConnection) {
    tracing::trace!(connection = ?connection, "closing connection");
    connection.close();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::PoolError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingConnection {
        closes: Arc<AtomicUsize>,
        open: bool,
    }

    impl Connection for CountingConnection {
        fn close(&mut self) {
            if self.open {
                self.open = false;
                self.closes.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    struct Refusing;

    #[async_trait::async_trait]
    impl Connector for Refusing {
        async fn dial(&self, endpoint: &Endpoint, _timeout: Duration) -> Result<BoxConnection> {
            Err(PoolError::Connect(format!("{} refused", endpoint.address())))
        }
    }

    #[test]
    fn test_close_connection_closes() {
        let closes = Arc::new(AtomicUsize::new(0));
        let conn: BoxConnection = Box::new(CountingConnection {
            closes: closes.clone(),
            open: true,
        });
        close_connection(conn);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_is_open() {
        #[derive(Debug)]
        struct Plain;
        impl Connection for Plain {
            fn close(&mut self) {}
        }
        assert!(Plain.is_open());
    }

    #[tokio::test]
    async fn test_arc_connector_delegates() {
        let connector: Arc<dyn Connector> = Arc::new(Refusing);
        let err = connector
            .dial(&Endpoint::new("h", 1), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to connect: h:1 refused");
    }
}
