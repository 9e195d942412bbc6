//! Scripted in-memory connector.
//!
//! [`MockConnector`] hands out [`MockConnection`]s labelled `conn-1`,
//! `conn-2`, ... in dial order, counts dials and closes, and can be told to
//! refuse, fail a number of upcoming dials, or hang until the pool's timeout
//! fires.
//!
//! ```rust,ignore
//! let connector = MockConnector::new();
//! let pool = ConnectionPool::builder().connector(connector.clone()).build()?;
//!
//! pool.acquire(&mut handle).await?;
//! assert_eq!(label_of(&handle).as_deref(), Some("conn-1"));
//! assert_eq!(connector.dials(), 1);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use mongo_driver_pool::{BoxConnection, Connection, Connector, Endpoint, PoolError, ServerHandle};

#[derive(Debug, Default)]
struct Shared {
    dials: AtomicUsize,
    attempts: AtomicUsize,
    closes: AtomicUsize,
    fail_next: AtomicUsize,
    refuse: AtomicBool,
    hang: AtomicBool,
}

/// In-memory [`Connector`] with observable counters.
///
/// Clones share counters and script.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    shared: Arc<Shared>,
}

impl MockConnector {
    /// Create a connector that accepts every dial.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful dials so far.
    #[must_use]
    pub fn dials(&self) -> usize {
        self.shared.dials.load(Ordering::SeqCst)
    }

    /// Dial attempts so far, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Connections closed so far. Closing a connection twice counts once.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Connections dialed and not yet closed.
    #[must_use]
    pub fn open(&self) -> usize {
        self.dials().saturating_sub(self.closes())
    }

    /// Refuse every dial until called again with `false`.
    pub fn refuse(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Refuse the next `count` dials, then accept again.
    pub fn fail_next(&self, count: usize) {
        self.shared.fail_next.store(count, Ordering::SeqCst);
    }

    /// Never complete dials until called again with `false`.
    pub fn hang(&self, hang: bool) {
        self.shared.hang.store(hang, Ordering::SeqCst);
    }

    fn should_fail(&self) -> bool {
        if self.shared.refuse.load(Ordering::SeqCst) {
            return true;
        }
        self.shared
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn dial(&self, endpoint: &Endpoint, _timeout: Duration) -> Result<BoxConnection, PoolError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);

        while self.shared.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        if self.should_fail() {
            tracing::debug!(addr = %endpoint.address(), "mock dial refused");
            return Err(PoolError::Connect(format!("{}: connection refused", endpoint.address())));
        }

        let n = self.shared.dials.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(MockConnection {
            label: format!("conn-{n}"),
            open: true,
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// Connection produced by [`MockConnector`].
///
/// `Debug` prints the label alone, so `format!("{conn:?}")` yields `conn-3`.
pub struct MockConnection {
    label: String,
    open: bool,
    shared: Arc<Shared>,
}

impl MockConnection {
    /// The dial-order label, `conn-N`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Connection for MockConnection {
    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Label of the connection `handle` holds, or `None` if it is disconnected.
///
/// Only meaningful for connections produced by [`MockConnector`].
#[must_use]
pub fn label_of(handle: &ServerHandle) -> Option<String> {
    handle.with_connection(|conn| format!("{conn:?}"))
}
