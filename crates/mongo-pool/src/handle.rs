//! Caller-owned server handles.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::connector::{BoxConnection, Connection};
use crate::key::{ConnectionKey, Endpoint};
use crate::monitor::Monitor;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`ServerHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The connection slot shared between a handle and its monitor.
///
/// The handle owns it; the monitor keeps a weak reference while the handle
/// is checked out so a flush can close the connection.
pub(crate) struct HandleSlot {
    id: HandleId,
    connection: Mutex<Option<BoxConnection>>,
}

impl HandleSlot {
    pub(crate) fn new() -> Self {
        Self {
            id: HandleId::next(),
            connection: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> HandleId {
        self.id
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connection.lock().is_some()
    }

    pub(crate) fn replace(&self, connection: BoxConnection) -> Option<BoxConnection> {
        self.connection.lock().replace(connection)
    }

    pub(crate) fn take(&self) -> Option<BoxConnection> {
        self.connection.lock().take()
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut dyn Connection) -> R) -> Option<R> {
        let mut guard = self.connection.lock();
        match guard.as_mut() {
            Some(connection) => Some(f(connection.as_mut())),
            None => None,
        }
    }
}

impl fmt::Debug for HandleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleSlot")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// The monitor a checked-out handle returns to when dropped.
pub(crate) struct Binding {
    pub(crate) monitor: Arc<Monitor>,
    pub(crate) max_idle: usize,
}

/// A caller's current connection to one endpoint.
///
/// Created unbound; [`ConnectionPool::acquire`](crate::ConnectionPool::acquire)
/// gives it a connection, [`release`](crate::ConnectionPool::release) returns
/// the connection to the idle stack. A handle dropped while checked out is
/// released automatically.
pub struct ServerHandle {
    endpoint: Endpoint,
    key: ConnectionKey,
    slot: Arc<HandleSlot>,
    binding: Option<Binding>,
}

impl ServerHandle {
    /// Create an unbound handle for `endpoint`.
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        let key = endpoint.key();
        Self {
            endpoint,
            key,
            slot: Arc::new(HandleSlot::new()),
            binding: None,
        }
    }

    /// The endpoint this handle connects to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The pool identity of the endpoint.
    #[must_use]
    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Process-unique identity of this handle.
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.slot.id()
    }

    /// Whether the handle currently holds a usable connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.slot.is_connected()
    }

    /// Run `f` against the checked-out connection.
    ///
    /// Returns `None` when the handle is disconnected.
    pub fn with_connection<R>(&self, f: impl FnOnce(&mut dyn Connection) -> R) -> Option<R> {
        self.slot.with(f)
    }

    /// Close the current connection, if any, without involving a monitor.
    pub(crate) fn disconnect(&mut self) -> bool {
        match self.slot.take() {
            Some(connection) => {
                crate::connector::close_connection(connection);
                true
            }
            None => false,
        }
    }

    pub(crate) fn slot(&self) -> &Arc<HandleSlot> {
        &self.slot
    }

    pub(crate) fn bind(&mut self, monitor: Arc<Monitor>, max_idle: usize) {
        self.binding = Some(Binding { monitor, max_idle });
    }

    pub(crate) fn unbind(&mut self) -> Option<Binding> {
        self.binding.take()
    }
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("id", &self.slot.id())
            .field("key", &self.key)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(binding) = self.binding.take() {
            tracing::trace!(
                handle = %self.slot.id(),
                key = %self.key,
                "returning connection to pool on drop"
            );
            binding.monitor.check_in(&self.slot, binding.max_idle);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct Counting(Arc<AtomicUsize>);

    impl Connection for Counting {
        fn close(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_handle_ids_are_unique() {
        let a = ServerHandle::new(Endpoint::new("h", 1));
        let b = ServerHandle::new(Endpoint::new("h", 1));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_new_handle_is_disconnected() {
        let handle = ServerHandle::new(Endpoint::new("h", 1));
        assert!(!handle.is_connected());
        assert!(handle.with_connection(|_| ()).is_none());
    }

    #[test]
    fn test_disconnect_closes_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut handle = ServerHandle::new(Endpoint::new("h", 1));
        handle.slot().replace(Box::new(Counting(closes.clone())));
        assert!(handle.is_connected());

        assert!(handle.disconnect());
        assert!(!handle.disconnect());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!handle.is_connected());
    }

    #[test]
    fn test_drop_returns_connection_to_bound_monitor() {
        let closes = Arc::new(AtomicUsize::new(0));
        let endpoint = Endpoint::new("h", 1);
        let monitor = Arc::new(Monitor::new(endpoint.key()));

        let mut handle = ServerHandle::new(endpoint);
        monitor.attach(handle.slot(), Box::new(Counting(closes.clone())));
        handle.bind(monitor.clone(), 50);
        assert_eq!(monitor.counters().in_use, 1);

        drop(handle);
        let counters = monitor.counters();
        assert_eq!(counters.in_use, 0);
        assert_eq!(counters.in_pool, 1);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handle_id_display() {
        let handle = ServerHandle::new(Endpoint::new("h", 1));
        assert_eq!(handle.id().to_string(), format!("#{}", handle.id().get()));
    }
}
