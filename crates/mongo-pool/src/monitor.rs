//! Per-endpoint pool state.
//!
//! A [`Monitor`] owns the idle stack of one endpoint and tracks which handles
//! currently hold a connection to it. All of its state sits behind a single
//! mutex so that a push, pop or flush is one atomic step. The lock is never
//! held across an await and connections are always closed after it is
//! released.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::connector::{BoxConnection, close_connection};
use crate::handle::{HandleId, HandleSlot, ServerHandle};
use crate::key::ConnectionKey;
use crate::stats::MonitorStats;

/// Connection counters of a monitor.
///
/// Maintained incrementally; they always equal the sizes of the active set
/// and the idle stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Connections currently checked out by handles.
    pub in_use: usize,
    /// Idle connections waiting on the stack.
    pub in_pool: usize,
}

/// Outcome of returning a handle's connection to its monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CheckIn {
    /// Whether the handle's connection went onto the idle stack.
    pub pooled: bool,
    /// Older idle connections closed to stay within capacity.
    pub evicted: usize,
}

#[derive(Default)]
struct MonitorState {
    /// Idle connections; the top of the stack is the end of the vector.
    idle: Vec<BoxConnection>,
    active: HashMap<HandleId, Weak<HandleSlot>>,
    counters: Counters,
    timeout: Option<Duration>,
}

impl MonitorState {
    fn check_invariants(&self) {
        debug_assert_eq!(self.idle.len(), self.counters.in_pool);
        debug_assert_eq!(self.active.len(), self.counters.in_use);
    }

    fn register(&mut self, id: HandleId, slot: &Arc<HandleSlot>) -> bool {
        if self.active.contains_key(&id) {
            return false;
        }
        self.active.insert(id, Arc::downgrade(slot));
        self.counters.in_use += 1;
        true
    }

    fn unregister(&mut self, id: HandleId) -> bool {
        if self.active.remove(&id).is_some() {
            self.counters.in_use -= 1;
            true
        } else {
            false
        }
    }

    /// Push onto the stack and sever everything below the `max_idle` newest.
    fn push(&mut self, connection: BoxConnection, max_idle: usize) -> Vec<BoxConnection> {
        self.idle.push(connection);
        self.counters.in_pool += 1;

        if self.counters.in_pool <= max_idle {
            return Vec::new();
        }
        let excess = self.idle.len() - max_idle;
        let evicted: Vec<BoxConnection> = self.idle.drain(..excess).collect();
        self.counters.in_pool -= evicted.len();
        evicted
    }
}

/// Pool state for a single [`ConnectionKey`].
pub struct Monitor {
    key: ConnectionKey,
    state: Mutex<MonitorState>,
}

impl Monitor {
    /// Create an empty monitor: no idle or active connections, no timeout.
    #[must_use]
    pub fn new(key: ConnectionKey) -> Self {
        Self {
            key,
            state: Mutex::new(MonitorState::default()),
        }
    }

    /// The identity this monitor pools connections for.
    #[must_use]
    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Current counters.
    #[must_use]
    pub fn counters(&self) -> Counters {
        self.state.lock().counters
    }

    /// The configured timeout, if one was ever set.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.state.lock().timeout
    }

    /// Whether `id` is in the active set.
    #[must_use]
    pub fn is_active(&self, id: HandleId) -> bool {
        self.state.lock().active.contains_key(&id)
    }

    /// Read-only statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> MonitorStats {
        let state = self.state.lock();
        MonitorStats {
            in_use: state.counters.in_use,
            in_pool: state.counters.in_pool,
            timeout_secs: state.timeout.map_or(0, |t| t.as_secs()),
        }
    }

    /// Set the timeout unless one is already set. Zero means "unset".
    ///
    /// Returns `true` if this call set it.
    pub fn set_timeout_once(&self, timeout: Duration) -> bool {
        if timeout.is_zero() {
            return false;
        }
        let mut state = self.state.lock();
        if state.timeout.is_some() {
            return false;
        }
        state.timeout = Some(timeout);
        true
    }

    /// Move the most recently released idle connection into `slot` and
    /// register the slot as active.
    ///
    /// Returns `false` when the idle stack is empty.
    pub(crate) fn check_out_idle(&self, slot: &Arc<HandleSlot>) -> bool {
        let displaced = {
            let mut state = self.state.lock();
            let Some(connection) = state.idle.pop() else {
                return false;
            };
            state.counters.in_pool -= 1;
            let displaced = slot.replace(connection);
            state.register(slot.id(), slot);
            state.check_invariants();

            tracing::trace!(
                key = %self.key,
                handle = %slot.id(),
                in_use = state.counters.in_use,
                in_pool = state.counters.in_pool,
                "reusing idle connection"
            );
            displaced
        };

        if let Some(old) = displaced {
            close_connection(old);
        }
        true
    }

    /// Bind a freshly dialed connection to `slot` and register it as active.
    pub(crate) fn attach(&self, slot: &Arc<HandleSlot>, connection: BoxConnection) {
        let displaced = {
            let mut state = self.state.lock();
            let displaced = slot.replace(connection);
            state.register(slot.id(), slot);
            state.check_invariants();
            displaced
        };

        if let Some(old) = displaced {
            close_connection(old);
        }
    }

    /// Register `handle` as active without touching its connection.
    ///
    /// Registering a handle that is already active is a no-op. Returns
    /// `true` if the handle was added.
    pub fn track(&self, handle: &ServerHandle) -> bool {
        self.register(handle.slot())
    }

    pub(crate) fn register(&self, slot: &Arc<HandleSlot>) -> bool {
        let mut state = self.state.lock();
        let added = state.register(slot.id(), slot);
        state.check_invariants();
        added
    }

    /// Remove `id` from the active set. No-op if absent.
    pub fn unregister(&self, id: HandleId) -> bool {
        let mut state = self.state.lock();
        let removed = state.unregister(id);
        state.check_invariants();
        removed
    }

    /// Remove the handle from the active set and push its connection, if it
    /// has one, onto the idle stack. Evicted connections are closed.
    pub(crate) fn check_in(&self, slot: &HandleSlot, max_idle: usize) -> CheckIn {
        let (pooled, evicted) = {
            let mut state = self.state.lock();
            state.unregister(slot.id());
            let outcome = match slot.take() {
                Some(connection) => (true, state.push(connection, max_idle)),
                None => (false, Vec::new()),
            };
            state.check_invariants();

            tracing::trace!(
                key = %self.key,
                handle = %slot.id(),
                pooled = outcome.0,
                in_use = state.counters.in_use,
                in_pool = state.counters.in_pool,
                "connection checked in"
            );
            outcome
        };

        let evicted_count = evicted.len();
        if evicted_count > 0 {
            tracing::debug!(
                key = %self.key,
                evicted = evicted_count,
                "idle stack over capacity, closing oldest connections"
            );
        }
        for connection in evicted {
            close_connection(connection);
        }

        CheckIn {
            pooled,
            evicted: evicted_count,
        }
    }

    /// Close every active and idle connection and empty both containers.
    ///
    /// Active handles are disconnected and removed from the active set.
    /// Returns the number of connections closed.
    pub fn flush(&self) -> usize {
        let (active, idle) = {
            let mut state = self.state.lock();
            // Slots are emptied under the monitor lock so a concurrent
            // check_in cannot pool a connection that is about to be closed.
            let active: Vec<BoxConnection> = state
                .active
                .drain()
                .filter_map(|(_, slot)| slot.upgrade())
                .filter_map(|slot| slot.take())
                .collect();
            let idle = std::mem::take(&mut state.idle);
            state.counters = Counters::default();
            state.check_invariants();
            (active, idle)
        };

        let mut closed = 0;
        for connection in active.into_iter().chain(idle) {
            close_connection(connection);
            closed += 1;
        }

        if closed > 0 {
            tracing::info!(key = %self.key, closed, "flushed all connections");
        }
        closed
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Monitor")
            .field("key", &self.key)
            .field("counters", &state.counters)
            .field("timeout", &state.timeout)
            .finish()
    }
}
