//! Mapping from endpoint identity to monitor.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{PoolError, Result};
use crate::key::ConnectionKey;
use crate::monitor::Monitor;
use crate::stats::PoolStats;

/// Concurrency-safe map of [`ConnectionKey`] to [`Monitor`].
///
/// Monitors are created on first use and live until [`shutdown`](Self::shutdown).
/// A monitor whose endpoint went down stays registered, empty, ready for the
/// endpoint to come back.
#[derive(Debug, Default)]
pub struct Registry {
    monitors: RwLock<HashMap<ConnectionKey, Arc<Monitor>>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the monitor for `key`, creating an empty one if needed.
    ///
    /// Fails only if the map cannot grow.
    pub fn get_or_create(&self, key: &ConnectionKey) -> Result<Arc<Monitor>> {
        if let Some(monitor) = self.monitors.read().get(key) {
            return Ok(Arc::clone(monitor));
        }

        let mut monitors = self.monitors.write();
        if let Some(monitor) = monitors.get(key) {
            return Ok(Arc::clone(monitor));
        }
        monitors
            .try_reserve(1)
            .map_err(|e| PoolError::ResourceExhausted(format!("monitor for {key}: {e}")))?;

        let monitor = Arc::new(Monitor::new(key.clone()));
        monitors.insert(key.clone(), Arc::clone(&monitor));
        tracing::debug!(key = %key, monitors = monitors.len(), "created monitor");
        Ok(monitor)
    }

    /// Return the monitor for `key` without creating one.
    #[must_use]
    pub fn get(&self, key: &ConnectionKey) -> Option<Arc<Monitor>> {
        self.monitors.read().get(key).cloned()
    }

    /// Visit every monitor. Order is unspecified.
    ///
    /// The registry lock is not held while `f` runs.
    pub fn for_each(&self, mut f: impl FnMut(&ConnectionKey, &Arc<Monitor>)) {
        let monitors: Vec<(ConnectionKey, Arc<Monitor>)> = self
            .monitors
            .read()
            .iter()
            .map(|(key, monitor)| (key.clone(), Arc::clone(monitor)))
            .collect();
        for (key, monitor) in &monitors {
            f(key, monitor);
        }
    }

    /// Number of monitors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.monitors.read().len()
    }

    /// Whether no monitor was created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.monitors.read().is_empty()
    }

    /// Statistics for every monitor.
    #[must_use]
    pub fn snapshot(&self) -> PoolStats {
        let mut stats = PoolStats::default();
        self.for_each(|key, monitor| stats.insert(key.clone(), monitor.stats()));
        stats
    }

    /// Close every active and idle connection of every monitor, then discard
    /// all monitors.
    ///
    /// Returns the number of connections closed. Calling it again finds
    /// nothing to close.
    pub fn shutdown(&self) -> usize {
        let monitors: Vec<Arc<Monitor>> = {
            let mut monitors = self.monitors.write();
            monitors.drain().map(|(_, monitor)| monitor).collect()
        };

        let count = monitors.len();
        let closed: usize = monitors.iter().map(|monitor| monitor.flush()).sum();
        if count > 0 {
            tracing::info!(monitors = count, closed, "connection pool registry shut down");
        }
        closed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::key::Endpoint;
    use std::time::Duration;

    #[test]
    fn test_get_or_create_returns_same_monitor() {
        let registry = Registry::new();
        let key = Endpoint::new("h", 1).key();

        let a = registry.get_or_create(&key).unwrap();
        let b = registry.get_or_create(&key).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_new_monitor_is_zero_valued() {
        let registry = Registry::new();
        let monitor = registry.get_or_create(&Endpoint::new("h", 1).key()).unwrap();
        let stats = monitor.stats();
        assert_eq!((stats.in_use, stats.in_pool, stats.timeout_secs), (0, 0, 0));
    }

    #[test]
    fn test_get_does_not_create() {
        let registry = Registry::new();
        assert!(registry.get(&Endpoint::new("h", 1).key()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_distinct_users_get_distinct_monitors() {
        let registry = Registry::new();
        let a = registry
            .get_or_create(&Endpoint::new("h", 1).credentials("alice", "p").key())
            .unwrap();
        let b = registry
            .get_or_create(&Endpoint::new("h", 1).credentials("bob", "p").key())
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));

        a.set_timeout_once(Duration::from_secs(10));
        assert_eq!(b.timeout(), None);
    }

    #[test]
    fn test_dotted_names_get_distinct_monitors() {
        let registry = Registry::new();
        let a_key = Endpoint::new("h", 1).database("a.b").credentials("c", "p").key();
        let b_key = Endpoint::new("h", 1).database("a").credentials("b.c", "p").key();

        let a = registry.get_or_create(&a_key).unwrap();
        let b = registry.get_or_create(&b_key).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);

        let stats = registry.snapshot();
        assert_eq!(stats.len(), 2);
        assert!(stats.get_key(&a_key).is_some());
        assert!(stats.get_key(&b_key).is_some());
    }

    #[test]
    fn test_for_each_visits_all() {
        let registry = Registry::new();
        for port in 1..=3 {
            registry.get_or_create(&Endpoint::new("h", port).key()).unwrap();
        }
        let mut seen = Vec::new();
        registry.for_each(|key, _| seen.push(key.as_str().to_string()));
        seen.sort();
        assert_eq!(seen, vec!["h:1...", "h:2...", "h:3..."]);
    }

    #[test]
    fn test_snapshot_and_shutdown() {
        let registry = Registry::new();
        let monitor = registry.get_or_create(&Endpoint::new("h", 1).key()).unwrap();
        monitor.set_timeout_once(Duration::from_secs(5));

        let stats = registry.snapshot();
        assert_eq!(stats.get("h:1...").unwrap().timeout_secs, 5);

        assert_eq!(registry.shutdown(), 0);
        assert!(registry.is_empty());
        assert_eq!(registry.shutdown(), 0);
    }
}
