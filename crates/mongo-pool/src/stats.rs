//! Pool statistics snapshots.

use std::collections::BTreeMap;
use std::fmt;

use crate::key::ConnectionKey;

/// Counters of a single monitor at the time of the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Connections currently checked out.
    pub in_use: usize,
    /// Idle connections on the stack.
    pub in_pool: usize,
    /// Configured timeout in seconds, `0` if unset.
    pub timeout_secs: u64,
}

/// Read-only snapshot of every monitor in a registry, ordered by identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    monitors: BTreeMap<ConnectionKey, MonitorStats>,
}

impl PoolStats {
    pub(crate) fn insert(&mut self, key: ConnectionKey, stats: MonitorStats) {
        self.monitors.insert(key, stats);
    }

    /// Statistics for the monitor with the given full identity string.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<&MonitorStats> {
        self.monitors
            .iter()
            .find(|(key, _)| key.as_str() == identity)
            .map(|(_, stats)| stats)
    }

    /// Statistics for the monitor of `key`.
    #[must_use]
    pub fn get_key(&self, key: &ConnectionKey) -> Option<&MonitorStats> {
        self.monitors.get(key)
    }

    /// Number of monitors in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    /// Whether the snapshot has no monitors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Iterate `(identity, stats)` pairs. Identities include credentials.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MonitorStats)> {
        self.monitors.iter().map(|(key, stats)| (key.as_str(), stats))
    }

    /// Sum of connections checked out across all monitors.
    #[must_use]
    pub fn total_in_use(&self) -> usize {
        self.monitors.values().map(|s| s.in_use).sum()
    }

    /// Sum of idle connections across all monitors.
    #[must_use]
    pub fn total_in_pool(&self) -> usize {
        self.monitors.values().map(|s| s.in_pool).sum()
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, stats) in &self.monitors {
            writeln!(
                f,
                "{key}: in use={}, in pool={}, timeout={}",
                stats.in_use, stats.in_pool, stats.timeout_secs
            )?;
        }
        Ok(())
    }
}
