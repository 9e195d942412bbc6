//! The process-wide registry.
//!
//! Hosts that keep connections alive across many logical requests share one
//! [`Registry`] for the lifetime of the process. It is created on first use
//! and torn down once, when the host exits.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::registry::Registry;

static CONNECTION_POOLS: Lazy<Arc<Registry>> = Lazy::new(|| {
    tracing::debug!("creating process-wide connection pool registry");
    Arc::new(Registry::new())
});

/// Return the process-wide registry, creating it on first use.
#[must_use]
pub fn acquire_connection_pool_registry() -> Arc<Registry> {
    Arc::clone(&CONNECTION_POOLS)
}

/// Teardown hook for host process exit.
///
/// Closes every pooled and checked-out connection in the process-wide
/// registry and discards its monitors. Returns the number of connections
/// closed. Safe to call more than once.
pub fn shutdown_connection_pool_registry() -> usize {
    match Lazy::get(&CONNECTION_POOLS) {
        Some(registry) => registry.shutdown(),
        None => 0,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_shared() {
        let a = acquire_connection_pool_registry();
        let b = acquire_connection_pool_registry();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
