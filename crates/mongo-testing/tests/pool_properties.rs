//! Property-based tests for pool counters and capacity.
//!
//! Random sequences of acquire, release, fail and drop are applied to a few
//! handles sharing one endpoint. After every step the monitor's counters must
//! agree with what the connector and the handles observe.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use mongo_driver_pool::{ConnectionPool, Endpoint, Registry, ServerHandle};
use mongo_testing::MockConnector;
use proptest::collection::vec;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Acquire(usize),
    Release(usize),
    Fail(usize),
    Drop(usize),
    Refuse(bool),
}

const HANDLES: usize = 6;

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..HANDLES).prop_map(Op::Acquire),
        4 => (0..HANDLES).prop_map(Op::Release),
        1 => (0..HANDLES).prop_map(Op::Fail),
        1 => (0..HANDLES).prop_map(Op::Drop),
        1 => any::<bool>().prop_map(Op::Refuse),
    ]
}

fn endpoint() -> Endpoint {
    Endpoint::new("prop.local", 27017).database("app")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_counters_track_connections(max_idle in 1usize..4, ops in vec(op(), 1..80)) {
        let connector = MockConnector::new();
        let pool = ConnectionPool::builder()
            .connector(connector.clone())
            .registry(Arc::new(Registry::new()))
            .max_idle(max_idle)
            .build()
            .unwrap();

        let result: Result<(), TestCaseError> = tokio_test::block_on(async {
            let monitor = pool.init(&endpoint(), None).unwrap();
            let mut handles: Vec<ServerHandle> = (0..HANDLES).map(|_| ServerHandle::new(endpoint())).collect();

            for op in &ops {
                match *op {
                    Op::Acquire(i) => {
                        let _ = pool.acquire(&mut handles[i]).await;
                    }
                    Op::Release(i) => pool.release(&mut handles[i]),
                    Op::Fail(i) => pool.fail(&mut handles[i]).await,
                    Op::Drop(i) => handles[i] = ServerHandle::new(endpoint()),
                    Op::Refuse(refuse) => connector.refuse(refuse),
                }

                let counters = monitor.counters();
                let connected = handles.iter().filter(|h| h.is_connected()).count();

                prop_assert!(counters.in_pool <= max_idle, "in_pool {} > max_idle {}", counters.in_pool, max_idle);
                prop_assert!(counters.in_use + counters.in_pool <= connector.dials());
                prop_assert_eq!(counters.in_use, connected);
                prop_assert_eq!(counters.in_use + counters.in_pool, connector.open());
            }
            Ok(())
        });
        result?;
    }

    #[test]
    fn prop_release_never_exceeds_cap(max_idle in 1usize..20, count in 1usize..40) {
        let connector = MockConnector::new();
        let pool = ConnectionPool::builder()
            .connector(connector.clone())
            .registry(Arc::new(Registry::new()))
            .max_idle(max_idle)
            .build()
            .unwrap();

        let counters = tokio_test::block_on(async {
            let mut handles: Vec<ServerHandle> = (0..count).map(|_| ServerHandle::new(endpoint())).collect();
            for handle in &mut handles {
                pool.acquire(handle).await.unwrap();
            }
            for handle in &mut handles {
                pool.release(handle);
            }
            pool.monitor(&endpoint()).unwrap().counters()
        });

        prop_assert_eq!(counters.in_use, 0);
        prop_assert_eq!(counters.in_pool, count.min(max_idle));
        prop_assert_eq!(connector.closes(), count.saturating_sub(max_idle));
    }
}
