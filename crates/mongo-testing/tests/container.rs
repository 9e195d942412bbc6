//! Real-server tests using a MongoDB container.
//!
//! Requires Docker. Ignored by default:
//!
//! ```bash
//! cargo test -p mongo-testing --test container -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use mongo_driver_pool::{ConnectionPool, Endpoint, Registry, ServerHandle, TcpConnector};
use mongo_testing::MongoContainer;
use mongo_testing::container::MONGO_PORT;
use testcontainers::runners::AsyncRunner;

#[tokio::test]
#[ignore = "Requires Docker"]
async fn test_pool_against_container() {
    let _ = tracing_subscriber::fmt::try_init();

    let container = MongoContainer::default().start().await.expect("Failed to start MongoDB");
    let port = container.get_host_port_ipv4(MONGO_PORT).await.unwrap();

    let pool = ConnectionPool::builder()
        .connector(TcpConnector::new())
        .registry(Arc::new(Registry::new()))
        .build()
        .unwrap();
    let endpoint = Endpoint::new("127.0.0.1", port).database("admin");
    pool.init(&endpoint, Some(Duration::from_secs(10))).unwrap();

    let mut handles: Vec<ServerHandle> = (0..3).map(|_| ServerHandle::new(endpoint.clone())).collect();
    for handle in &mut handles {
        pool.acquire(handle).await.expect("Failed to acquire");
    }
    for handle in &mut handles {
        pool.release(handle);
    }

    let counters = pool.monitor(&endpoint).unwrap().counters();
    assert_eq!((counters.in_use, counters.in_pool), (0, 3));

    pool.acquire(&mut handles[0]).await.unwrap();
    pool.fail(&mut handles[0]).await;
    assert!(handles[0].is_connected());
    assert_eq!(pool.shutdown(), 3);
}
