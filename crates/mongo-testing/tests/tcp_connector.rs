//! TCP connector tests against the mock database server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use mongo_driver_pool::{ConnectionPool, Connector, PoolError, Registry, ServerHandle, TcpConnector};
use mongo_testing::{LineAuthenticator, MockDbServer};

async fn server() -> MockDbServer {
    MockDbServer::builder()
        .with_user("app", "alice", "secret")
        .build()
        .await
        .expect("Server should start")
}

fn connector() -> TcpConnector {
    TcpConnector::new().authenticator(LineAuthenticator)
}

/// Wait until the server's view of open connections settles.
async fn wait_for_open(server: &MockDbServer, expected: usize) {
    for _ in 0..200 {
        if server.open_connections() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(server.open_connections(), expected);
}

#[tokio::test]
async fn test_dial_without_credentials_skips_handshake() {
    let server = server().await;

    let conn = connector()
        .dial(&server.endpoint(), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(conn.is_open());

    wait_for_open(&server, 1).await;
    assert_eq!(server.authenticated(), 0);
    assert_eq!(server.rejected(), 0);
}

#[tokio::test]
async fn test_dial_with_valid_credentials() {
    let server = server().await;
    let endpoint = server.endpoint().database("app").credentials("alice", "secret");

    connector().dial(&endpoint, Duration::from_secs(5)).await.unwrap();
    assert_eq!(server.authenticated(), 1);
}

#[tokio::test]
async fn test_dial_with_rejected_credentials() {
    let server = server().await;
    let endpoint = server.endpoint().database("app").credentials("alice", "wrong");

    let err = connector().dial(&endpoint, Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(err, PoolError::Authentication(_)), "unexpected error: {err}");
    assert!(!err.is_transient());
    assert!(!err.to_string().contains("wrong"));
    assert_eq!(server.rejected(), 1);
}

#[tokio::test]
async fn test_dial_unreachable_port() {
    let server = server().await;
    let endpoint = server.endpoint();
    server.stop();
    drop(server);

    // Let the accept loop observe the shutdown and release the port
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = connector().dial(&endpoint, Duration::from_secs(5)).await.unwrap_err();
    assert!(
        matches!(err, PoolError::Connect(_) | PoolError::Io(_)),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_pool_over_tcp_closes_sockets() {
    let server = server().await;
    let pool = ConnectionPool::builder()
        .connector(connector())
        .registry(Arc::new(Registry::new()))
        .max_idle(2)
        .build()
        .unwrap();
    let endpoint = server.endpoint().database("app").credentials("alice", "secret");

    let mut handles: Vec<ServerHandle> = (0..4).map(|_| ServerHandle::new(endpoint.clone())).collect();
    for handle in &mut handles {
        pool.acquire(handle).await.unwrap();
    }
    wait_for_open(&server, 4).await;
    assert_eq!(server.authenticated(), 4);

    // Two over the cap are closed on release
    for handle in &mut handles {
        pool.release(handle);
    }
    wait_for_open(&server, 2).await;

    // Reuse does not reconnect
    pool.acquire(&mut handles[0]).await.unwrap();
    assert_eq!(server.connection_count(), 4);

    assert_eq!(pool.shutdown(), 2);
    wait_for_open(&server, 0).await;
}
