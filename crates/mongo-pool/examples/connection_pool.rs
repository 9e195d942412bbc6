//! Connection pooling with statistics example.
//!
//! Checks connections out of the pool, returns them, and prints the
//! per-endpoint statistics after each step.
//!
//! # Running
//!
//! ```bash
//! export MONGO_HOST=localhost
//! export MONGO_PORT=27017
//!
//! cargo run --example connection_pool
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use mongo_driver_pool::{ConnectionPool, Endpoint, ServerHandle, TcpConnector};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("MONGO_HOST").unwrap_or_else(|_| "localhost".into());
    let port = std::env::var("MONGO_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(mongo_driver_pool::key::DEFAULT_PORT);

    println!("=== Connection Pool Example ===\n");

    let pool = ConnectionPool::builder()
        .connector(TcpConnector::new())
        .max_idle(8)
        .default_timeout(Duration::from_secs(10))
        .build()?;

    let endpoint = Endpoint::new(host, port).database("admin");
    pool.init(&endpoint, Some(Duration::from_secs(5)))?;

    // Example 1: check out and return a single connection
    println!("1. Single checkout:");
    let mut handle = ServerHandle::new(endpoint.clone());
    pool.acquire(&mut handle).await?;
    println!("  handle {} connected: {}", handle.id(), handle.is_connected());
    print!("{}", pool.stats());
    pool.release(&mut handle);
    print!("{}", pool.stats());

    // Example 2: several handles at once, then all returned
    println!("\n2. Four concurrent handles:");
    let mut handles: Vec<ServerHandle> = (0..4).map(|_| ServerHandle::new(endpoint.clone())).collect();
    for handle in &mut handles {
        pool.acquire(handle).await?;
    }
    print!("{}", pool.stats());
    for handle in &mut handles {
        pool.release(handle);
    }
    print!("{}", pool.stats());

    // Example 3: reuse comes from the idle stack
    println!("\n3. Reuse:");
    let mut handle = ServerHandle::new(endpoint);
    pool.acquire(&mut handle).await?;
    drop(handle);

    let metrics = pool.metrics();
    println!("  dials: {}", metrics.dials);
    println!("  idle reuses: {}", metrics.idle_reuses);
    println!("  reuse rate: {:.1}%", metrics.reuse_rate() * 100.0);

    let closed = pool.shutdown();
    println!("\nShut down, closed {closed} connection(s)");

    Ok(())
}
