// EsoxSolutions.ConnPool - demo binary
// Walks a pool through checkout, return, and shutdown with an in-process
// factory standing in for a real backend.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use esox_connpool::{ConnectionFactory, Pool, PoolConfig};

#[derive(Default)]
struct DemoFactory {
    next: AtomicU64,
}

#[derive(Debug)]
struct DemoConn {
    id: u64,
}

#[async_trait]
impl ConnectionFactory for DemoFactory {
    type Conn = DemoConn;
    type Error = Infallible;

    async fn new_conn(&self) -> Result<DemoConn, Infallible> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        Ok(DemoConn { id })
    }

    async fn close_conn(&self, conn: DemoConn) -> Result<(), Infallible> {
        println!("  (closed connection {})", conn.id);
        Ok(())
    }

    async fn is_stale(&self, _conn: &mut DemoConn) -> bool {
        false
    }
}

#[tokio::main]
async fn main() {
    println!("=== EsoxSolutions.ConnPool demo ===");

    let config = PoolConfig::new()
        .with_min_idle_conns(2)
        .with_limit_pool_size(5)
        .with_idle_timeout(Duration::from_secs(240))
        .with_reaper(Duration::from_secs(60));
    let pool = Pool::new(DemoFactory::default(), config);

    let mut batch = Vec::new();
    for _ in 0..5 {
        batch.push(pool.get().await.unwrap());
    }
    println!("checked out {} connections", batch.len());
    println!("idle conn: {}, active conn: {}", pool.idle_count(), pool.active_count());

    for conn in batch.drain(..) {
        pool.put(conn).await;
    }
    println!("returned 5 connections");
    println!("idle conn: {}, active conn: {}", pool.idle_count(), pool.active_count());

    let b1 = pool.get().await.unwrap();
    let b2 = pool.get().await.unwrap();
    let b3 = pool.get().await.unwrap();
    println!("idle conn: {}, active conn: {}", pool.idle_count(), pool.active_count());

    pool.put(b1).await;
    pool.put(b2).await;
    pool.put(b3).await;
    println!("returned 3 connections");
    println!("idle conn: {}, active conn: {}", pool.idle_count(), pool.active_count());

    pool.shutdown().await;
    println!("pool shut down");
}
