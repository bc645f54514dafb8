use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use criterion::{Criterion, criterion_group, criterion_main};
use esox_connpool::{ConnectionFactory, Pool, PoolConfig};

#[derive(Default)]
struct NoopFactory {
    next: AtomicU64,
}

struct NoopConn {
    _id: u64,
}

#[async_trait]
impl ConnectionFactory for NoopFactory {
    type Conn = NoopConn;
    type Error = Infallible;

    async fn new_conn(&self) -> Result<NoopConn, Infallible> {
        Ok(NoopConn {
            _id: self.next.fetch_add(1, Ordering::Relaxed),
        })
    }

    async fn close_conn(&self, _conn: NoopConn) -> Result<(), Infallible> {
        Ok(())
    }

    async fn is_stale(&self, _conn: &mut NoopConn) -> bool {
        false
    }
}

fn warm_checkout(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    let pool = Pool::new(NoopFactory::default(), PoolConfig::new().with_limit_pool_size(16));
    rt.block_on(async {
        let conn = pool.get().await.unwrap();
        pool.put(conn).await;
    });

    c.bench_function("warm_get_put", |b| {
        b.iter(|| {
            rt.block_on(async {
                let conn = pool.get().await.unwrap();
                pool.put(conn).await;
            })
        })
    });
}

criterion_group!(benches, warm_checkout);
criterion_main!(benches);
