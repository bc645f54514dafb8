//! Background eviction of aged idle connections

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::ReapError;
use crate::factory::ConnectionFactory;
use crate::pool::PoolInner;

impl<F: ConnectionFactory> PoolInner<F> {
    /// One reap cycle: evict idle connections older than `idle_timeout`,
    /// keeping at least `min_idle_conns` idle. Selection happens under the
    /// state mutex; the factory closes run after it is released.
    pub(crate) async fn reap(&self) -> Result<usize, ReapError<F::Error>> {
        let victims = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let excess = st.idle.len().saturating_sub(self.config.min_idle_conns);
            if excess == 0 {
                Vec::new()
            } else {
                let mut keep = Vec::with_capacity(st.idle.len());
                let mut victims = Vec::new();
                for entry in st.idle.drain(..) {
                    if victims.len() < excess && entry.idle_for() > self.config.idle_timeout {
                        victims.push(entry);
                    } else {
                        keep.push(entry);
                    }
                }
                st.idle = keep;
                for entry in &victims {
                    st.conns.remove(&entry.id);
                }
                st.pool_size -= victims.len();
                victims
            }
        };

        let reaped = victims.len();
        if reaped > 0 {
            self.metrics
                .reaped_total
                .fetch_add(reaped as u64, Ordering::Relaxed);
        }

        let mut errors = Vec::new();
        for entry in victims {
            self.metrics.total_closed.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = self.factory.close_conn(entry.conn).await {
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(reaped)
        } else {
            Err(ReapError { reaped, errors })
        }
    }
}

/// Handle to the background reaper task.
pub(crate) struct ReaperHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ReaperHandle {
    pub(crate) async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

/// Spawn the periodic reaper. The task holds only a weak reference, so a
/// pool dropped without an explicit shutdown still winds its reaper down.
pub(crate) fn spawn<F: ConnectionFactory>(
    inner: &Arc<PoolInner<F>>,
    frequency: Duration,
) -> ReaperHandle {
    let token = CancellationToken::new();
    let handle = tokio::spawn(run(Arc::downgrade(inner), frequency, token.clone()));
    ReaperHandle { token, handle }
}

async fn run<F: ConnectionFactory>(
    pool: Weak<PoolInner<F>>,
    frequency: Duration,
    token: CancellationToken,
) {
    let first_tick = tokio::time::Instant::now() + frequency;
    let mut ticker = tokio::time::interval_at(first_tick, frequency);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = pool.upgrade() else { break };
                match inner.reap().await {
                    Ok(0) => {}
                    Ok(reaped) => debug!(reaped, "reaped idle connections"),
                    Err(e) => warn!(error = %e, "reap cycle had close failures"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::PoolConfig;
    use crate::pool::Pool;
    use crate::test_support::TestFactory;
    use std::sync::Arc;
    use std::time::Duration;

    async fn fill_and_release(pool: &Pool<Arc<TestFactory>>, count: usize) {
        let mut held = Vec::new();
        for _ in 0..count {
            held.push(pool.get().await.unwrap());
        }
        for conn in held {
            pool.put(conn).await;
        }
    }

    #[tokio::test]
    async fn reap_keeps_the_idle_floor() {
        let config = PoolConfig::new()
            .with_min_idle_conns(2)
            .with_limit_pool_size(3)
            .with_idle_timeout(Duration::from_millis(100));
        let factory = TestFactory::shared();
        let pool = Pool::new(factory.clone(), config);

        fill_and_release(&pool, 3).await;
        assert_eq!(pool.idle_count(), 3);

        tokio::time::sleep(Duration::from_millis(150)).await;

        // All three exceed the idle timeout, but the floor spares two.
        assert_eq!(pool.reap_stale_conns().await.unwrap(), 1);
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.size(), 2);

        // A second cycle with no traffic stays at the floor.
        assert_eq!(pool.reap_stale_conns().await.unwrap(), 0);
        assert_eq!(pool.idle_count(), 2);
    }

    #[tokio::test]
    async fn reap_ignores_fresh_connections() {
        let config = PoolConfig::new()
            .with_limit_pool_size(3)
            .with_idle_timeout(Duration::from_secs(60));
        let factory = TestFactory::shared();
        let pool = Pool::new(factory.clone(), config);

        fill_and_release(&pool, 3).await;
        assert_eq!(pool.reap_stale_conns().await.unwrap(), 0);
        assert_eq!(pool.idle_count(), 3);
    }

    #[tokio::test]
    async fn reap_evicts_oldest_first() {
        let config = PoolConfig::new()
            .with_min_idle_conns(1)
            .with_limit_pool_size(2)
            .with_idle_timeout(Duration::from_millis(50));
        let factory = TestFactory::shared();
        let pool = Pool::new(factory.clone(), config);

        let a = pool.get().await.unwrap();
        let b = pool.get().await.unwrap();
        let (a_id, b_id) = (a.id(), b.id());
        pool.put(a).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        pool.put(b).await;

        // Only `a` is past the timeout; it sits at the head.
        assert_eq!(pool.reap_stale_conns().await.unwrap(), 1);
        let closed = factory.closed_ids();
        assert!(closed.contains(&a_id));
        assert!(!closed.contains(&b_id));
    }

    #[tokio::test]
    async fn reap_aggregates_close_failures() {
        let config = PoolConfig::new()
            .with_limit_pool_size(2)
            .with_idle_timeout(Duration::from_millis(10));
        let factory = TestFactory::shared();
        let pool = Pool::new(factory.clone(), config);

        fill_and_release(&pool, 2).await;
        for id in factory.live_ids() {
            factory.fail_close(id);
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        let err = pool.reap_stale_conns().await.unwrap_err();
        assert_eq!(err.reaped, 2);
        assert_eq!(err.errors.len(), 2);
        // Failed closes still leave the books clean.
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn background_reaper_settles_at_the_floor() {
        let config = PoolConfig::new()
            .with_min_idle_conns(2)
            .with_limit_pool_size(3)
            .with_idle_timeout(Duration::from_millis(100))
            .with_reaper(Duration::from_millis(50));
        let factory = TestFactory::shared();
        let pool = Pool::new(factory.clone(), config);

        fill_and_release(&pool, 3).await;
        assert_eq!(pool.idle_count(), 3);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.size(), 2);

        pool.shutdown().await;
        assert_eq!(pool.idle_count(), 0);
    }
}
