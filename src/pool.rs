//! Core connection pool: admission control, idle-list management, lifecycle

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::conn::{ConnEntry, PooledConn};
use crate::errors::{PoolError, PoolResult, ReapError};
use crate::factory::ConnectionFactory;
use crate::health::HealthStatus;
use crate::metrics::{MetricsTracker, PoolMetrics};
use crate::reaper::ReaperHandle;

/// Bounded pool of reusable connections.
///
/// Cheap to clone; all clones share the same state. At most
/// `limit_pool_size` connections exist at any instant, enforced by an
/// admission semaphore that `get` acquires (bounded by `acquire_timeout`)
/// and `put`/`close` release. Idle connections are reused most-recent-first
/// and probed for staleness before every hand-off.
pub struct Pool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) struct PoolInner<F: ConnectionFactory> {
    pub(crate) factory: F,
    pub(crate) config: PoolConfig,
    pub(crate) state: Mutex<PoolState<F::Conn>>,
    pub(crate) semaphore: Arc<Semaphore>,
    pub(crate) metrics: MetricsTracker,
    next_id: AtomicU64,
    replenishers: TaskTracker,
    reaper: Mutex<Option<ReaperHandle>>,
}

/// All mutable pool state lives behind one mutex so that idle-list membership
/// and the live-connection accounting can never diverge. The mutex is never
/// held across an await point.
pub(crate) struct PoolState<C> {
    /// Idle connections, oldest at the head, most recently returned at the
    /// tail. `get` pops the tail; the reaper scans the head.
    pub(crate) idle: Vec<ConnEntry<C>>,
    /// Ids of every live connection, idle or checked out.
    pub(crate) conns: HashSet<u64>,
    /// Live connections plus reserved in-flight creations. Never exceeds
    /// `limit_pool_size`.
    pub(crate) pool_size: usize,
    /// Connections currently checked out.
    pub(crate) active: usize,
    pub(crate) shutdown: bool,
}

enum Popped<C> {
    Entry(ConnEntry<C>),
    Reserved,
}

impl<F: ConnectionFactory> Pool<F> {
    /// Create a new pool around `factory`.
    ///
    /// When `config.reap_frequency` is set this spawns the background reaper
    /// and therefore must be called within a Tokio runtime.
    pub fn new(factory: F, mut config: PoolConfig) -> Self {
        if config.min_idle_conns > config.limit_pool_size {
            warn!(
                min_idle_conns = config.min_idle_conns,
                limit_pool_size = config.limit_pool_size,
                "min_idle_conns exceeds limit_pool_size, clamping"
            );
            config.min_idle_conns = config.limit_pool_size;
        }

        let semaphore = Arc::new(Semaphore::new(config.limit_pool_size));
        let reap_frequency = config.reap_frequency;
        let inner = Arc::new(PoolInner {
            factory,
            config,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                conns: HashSet::new(),
                pool_size: 0,
                active: 0,
                shutdown: false,
            }),
            semaphore,
            metrics: MetricsTracker::new(),
            next_id: AtomicU64::new(0),
            replenishers: TaskTracker::new(),
            reaper: Mutex::new(None),
        });

        if let Some(frequency) = reap_frequency {
            let handle = crate::reaper::spawn(&inner, frequency);
            *inner.reaper.lock() = Some(handle);
        }

        Self { inner }
    }

    /// Check a connection out of the pool.
    ///
    /// Waits up to `acquire_timeout` for a free slot, then reuses the most
    /// recently returned idle connection that passes the staleness probe, or
    /// opens a new one. Stale idle connections found along the way are closed
    /// and replaced; the loop is bounded by idle-list exhaustion, since every
    /// stale hit permanently removes a connection.
    pub async fn get(&self) -> PoolResult<PooledConn<F>, F::Error> {
        let acquire_timeout = self.inner.config.acquire_timeout;
        let acquired = tokio::time::timeout(
            acquire_timeout,
            self.inner.semaphore.clone().acquire_owned(),
        )
        .await;
        let permit = match acquired {
            Err(_) => {
                self.inner
                    .metrics
                    .acquire_timeouts
                    .fetch_add(1, Ordering::Relaxed);
                return Err(PoolError::Timeout(acquire_timeout));
            }
            Ok(Err(_)) => return Err(PoolError::Closed),
            Ok(Ok(permit)) => permit,
        };

        loop {
            let popped = {
                let mut guard = self.inner.state.lock();
                if guard.shutdown {
                    return Err(PoolError::Closed);
                }
                match guard.idle.pop() {
                    Some(entry) => {
                        self.inner.maybe_replenish(&mut guard);
                        Popped::Entry(entry)
                    }
                    None => {
                        // Holding an admission permit with the idle list
                        // empty guarantees a free slot: permits cap
                        // active + in-flight creations at limit - 1 here.
                        debug_assert!(guard.pool_size < self.inner.config.limit_pool_size);
                        guard.pool_size += 1;
                        Popped::Reserved
                    }
                }
            };

            match popped {
                Popped::Entry(mut entry) => {
                    if self.inner.factory.is_stale(&mut entry.conn).await {
                        // The permit stays with us; it pays for the
                        // replacement connection.
                        self.inner.evict_stale(entry).await;
                        continue;
                    }
                    entry.mark_used();
                    self.inner.state.lock().active += 1;
                    self.inner.metrics.total_gets.fetch_add(1, Ordering::Relaxed);
                    return Ok(self.checkout(entry, permit));
                }
                Popped::Reserved => break,
            }
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        match self.inner.factory.new_conn().await {
            Ok(conn) => {
                let mut entry = ConnEntry::new(conn, id);
                entry.mark_used();
                {
                    let mut guard = self.inner.state.lock();
                    guard.conns.insert(id);
                    guard.active += 1;
                }
                self.inner
                    .metrics
                    .total_created
                    .fetch_add(1, Ordering::Relaxed);
                self.inner.metrics.total_gets.fetch_add(1, Ordering::Relaxed);
                debug!(id, "opened new connection");
                Ok(self.checkout(entry, permit))
            }
            Err(e) => {
                self.inner.state.lock().pool_size -= 1;
                self.inner
                    .metrics
                    .creation_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "connection creation failed");
                // dropping the permit releases the slot
                Err(PoolError::Factory(e))
            }
        }
    }

    /// Return a connection to the idle list.
    ///
    /// Equivalent to dropping the guard, except that after shutdown this
    /// closes the connection through the factory instead of discarding it.
    pub async fn put(&self, mut conn: PooledConn<F>) {
        debug_assert!(conn.pool.ptr_eq(&Arc::downgrade(&self.inner)));
        let Some(mut entry) = conn.entry.take() else {
            return;
        };
        let permit = conn.permit.take();

        let mut discard = None;
        {
            let mut guard = self.inner.state.lock();
            let st = &mut *guard;
            st.active -= 1;
            if st.shutdown {
                st.conns.remove(&entry.id);
                st.pool_size -= 1;
                discard = Some(entry);
            } else {
                entry.touch();
                st.idle.push(entry);
            }
        }
        match discard {
            Some(entry) => {
                self.inner
                    .metrics
                    .total_closed
                    .fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.inner.factory.close_conn(entry.conn).await {
                    warn!(error = %e, "failed to close connection returned after shutdown");
                }
            }
            None => {
                self.inner.metrics.total_puts.fetch_add(1, Ordering::Relaxed);
            }
        }
        drop(permit);
    }

    /// Discard a checked-out connection instead of returning it.
    pub async fn close(&self, mut conn: PooledConn<F>) -> Result<(), F::Error> {
        debug_assert!(conn.pool.ptr_eq(&Arc::downgrade(&self.inner)));
        let Some(entry) = conn.entry.take() else {
            return Ok(());
        };
        let permit = conn.permit.take();
        {
            let mut guard = self.inner.state.lock();
            guard.conns.remove(&entry.id);
            guard.pool_size -= 1;
            guard.active -= 1;
        }
        self.inner
            .metrics
            .total_closed
            .fetch_add(1, Ordering::Relaxed);
        let result = self.inner.factory.close_conn(entry.conn).await;
        drop(permit);
        result
    }

    /// Pre-create idle connections up to `min_idle_conns`.
    ///
    /// Returns how many connections were created. Stops at the first factory
    /// failure.
    pub async fn warm_up(&self) -> PoolResult<usize, F::Error> {
        let min = self.inner.config.min_idle_conns;
        let limit = self.inner.config.limit_pool_size;
        let mut created = 0;
        loop {
            let permit = {
                let mut guard = self.inner.state.lock();
                if guard.shutdown {
                    return Err(PoolError::Closed);
                }
                if guard.idle.len() >= min || guard.pool_size >= limit {
                    break;
                }
                let Ok(permit) = self.inner.semaphore.clone().try_acquire_owned() else {
                    break;
                };
                guard.pool_size += 1;
                permit
            };

            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            match self.inner.factory.new_conn().await {
                Ok(conn) => {
                    {
                        let mut guard = self.inner.state.lock();
                        guard.conns.insert(id);
                        guard.idle.push(ConnEntry::new(conn, id));
                    }
                    self.inner
                        .metrics
                        .total_created
                        .fetch_add(1, Ordering::Relaxed);
                    created += 1;
                    drop(permit);
                }
                Err(e) => {
                    self.inner.state.lock().pool_size -= 1;
                    self.inner
                        .metrics
                        .creation_failures
                        .fetch_add(1, Ordering::Relaxed);
                    drop(permit);
                    return Err(PoolError::Factory(e));
                }
            }
        }
        Ok(created)
    }

    /// Evict idle connections older than `idle_timeout`, never cutting the
    /// idle list below `min_idle_conns`. Returns the number reaped.
    pub async fn reap_stale_conns(&self) -> Result<usize, ReapError<F::Error>> {
        self.inner.reap().await
    }

    /// Stop the reaper, join in-flight replenishment, and close every idle
    /// connection. Pending and future `get`s fail with [`PoolError::Closed`];
    /// connections still checked out are closed when returned. Idempotent.
    pub async fn shutdown(&self) {
        self.inner.state.lock().shutdown = true;
        self.inner.semaphore.close();

        let reaper = self.inner.reaper.lock().take();
        if let Some(handle) = reaper {
            handle.stop().await;
        }

        self.inner.replenishers.close();
        self.inner.replenishers.wait().await;

        let drained = {
            let mut guard = self.inner.state.lock();
            let st = &mut *guard;
            let drained = std::mem::take(&mut st.idle);
            for entry in &drained {
                st.conns.remove(&entry.id);
            }
            st.pool_size -= drained.len();
            drained
        };
        for entry in drained {
            self.inner
                .metrics
                .total_closed
                .fetch_add(1, Ordering::Relaxed);
            if let Err(e) = self.inner.factory.close_conn(entry.conn).await {
                warn!(error = %e, "failed to close idle connection at shutdown");
            }
        }
        debug!("pool shut down");
    }

    /// Idle connections currently available for reuse.
    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Connections currently checked out.
    pub fn active_count(&self) -> usize {
        self.inner.state.lock().active
    }

    /// Live connections, including reserved in-flight creations.
    pub fn size(&self) -> usize {
        self.inner.state.lock().pool_size
    }

    /// Point-in-time health snapshot.
    pub fn health(&self) -> HealthStatus {
        let (idle, active, pool_size) = {
            let guard = self.inner.state.lock();
            (guard.idle.len(), guard.active, guard.pool_size)
        };
        HealthStatus::new(idle, active, pool_size, self.inner.config.limit_pool_size)
    }

    /// Point-in-time metrics snapshot.
    pub fn metrics(&self) -> PoolMetrics {
        let (idle, active, pool_size) = {
            let guard = self.inner.state.lock();
            (guard.idle.len(), guard.active, guard.pool_size)
        };
        self.inner
            .metrics
            .snapshot(idle, active, pool_size, self.inner.config.limit_pool_size)
    }

    fn checkout(&self, entry: ConnEntry<F::Conn>, permit: OwnedSemaphorePermit) -> PooledConn<F> {
        PooledConn {
            entry: Some(entry),
            pool: Arc::downgrade(&self.inner),
            permit: Some(permit),
        }
    }
}

impl<F: ConnectionFactory> PoolInner<F> {
    /// Drop-path return: push the connection back idle, or discard it when
    /// the pool has shut down (the factory's async close cannot run here).
    pub(crate) fn return_entry(&self, mut entry: ConnEntry<F::Conn>) {
        let mut discard = None;
        {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            st.active -= 1;
            if st.shutdown {
                st.conns.remove(&entry.id);
                st.pool_size -= 1;
                discard = Some(entry);
            } else {
                entry.touch();
                st.idle.push(entry);
            }
        }
        match discard {
            Some(entry) => {
                self.metrics.total_closed.fetch_add(1, Ordering::Relaxed);
                debug!(id = entry.id, "discarding connection returned after shutdown");
            }
            None => {
                self.metrics.total_puts.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Remove a detached connection from the books.
    pub(crate) fn forget_conn(&self, id: u64) {
        let mut guard = self.state.lock();
        guard.conns.remove(&id);
        guard.pool_size -= 1;
        guard.active -= 1;
    }

    pub(crate) async fn evict_stale(&self, entry: ConnEntry<F::Conn>) {
        {
            let mut guard = self.state.lock();
            guard.conns.remove(&entry.id);
            guard.pool_size -= 1;
        }
        self.metrics.stale_evicted.fetch_add(1, Ordering::Relaxed);
        self.metrics.total_closed.fetch_add(1, Ordering::Relaxed);
        debug!(id = entry.id, idle_for = ?entry.idle_for(), "closing stale connection");
        if let Err(e) = self.factory.close_conn(entry.conn).await {
            warn!(error = %e, "failed to close stale connection");
        }
    }

    /// Called on every successful idle pop, under the state mutex. Spawns at
    /// most one background creation, targeting an idle count of
    /// `min_idle_conns` and never exceeding `limit_pool_size`. The creation
    /// holds an admission permit until the connection lands idle, so it is
    /// subject to the same backpressure as callers.
    fn maybe_replenish(self: &Arc<Self>, state: &mut PoolState<F::Conn>) {
        let min = self.config.min_idle_conns;
        if min == 0 || state.shutdown {
            return;
        }
        if state.idle.len() >= min || state.pool_size >= self.config.limit_pool_size {
            return;
        }
        let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
            return;
        };
        state.pool_size += 1;
        let inner = Arc::clone(self);
        self.replenishers.spawn(async move {
            inner.replenish_one(permit).await;
        });
    }

    async fn replenish_one(&self, permit: OwnedSemaphorePermit) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.factory.new_conn().await {
            Ok(conn) => {
                let entry = ConnEntry::new(conn, id);
                let mut discard = None;
                {
                    let mut guard = self.state.lock();
                    let st = &mut *guard;
                    if st.shutdown {
                        st.pool_size -= 1;
                        discard = Some(entry);
                    } else {
                        st.conns.insert(id);
                        st.idle.push(entry);
                    }
                }
                match discard {
                    Some(entry) => {
                        if let Err(e) = self.factory.close_conn(entry.conn).await {
                            warn!(error = %e, "failed to close connection created during shutdown");
                        }
                    }
                    None => {
                        self.metrics.total_created.fetch_add(1, Ordering::Relaxed);
                        debug!(id, "replenished idle connection");
                    }
                }
            }
            Err(e) => {
                self.state.lock().pool_size -= 1;
                self.metrics
                    .creation_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "background connection creation failed");
            }
        }
        drop(permit);
    }
}
