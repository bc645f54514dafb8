//! Checked-out connection guard and per-connection bookkeeping

use std::ops::{Deref, DerefMut};
use std::sync::Weak;
use std::time::{Duration, Instant};

use tokio::sync::OwnedSemaphorePermit;

use crate::factory::ConnectionFactory;
use crate::pool::PoolInner;

/// A live connection together with its lifecycle stamps. Lives in the idle
/// list while unused and inside a [`PooledConn`] while checked out.
pub(crate) struct ConnEntry<C> {
    pub(crate) conn: C,
    pub(crate) id: u64,
    pub(crate) created_at: Instant,
    pub(crate) last_used: Instant,
    pub(crate) usage_count: u64,
}

impl<C> ConnEntry<C> {
    pub(crate) fn new(conn: C, id: u64) -> Self {
        let now = Instant::now();
        Self {
            conn,
            id,
            created_at: now,
            last_used: now,
            usage_count: 0,
        }
    }

    /// Refresh the idle clock without counting a checkout.
    pub(crate) fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    /// Record a hand-off to a caller.
    pub(crate) fn mark_used(&mut self) {
        self.last_used = Instant::now();
        self.usage_count += 1;
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }
}

/// A connection checked out of a [`Pool`](crate::Pool).
///
/// Dereferences to the underlying connection. Returning it via
/// [`Pool::put`](crate::Pool::put) is preferred; dropping the guard returns
/// it as well, except after shutdown, where the connection is discarded
/// without running the factory's async close.
pub struct PooledConn<F: ConnectionFactory> {
    pub(crate) entry: Option<ConnEntry<F::Conn>>,
    pub(crate) pool: Weak<PoolInner<F>>,
    pub(crate) permit: Option<OwnedSemaphorePermit>,
}

impl<F: ConnectionFactory> PooledConn<F> {
    /// Stable identifier assigned at creation.
    pub fn id(&self) -> u64 {
        self.inner().id
    }

    /// When the factory created this connection.
    pub fn created_at(&self) -> Instant {
        self.inner().created_at
    }

    /// Last time this connection was handed to a caller or returned.
    pub fn last_used(&self) -> Instant {
        self.inner().last_used
    }

    /// How many times this connection has been checked out.
    pub fn usage_count(&self) -> u64 {
        self.inner().usage_count
    }

    /// Take the raw connection out of the pool permanently.
    ///
    /// The pool forgets the connection and frees its slot; closing the
    /// underlying resource becomes the caller's job.
    pub fn detach(mut self) -> F::Conn {
        let entry = self.entry.take().expect("connection already taken");
        if let Some(inner) = self.pool.upgrade() {
            inner.forget_conn(entry.id);
        }
        // permit drops with `self`, freeing the slot
        entry.conn
    }

    fn inner(&self) -> &ConnEntry<F::Conn> {
        self.entry.as_ref().expect("connection already taken")
    }
}

impl<F> std::fmt::Debug for PooledConn<F>
where
    F: ConnectionFactory,
    F::Conn: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("PooledConn");
        if let Some(entry) = self.entry.as_ref() {
            s.field("id", &entry.id)
                .field("usage_count", &entry.usage_count)
                .field("conn", &entry.conn);
        }
        s.finish()
    }
}

impl<F: ConnectionFactory> Deref for PooledConn<F> {
    type Target = F::Conn;

    fn deref(&self) -> &Self::Target {
        &self.inner().conn
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConn<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.entry.as_mut().expect("connection already taken").conn
    }
}

impl<F: ConnectionFactory> Drop for PooledConn<F> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take()
            && let Some(inner) = self.pool.upgrade()
        {
            // Push before the permit (dropped after this body) frees the
            // slot, so a waiting caller always finds the connection idle.
            inner.return_entry(entry);
        }
    }
}
