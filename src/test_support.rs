//! Shared fixtures for the crate's tests

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::factory::ConnectionFactory;

#[derive(Debug)]
pub(crate) struct TestConn {
    pub(crate) id: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("backend unavailable")]
pub(crate) struct TestError;

/// In-memory factory that records every lifecycle event and can be told to
/// fail creations, fail closes, or report connections stale.
#[derive(Default)]
pub(crate) struct TestFactory {
    next: AtomicU64,
    pub(crate) fail_new: AtomicBool,
    created: Mutex<Vec<u64>>,
    closed: Mutex<Vec<u64>>,
    pub(crate) stale: Mutex<HashSet<u64>>,
    close_failures: Mutex<HashSet<u64>>,
}

impl TestFactory {
    pub(crate) fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn mark_stale(&self, id: u64) {
        self.stale.lock().insert(id);
    }

    pub(crate) fn fail_close(&self, id: u64) {
        self.close_failures.lock().insert(id);
    }

    pub(crate) fn closed_ids(&self) -> Vec<u64> {
        self.closed.lock().clone()
    }

    /// Ids created but not yet closed.
    pub(crate) fn live_ids(&self) -> Vec<u64> {
        let closed = self.closed.lock();
        self.created
            .lock()
            .iter()
            .copied()
            .filter(|id| !closed.contains(id))
            .collect()
    }
}

#[async_trait]
impl ConnectionFactory for Arc<TestFactory> {
    type Conn = TestConn;
    type Error = TestError;

    async fn new_conn(&self) -> Result<TestConn, TestError> {
        if self.fail_new.load(Ordering::SeqCst) {
            return Err(TestError);
        }
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        self.created.lock().push(id);
        Ok(TestConn { id })
    }

    async fn close_conn(&self, conn: TestConn) -> Result<(), TestError> {
        self.closed.lock().push(conn.id);
        if self.close_failures.lock().contains(&conn.id) {
            return Err(TestError);
        }
        Ok(())
    }

    async fn is_stale(&self, conn: &mut TestConn) -> bool {
        self.stale.lock().contains(&conn.id)
    }
}

/// Tiny deterministic generator for randomized interleavings.
pub(crate) fn xorshift(state: &mut u64) -> u64 {
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    *state = x;
    x
}
