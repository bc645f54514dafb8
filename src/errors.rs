//! Error types for the connection pool

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError<E> {
    #[error("timed out after {0:?} waiting for a pool slot")]
    Timeout(Duration),

    #[error("failed to open a new connection")]
    Factory(#[source] E),

    #[error("pool is shut down")]
    Closed,
}

pub type PoolResult<T, E> = Result<T, PoolError<E>>;

/// Close failures collected during one reap cycle.
///
/// The cycle itself still made progress: `reaped` counts every connection
/// removed from the idle list, including those whose close failed.
#[derive(Error, Debug)]
#[error("reaped {reaped} idle connections, {} failed to close", .errors.len())]
pub struct ReapError<E> {
    pub reaped: usize,
    pub errors: Vec<E>,
}
