//! # EsoxSolutions.ConnPool
//!
//! Bounded, self-replenishing connection pool for Tokio with staleness
//! probing, idle reaping, and metrics.
//!
//! ## Features
//!
//! - Hard cap on concurrently live connections via an admission semaphore
//! - LIFO reuse of idle connections, probed for liveness before every hand-off
//! - Automatic return of connections via RAII (Drop trait)
//! - Background replenishment toward a configured warm minimum
//! - Periodic reaper that evicts aged idle connections, stoppable for shutdown
//! - Deadline-bounded acquisition with a dedicated timeout error
//! - Health snapshots and Prometheus-format metrics export
//!
//! ## Quick Start
//!
//! ```no_run
//! use esox_connpool::{ConnectionFactory, Pool, PoolConfig};
//!
//! # async fn demo<F: ConnectionFactory>(factory: F) -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Pool::new(factory, PoolConfig::new().with_limit_pool_size(10));
//!
//! let conn = pool.get().await?;
//! // ... use the connection ...
//! pool.put(conn).await;
//! # Ok(())
//! # }
//! ```
//!
//! The pool never speaks to the backing service itself: supply a
//! [`ConnectionFactory`] that knows how to open, probe, and close
//! connections, and the pool handles admission, reuse, and eviction.

mod config;
mod conn;
mod errors;
mod factory;
mod health;
mod metrics;
mod pool;
mod reaper;

#[cfg(test)]
mod test_support;

pub use config::PoolConfig;
pub use conn::PooledConn;
pub use errors::{PoolError, PoolResult, ReapError};
pub use factory::ConnectionFactory;
pub use health::HealthStatus;
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::Pool;
