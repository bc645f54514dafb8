//! Contract between the pool and whatever opens real connections

use async_trait::async_trait;

/// Opens, probes, and closes connections to the backing service.
///
/// The pool never touches the wire itself; everything protocol-specific
/// (dialing, authentication, health probes) lives behind this trait.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Conn: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open and authenticate a new connection.
    async fn new_conn(&self) -> Result<Self::Conn, Self::Error>;

    /// Release the connection's underlying resources. Must be idempotent at
    /// the resource level; the pool may report but never retries a failure.
    async fn close_conn(&self, conn: Self::Conn) -> Result<(), Self::Error>;

    /// Cheap liveness probe, run before every hand-off of a pooled
    /// connection. Fail closed: if the probe itself errors, report `true`
    /// so the pool discards the connection instead of handing it out.
    async fn is_stale(&self, conn: &mut Self::Conn) -> bool;
}
