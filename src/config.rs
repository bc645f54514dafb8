//! Pool configuration options

use std::time::Duration;

/// Configuration for pool behavior
///
/// # Examples
///
/// ```
/// use esox_connpool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::new()
///     .with_limit_pool_size(10)
///     .with_min_idle_conns(3)
///     .with_acquire_timeout(Duration::from_secs(2));
///
/// assert_eq!(config.limit_pool_size, 10);
/// assert_eq!(config.min_idle_conns, 3);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfig {
    /// Number of idle connections the pool keeps warm. Replenishment tops the
    /// idle list back up to this count, and the reaper never cuts below it.
    /// Zero disables replenishment entirely.
    pub min_idle_conns: usize,

    /// Maximum number of connections that may be live (idle, checked out, or
    /// mid-creation) at any instant.
    pub limit_pool_size: usize,

    /// Idle age beyond which the reaper evicts a connection.
    pub idle_timeout: Duration,

    /// How long a caller waits for a pool slot before `get` fails.
    pub acquire_timeout: Duration,

    /// Period of the background reaper task. `None` means no task is spawned;
    /// reaping can still be driven manually.
    pub reap_frequency: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_idle_conns: 0,
            limit_pool_size: 8,
            idle_timeout: Duration::from_secs(240),
            acquire_timeout: Duration::from_secs(1),
            reap_frequency: None,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle-connection floor
    pub fn with_min_idle_conns(mut self, count: usize) -> Self {
        self.min_idle_conns = count;
        self
    }

    /// Set the maximum number of live connections
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connpool::PoolConfig;
    ///
    /// let config = PoolConfig::new().with_limit_pool_size(50);
    /// assert_eq!(config.limit_pool_size, 50);
    /// ```
    pub fn with_limit_pool_size(mut self, size: usize) -> Self {
        self.limit_pool_size = size;
        self
    }

    /// Set the idle age at which connections become eligible for reaping
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the admission wait bound for `get`
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Spawn a background reaper with the given period
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connpool::PoolConfig;
    /// use std::time::Duration;
    ///
    /// let config = PoolConfig::new().with_reaper(Duration::from_secs(30));
    /// assert_eq!(config.reap_frequency, Some(Duration::from_secs(30)));
    /// ```
    pub fn with_reaper(mut self, frequency: Duration) -> Self {
        self.reap_frequency = Some(frequency);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.min_idle_conns, 0);
        assert_eq!(config.limit_pool_size, 8);
        assert_eq!(config.idle_timeout, Duration::from_secs(240));
        assert_eq!(config.acquire_timeout, Duration::from_secs(1));
        assert!(config.reap_frequency.is_none());
    }

    #[test]
    fn builder_chains() {
        let config = PoolConfig::new()
            .with_min_idle_conns(2)
            .with_limit_pool_size(3)
            .with_idle_timeout(Duration::from_millis(100))
            .with_acquire_timeout(Duration::from_millis(250))
            .with_reaper(Duration::from_millis(50));
        assert_eq!(config.min_idle_conns, 2);
        assert_eq!(config.limit_pool_size, 3);
        assert_eq!(config.idle_timeout, Duration::from_millis(100));
        assert_eq!(config.acquire_timeout, Duration::from_millis(250));
        assert_eq!(config.reap_frequency, Some(Duration::from_millis(50)));
    }
}
