//! Health snapshots for connection pools

/// Health status of a connection pool
///
/// # Examples
///
/// ```
/// use esox_connpool::HealthStatus;
///
/// let health = HealthStatus::new(2, 1, 3, 8);
/// assert!(health.is_healthy());
/// assert_eq!(health.idle_conns, 2);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Active share of the connection limit (0.0 to 1.0)
    pub utilization: f64,

    /// Idle connections
    pub idle_conns: usize,

    /// Checked-out connections
    pub active_conns: usize,

    /// Live connections
    pub pool_size: usize,

    /// Configured connection limit
    pub limit_pool_size: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Derive a health status from live counts
    pub fn new(idle: usize, active: usize, pool_size: usize, limit: usize) -> Self {
        let utilization = if limit > 0 {
            active as f64 / limit as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if idle == 0 && limit > 0 && active >= limit {
            warnings.push("Pool exhausted: no idle connections and no free slots".to_string());
        }

        Self {
            is_healthy,
            utilization,
            idle_conns: idle,
            active_conns: active,
            pool_size,
            limit_pool_size: limit,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
