//! Metrics collection and export for connection pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time metrics snapshot for a pool
///
/// # Examples
///
/// ```
/// use esox_connpool::PoolMetrics;
///
/// let metrics = PoolMetrics {
///     total_gets: 10,
///     total_puts: 9,
///     total_created: 3,
///     total_closed: 1,
///     stale_evicted: 1,
///     reaped_total: 0,
///     creation_failures: 0,
///     acquire_timeouts: 0,
///     idle_conns: 1,
///     active_conns: 2,
///     pool_size: 3,
///     limit_pool_size: 8,
///     utilization: 0.25,
/// };
///
/// let exported = metrics.export();
/// assert_eq!(exported["total_gets"], "10");
/// assert_eq!(exported["utilization"], "0.25");
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolMetrics {
    /// Connections handed to callers
    pub total_gets: u64,

    /// Connections returned to the idle list
    pub total_puts: u64,

    /// Connections opened by the factory
    pub total_created: u64,

    /// Connections closed (staleness, reaping, explicit close, shutdown)
    pub total_closed: u64,

    /// Idle connections discarded because the liveness probe failed
    pub stale_evicted: u64,

    /// Idle connections evicted by the reaper
    pub reaped_total: u64,

    /// Factory failures while opening a connection
    pub creation_failures: u64,

    /// `get` calls that timed out waiting for a slot
    pub acquire_timeouts: u64,

    /// Idle connections at snapshot time
    pub idle_conns: usize,

    /// Checked-out connections at snapshot time
    pub active_conns: usize,

    /// Live connections at snapshot time
    pub pool_size: usize,

    /// Configured connection limit
    pub limit_pool_size: usize,

    /// Active share of the limit (0.0 to 1.0)
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a string map
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_gets".to_string(), self.total_gets.to_string());
        metrics.insert("total_puts".to_string(), self.total_puts.to_string());
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_closed".to_string(), self.total_closed.to_string());
        metrics.insert("stale_evicted".to_string(), self.stale_evicted.to_string());
        metrics.insert("reaped_total".to_string(), self.reaped_total.to_string());
        metrics.insert(
            "creation_failures".to_string(),
            self.creation_failures.to_string(),
        );
        metrics.insert(
            "acquire_timeouts".to_string(),
            self.acquire_timeouts.to_string(),
        );
        metrics.insert("idle_conns".to_string(), self.idle_conns.to_string());
        metrics.insert("active_conns".to_string(), self.active_conns.to_string());
        metrics.insert("pool_size".to_string(), self.pool_size.to_string());
        metrics.insert(
            "limit_pool_size".to_string(),
            self.limit_pool_size.to_string(),
        );
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Exporter for the Prometheus text exposition format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Render a metrics snapshot in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connpool::{MetricsExporter, PoolMetrics};
    /// use std::collections::HashMap;
    ///
    /// let metrics = PoolMetrics {
    ///     total_gets: 10, total_puts: 9, total_created: 3, total_closed: 1,
    ///     stale_evicted: 1, reaped_total: 0, creation_failures: 0,
    ///     acquire_timeouts: 0, idle_conns: 1, active_conns: 2,
    ///     pool_size: 3, limit_pool_size: 8, utilization: 0.25,
    /// };
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&metrics, "redis_main", Some(&tags));
    /// assert!(output.contains("connpool_conns_active"));
    /// assert!(output.contains("pool=\"redis_main\""));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let labels = Self::format_labels(pool_name, tags);
        let mut output = String::new();

        let gauges: [(&str, &str, String); 4] = [
            ("connpool_conns_idle", "Idle connections", metrics.idle_conns.to_string()),
            ("connpool_conns_active", "Checked-out connections", metrics.active_conns.to_string()),
            ("connpool_conns_live", "Live connections", metrics.pool_size.to_string()),
            ("connpool_utilization", "Active share of the limit", format!("{:.2}", metrics.utilization)),
        ];
        for (name, help, value) in &gauges {
            Self::write_metric(&mut output, name, "gauge", help, &labels, value);
        }

        let counters: [(&str, &str, u64); 8] = [
            ("connpool_gets_total", "Connections handed to callers", metrics.total_gets),
            ("connpool_puts_total", "Connections returned", metrics.total_puts),
            ("connpool_conns_created_total", "Connections opened", metrics.total_created),
            ("connpool_conns_closed_total", "Connections closed", metrics.total_closed),
            ("connpool_stale_evicted_total", "Probe-failed evictions", metrics.stale_evicted),
            ("connpool_reaped_total", "Reaper evictions", metrics.reaped_total),
            ("connpool_create_failures_total", "Factory failures", metrics.creation_failures),
            ("connpool_acquire_timeouts_total", "Admission timeouts", metrics.acquire_timeouts),
        ];
        for (name, help, value) in &counters {
            Self::write_metric(&mut output, name, "counter", help, &labels, &value.to_string());
        }

        output
    }

    fn write_metric(out: &mut String, name: &str, kind: &str, help: &str, labels: &str, value: &str) {
        out.push_str(&format!("# HELP {name} {help}\n"));
        out.push_str(&format!("# TYPE {name} {kind}\n"));
        out.push_str(&format!("{name}{{{labels}}} {value}\n"));
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal counter set, shared by every pool handle
pub(crate) struct MetricsTracker {
    pub(crate) total_gets: AtomicU64,
    pub(crate) total_puts: AtomicU64,
    pub(crate) total_created: AtomicU64,
    pub(crate) total_closed: AtomicU64,
    pub(crate) stale_evicted: AtomicU64,
    pub(crate) reaped_total: AtomicU64,
    pub(crate) creation_failures: AtomicU64,
    pub(crate) acquire_timeouts: AtomicU64,
}

impl MetricsTracker {
    pub(crate) fn new() -> Self {
        Self {
            total_gets: AtomicU64::new(0),
            total_puts: AtomicU64::new(0),
            total_created: AtomicU64::new(0),
            total_closed: AtomicU64::new(0),
            stale_evicted: AtomicU64::new(0),
            reaped_total: AtomicU64::new(0),
            creation_failures: AtomicU64::new(0),
            acquire_timeouts: AtomicU64::new(0),
        }
    }

    pub(crate) fn snapshot(
        &self,
        idle: usize,
        active: usize,
        pool_size: usize,
        limit: usize,
    ) -> PoolMetrics {
        let utilization = if limit > 0 {
            active as f64 / limit as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_gets: self.total_gets.load(Ordering::Relaxed),
            total_puts: self.total_puts.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_closed: self.total_closed.load(Ordering::Relaxed),
            stale_evicted: self.stale_evicted.load(Ordering::Relaxed),
            reaped_total: self.reaped_total.load(Ordering::Relaxed),
            creation_failures: self.creation_failures.load(Ordering::Relaxed),
            acquire_timeouts: self.acquire_timeouts.load(Ordering::Relaxed),
            idle_conns: idle,
            active_conns: active,
            pool_size,
            limit_pool_size: limit,
            utilization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_computes_utilization() {
        let tracker = MetricsTracker::new();
        tracker.total_gets.store(4, Ordering::Relaxed);
        let metrics = tracker.snapshot(1, 2, 3, 8);
        assert_eq!(metrics.total_gets, 4);
        assert_eq!(metrics.idle_conns, 1);
        assert_eq!(metrics.active_conns, 2);
        assert!((metrics.utilization - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn prometheus_output_has_every_series() {
        let metrics = MetricsTracker::new().snapshot(0, 0, 0, 4);
        let output = MetricsExporter::export_prometheus(&metrics, "p", None);
        for name in [
            "connpool_conns_idle",
            "connpool_conns_active",
            "connpool_conns_live",
            "connpool_utilization",
            "connpool_gets_total",
            "connpool_puts_total",
            "connpool_conns_created_total",
            "connpool_conns_closed_total",
            "connpool_stale_evicted_total",
            "connpool_reaped_total",
            "connpool_create_failures_total",
            "connpool_acquire_timeouts_total",
        ] {
            assert!(output.contains(name), "missing {name}");
        }
        assert!(output.contains("pool=\"p\""));
    }
}
