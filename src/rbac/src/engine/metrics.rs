//! Prometheus metrics for authorization decisions

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Authorizer metrics snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineMetrics {
    /// Total number of `can` calls that produced a decision
    pub total_checks: u64,

    /// Number of allowed decisions
    pub allowed_decisions: u64,

    /// Number of denied decisions
    pub denied_decisions: u64,

    /// Grants created (idempotent repeats are not counted)
    pub grants_created: u64,

    /// Grants removed (revokes of missing grants are not counted)
    pub grants_revoked: u64,

    /// Resolver cache hits
    pub cache_hits: u64,

    /// Resolver cache misses
    pub cache_misses: u64,

    /// Latency percentiles
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p99_ms: f64,

    /// Average latency
    pub avg_latency_ms: f64,

    /// Checks that failed with an error
    pub error_count: u64,
}

impl EngineMetrics {
    /// Calculate cache hit rate
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Calculate allow rate
    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed_decisions + self.denied_decisions;
        if total == 0 {
            0.0
        } else {
            self.allowed_decisions as f64 / total as f64
        }
    }

    /// Render in Prometheus text format
    pub fn to_prometheus(&self) -> String {
        format!(
            r#"# HELP rbac_checks_total Total number of permission checks
# TYPE rbac_checks_total counter
rbac_checks_total {}

# HELP rbac_allowed_total Number of allowed decisions
# TYPE rbac_allowed_total counter
rbac_allowed_total {}

# HELP rbac_denied_total Number of denied decisions
# TYPE rbac_denied_total counter
rbac_denied_total {}

# HELP rbac_grants_created_total Grants created
# TYPE rbac_grants_created_total counter
rbac_grants_created_total {}

# HELP rbac_grants_revoked_total Grants revoked
# TYPE rbac_grants_revoked_total counter
rbac_grants_revoked_total {}

# HELP rbac_cache_hits_total Resolver cache hits
# TYPE rbac_cache_hits_total counter
rbac_cache_hits_total {}

# HELP rbac_cache_misses_total Resolver cache misses
# TYPE rbac_cache_misses_total counter
rbac_cache_misses_total {}

# HELP rbac_check_latency_seconds Check latency percentiles
# TYPE rbac_check_latency_seconds summary
rbac_check_latency_seconds{{quantile="0.5"}} {}
rbac_check_latency_seconds{{quantile="0.9"}} {}
rbac_check_latency_seconds{{quantile="0.99"}} {}

# HELP rbac_errors_total Checks that failed with an error
# TYPE rbac_errors_total counter
rbac_errors_total {}
"#,
            self.total_checks,
            self.allowed_decisions,
            self.denied_decisions,
            self.grants_created,
            self.grants_revoked,
            self.cache_hits,
            self.cache_misses,
            self.latency_p50_ms / 1000.0,
            self.latency_p90_ms / 1000.0,
            self.latency_p99_ms / 1000.0,
            self.error_count,
        )
    }
}

/// Metrics collector with Prometheus-compatible storage
pub struct MetricsCollector {
    /// Metrics data
    metrics: Arc<RwLock<EngineMetrics>>,

    /// Latency samples for percentile calculation
    latency_samples: Arc<RwLock<Vec<f64>>>,

    /// Maximum samples to keep
    max_samples: usize,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
            latency_samples: Arc::new(RwLock::new(Vec::with_capacity(10_000))),
            max_samples: 10_000,
        }
    }

    /// Record a permission decision and its latency
    pub async fn record_decision(&self, allowed: bool, latency: Duration) {
        {
            let mut metrics = self.metrics.write().await;
            metrics.total_checks += 1;
            if allowed {
                metrics.allowed_decisions += 1;
            } else {
                metrics.denied_decisions += 1;
            }
        }
        self.record_latency(latency).await;
    }

    /// Record a grant mutation that changed state
    pub async fn record_grant(&self, created: bool) {
        let mut metrics = self.metrics.write().await;
        if created {
            metrics.grants_created += 1;
        } else {
            metrics.grants_revoked += 1;
        }
    }

    /// Record an error
    pub async fn record_error(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.error_count += 1;
    }

    async fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut samples = self.latency_samples.write().await;
        samples.push(latency_ms);

        // Keep only recent samples
        if samples.len() > self.max_samples {
            samples.drain(0..1_000);
        }

        let mut sorted = samples.clone();
        sorted.sort_by(f64::total_cmp);

        let mut metrics = self.metrics.write().await;
        metrics.avg_latency_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
        metrics.latency_p50_ms = Self::percentile(&sorted, 0.50);
        metrics.latency_p90_ms = Self::percentile(&sorted, 0.90);
        metrics.latency_p99_ms = Self::percentile(&sorted, 0.99);
    }

    /// Get current metrics snapshot
    pub async fn get_metrics(&self) -> EngineMetrics {
        self.metrics.read().await.clone()
    }

    /// Reset all metrics
    pub async fn reset(&self) {
        *self.metrics.write().await = EngineMetrics::default();
        self.latency_samples.write().await.clear();
    }

    /// Export metrics in Prometheus format
    pub async fn export_prometheus(&self) -> String {
        self.get_metrics().await.to_prometheus()
    }

    /// Percentile from sorted data
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
