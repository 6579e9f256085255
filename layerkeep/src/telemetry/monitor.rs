//! The performance monitor.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;

use super::stats::{MetricStatus, OperationMetric, PerformanceStats};

/// Default threshold above which an operation counts as slow (100ms).
pub const DEFAULT_SLOW_OPERATION_THRESHOLD_MS: u64 = 100;

/// Configuration for the performance monitor.
#[derive(Clone, Debug, PartialEq)]
pub struct PerformanceConfig {
    /// Operations taking longer than this are flagged slow.
    ///
    /// Default: 100ms.
    pub slow_operation_threshold: Duration,

    /// When false, start/end calls record nothing.
    ///
    /// Default: true.
    pub enable_metrics: bool,

    /// Log a warning for each slow operation.
    ///
    /// Default: true.
    pub log_slow_operations: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            slow_operation_threshold: Duration::from_millis(DEFAULT_SLOW_OPERATION_THRESHOLD_MS),
            enable_metrics: true,
            log_slow_operations: true,
        }
    }
}

/// Opaque handle returned by [`PerformanceMonitor::start_operation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MetricId(u64);

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "metric-{}", self.0)
    }
}

#[derive(Debug)]
struct ActiveOperation {
    operation_type: String,
    layer_id: String,
    started: Instant,
}

#[derive(Debug, Default)]
struct MonitorInner {
    active: HashMap<MetricId, ActiveOperation>,
    completed: Vec<OperationMetric>,
}

/// Times operations and aggregates the results.
///
/// Thread-safe; shared between the queue executor and the orchestrator.
pub struct PerformanceMonitor {
    config: PerformanceConfig,
    next_id: AtomicU64,
    inner: Mutex<MonitorInner>,
}

impl fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PerformanceMonitor")
            .field("config", &self.config)
            .field("active", &inner.active.len())
            .field("completed", &inner.completed.len())
            .finish()
    }
}

impl PerformanceMonitor {
    pub fn new(config: PerformanceConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(0),
            inner: Mutex::new(MonitorInner::default()),
        }
    }

    pub fn config(&self) -> &PerformanceConfig {
        &self.config
    }

    /// Records the start of an operation.
    pub fn start_operation(&self, operation_type: &str, layer_id: &str) -> MetricId {
        let id = MetricId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if self.config.enable_metrics {
            self.inner.lock().active.insert(
                id,
                ActiveOperation {
                    operation_type: operation_type.to_string(),
                    layer_id: layer_id.to_string(),
                    started: Instant::now(),
                },
            );
        }
        id
    }

    /// Records the end of an operation and returns its duration.
    ///
    /// Returns `None` for unknown ids or when metrics are disabled.
    pub fn end_operation(&self, id: MetricId, success: bool, error: Option<&str>) -> Option<Duration> {
        if !self.config.enable_metrics {
            return None;
        }

        let mut inner = self.inner.lock();
        let Some(active) = inner.active.remove(&id) else {
            tracing::debug!(metric = %id, "end_operation for unknown metric");
            return None;
        };

        let ended = Instant::now();
        let duration = ended.duration_since(active.started);
        let status = if success {
            MetricStatus::Success
        } else {
            MetricStatus::Failed(error.map(str::to_string))
        };

        if self.config.log_slow_operations && duration > self.config.slow_operation_threshold {
            tracing::warn!(
                operation = %active.operation_type,
                layer_id = %active.layer_id,
                duration_ms = duration.as_millis() as u64,
                threshold_ms = self.config.slow_operation_threshold.as_millis() as u64,
                "Slow layer operation"
            );
        }

        inner.completed.push(OperationMetric {
            operation_type: active.operation_type,
            layer_id: active.layer_id,
            started: active.started,
            ended,
            duration,
            status,
            recorded_at: Utc::now(),
        });
        Some(duration)
    }

    /// Aggregates over all retained metrics.
    pub fn stats(&self) -> PerformanceStats {
        let inner = self.inner.lock();
        PerformanceStats::from_metrics(
            &inner.completed,
            self.config.slow_operation_threshold,
            inner.active.len(),
        )
    }

    /// Drops completed metrics that ended more than `max_age` ago.
    ///
    /// Returns the number of metrics removed.
    pub fn clear_old_metrics(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let before = inner.completed.len();
        inner
            .completed
            .retain(|m| now.duration_since(m.ended) <= max_age);
        let removed = before - inner.completed.len();
        if removed > 0 {
            tracing::debug!(removed, "Cleared old operation metrics");
        }
        removed
    }

    /// Number of retained completed metrics.
    pub fn metric_count(&self) -> usize {
        self.inner.lock().completed.len()
    }

    /// The `n` most recent metrics, newest last.
    pub fn recent_metrics(&self, n: usize) -> Vec<OperationMetric> {
        let inner = self.inner.lock();
        let skip = inner.completed.len().saturating_sub(n);
        inner.completed[skip..].to_vec()
    }

    /// All retained metrics above the slow threshold.
    pub fn slow_operations(&self) -> Vec<OperationMetric> {
        let threshold = self.config.slow_operation_threshold;
        self.inner
            .lock()
            .completed
            .iter()
            .filter(|m| m.is_slow(threshold))
            .cloned()
            .collect()
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(PerformanceConfig::default())
    }
}
