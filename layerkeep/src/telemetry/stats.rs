//! Metric records and aggregate snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Final status of a timed operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetricStatus {
    Success,
    Failed(Option<String>),
}

impl MetricStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, MetricStatus::Success)
    }
}

/// A completed, timed operation.
#[derive(Clone, Debug)]
pub struct OperationMetric {
    /// Operation type (`show`, `add`, `set_visibility`, ...).
    pub operation_type: String,
    /// Layer or source the operation targeted.
    pub layer_id: String,
    pub started: Instant,
    pub ended: Instant,
    pub duration: Duration,
    pub status: MetricStatus,
    /// Wall-clock time the operation finished.
    pub recorded_at: DateTime<Utc>,
}

impl OperationMetric {
    /// Returns true if the operation exceeded `threshold`.
    pub fn is_slow(&self, threshold: Duration) -> bool {
        self.duration > threshold
    }
}

/// Aggregates for one operation type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeStats {
    pub count: usize,
    pub successful: usize,
    pub failed: usize,
    pub average_duration: Duration,
    pub slow_count: usize,
}

/// Point-in-time aggregate of all retained metrics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PerformanceStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub average_duration: Duration,
    pub slow_operations: usize,
    /// Operations started but not yet ended.
    pub in_flight: usize,
    pub by_type: BTreeMap<String, TypeStats>,
}

impl PerformanceStats {
    /// Builds aggregates from a set of metrics.
    pub(crate) fn from_metrics<'a>(
        metrics: impl IntoIterator<Item = &'a OperationMetric>,
        slow_threshold: Duration,
        in_flight: usize,
    ) -> Self {
        let mut stats = PerformanceStats {
            in_flight,
            ..Default::default()
        };
        let mut total_duration = Duration::ZERO;
        let mut type_durations: BTreeMap<String, Duration> = BTreeMap::new();

        for metric in metrics {
            let success = metric.status.is_success();
            let slow = metric.is_slow(slow_threshold);

            stats.total += 1;
            total_duration += metric.duration;
            if success {
                stats.successful += 1;
            } else {
                stats.failed += 1;
            }
            if slow {
                stats.slow_operations += 1;
            }

            let entry = stats
                .by_type
                .entry(metric.operation_type.clone())
                .or_default();
            entry.count += 1;
            if success {
                entry.successful += 1;
            } else {
                entry.failed += 1;
            }
            if slow {
                entry.slow_count += 1;
            }
            *type_durations
                .entry(metric.operation_type.clone())
                .or_default() += metric.duration;
        }

        if stats.total > 0 {
            stats.average_duration = total_duration / stats.total as u32;
        }
        for (op_type, entry) in stats.by_type.iter_mut() {
            if let Some(sum) = type_durations.get(op_type) {
                entry.average_duration = *sum / entry.count as u32;
            }
        }
        stats
    }

    /// Fraction of operations that succeeded (1.0 when empty).
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.successful as f64 / self.total as f64
        }
    }
}

impl fmt::Display for PerformanceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} operations ({} ok, {} failed, {} slow), avg {:.1}ms",
            self.total,
            self.successful,
            self.failed,
            self.slow_operations,
            self.average_duration.as_secs_f64() * 1000.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(op: &str, millis: u64, success: bool) -> OperationMetric {
        let started = Instant::now();
        let duration = Duration::from_millis(millis);
        OperationMetric {
            operation_type: op.to_string(),
            layer_id: "a".to_string(),
            started,
            ended: started + duration,
            duration,
            status: if success {
                MetricStatus::Success
            } else {
                MetricStatus::Failed(None)
            },
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_aggregates_by_type() {
        let metrics = vec![
            metric("show", 10, true),
            metric("show", 30, false),
            metric("add", 200, true),
        ];
        let stats = PerformanceStats::from_metrics(&metrics, Duration::from_millis(100), 0);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.slow_operations, 1);
        assert_eq!(stats.average_duration, Duration::from_millis(80));

        let show = &stats.by_type["show"];
        assert_eq!(show.count, 2);
        assert_eq!(show.average_duration, Duration::from_millis(20));
        assert_eq!(stats.by_type["add"].slow_count, 1);
    }

    #[test]
    fn test_empty_stats() {
        let stats = PerformanceStats::from_metrics(std::iter::empty(), Duration::from_millis(100), 2);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.in_flight, 2);
        assert_eq!(stats.success_rate(), 1.0);
    }
}
