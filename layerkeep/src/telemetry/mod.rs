//! Operation timing for observability.
//!
//! Every surface mutation and every logical visibility operation is timed.
//! Slow operations are logged as warnings; aggregates are available as a
//! point-in-time [`PerformanceStats`] snapshot.
//!
//! # Architecture
//!
//! ```text
//! Queue / Orchestrator ─────► PerformanceMonitor ─────► PerformanceStats ─────► Views
//!   start/end_operation       (retained metrics)       (snapshot by type)      (CLI, etc.)
//! ```
//!
//! Completed metrics are kept until [`PerformanceMonitor::clear_old_metrics`]
//! is called; nothing prunes them automatically.
//!
//! # Example
//!
//! ```
//! use layerkeep::telemetry::{PerformanceConfig, PerformanceMonitor};
//!
//! let monitor = PerformanceMonitor::new(PerformanceConfig::default());
//! let id = monitor.start_operation("show", "zones-fill");
//! monitor.end_operation(id, true, None);
//!
//! let stats = monitor.stats();
//! assert_eq!(stats.total, 1);
//! assert_eq!(stats.by_type["show"].successful, 1);
//! ```

mod monitor;
mod stats;

pub use monitor::{
    MetricId, PerformanceConfig, PerformanceMonitor, DEFAULT_SLOW_OPERATION_THRESHOLD_MS,
};
pub use stats::{MetricStatus, OperationMetric, PerformanceStats, TypeStats};
