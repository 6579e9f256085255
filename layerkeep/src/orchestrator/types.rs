//! Orchestrator request and result types.

use std::fmt;

use crate::error::LayerError;

/// Where a visibility operation is in its lifecycle.
///
/// ```text
/// Initiated → DependencyCheck → Queued → Executing → Committed
///                                             │
///                                             └→ Failed → Recovery → Committed | Failed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationPhase {
    Initiated,
    DependencyCheck,
    Queued,
    Executing,
    Committed,
    Failed,
    Recovery,
}

impl OperationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationPhase::Initiated => "initiated",
            OperationPhase::DependencyCheck => "dependency_check",
            OperationPhase::Queued => "queued",
            OperationPhase::Executing => "executing",
            OperationPhase::Committed => "committed",
            OperationPhase::Failed => "failed",
            OperationPhase::Recovery => "recovery",
        }
    }

    /// Returns true for the two final phases.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationPhase::Committed | OperationPhase::Failed)
    }
}

impl fmt::Display for OperationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single-layer orchestrator call.
///
/// `success == false` means the call had no effect on the believed state.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerOperationResult {
    pub success: bool,
    /// Layer (or source, for `add_source`) the call targeted.
    pub layer_id: String,
    pub error: Option<LayerError>,
    /// Whether calling again later might succeed.
    pub can_retry: bool,
    pub warnings: Vec<String>,
    /// False when the surface already matched and nothing was mutated.
    pub changed: bool,
    /// Final lifecycle phase.
    pub phase: OperationPhase,
}

impl LayerOperationResult {
    pub(crate) fn committed(layer_id: &str, changed: bool, warnings: Vec<String>) -> Self {
        Self {
            success: true,
            layer_id: layer_id.to_string(),
            error: None,
            can_retry: false,
            warnings,
            changed,
            phase: OperationPhase::Committed,
        }
    }

    pub(crate) fn failed(layer_id: &str, error: LayerError, can_retry: bool) -> Self {
        Self {
            success: false,
            layer_id: layer_id.to_string(),
            error: Some(error),
            can_retry,
            warnings: Vec::new(),
            changed: false,
            phase: OperationPhase::Failed,
        }
    }
}

/// One requested visibility change in a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisibilityChange {
    pub layer_id: String,
    pub visible: bool,
}

impl VisibilityChange {
    pub fn new(layer_id: impl Into<String>, visible: bool) -> Self {
        Self {
            layer_id: layer_id.into(),
            visible,
        }
    }

    pub fn show(layer_id: impl Into<String>) -> Self {
        Self::new(layer_id, true)
    }

    pub fn hide(layer_id: impl Into<String>) -> Self {
        Self::new(layer_id, false)
    }
}

/// Batch behavior switches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Disable drag-pan and scroll-zoom while the batch runs.
    pub ultra_fast: bool,
}

/// Counts over a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Number of warnings across all results.
    pub warnings: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} succeeded, {} failed, {} warnings",
            self.successful, self.total, self.failed, self.warnings
        )
    }
}

/// Result of a batch of visibility changes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchResult {
    /// True when every change succeeded.
    pub success: bool,
    /// Per-change results: shows first, then hides.
    pub results: Vec<LayerOperationResult>,
    pub summary: BatchSummary,
}

impl BatchResult {
    pub(crate) fn from_results(results: Vec<LayerOperationResult>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        let summary = BatchSummary {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            warnings: results.iter().map(|r| r.warnings.len()).sum(),
        };
        Self {
            success: summary.failed == 0,
            results,
            summary,
        }
    }

    /// Results that failed.
    pub fn failures(&self) -> impl Iterator<Item = &LayerOperationResult> {
        self.results.iter().filter(|r| !r.success)
    }
}
