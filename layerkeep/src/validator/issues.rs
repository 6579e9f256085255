//! Validation findings and the fixes planned from them.

use std::fmt;

use crate::queue::Operation;
use crate::types::Visibility;

/// How serious a finding is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of drift between believed and actual surface state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IssueKind {
    /// A surface layer whose source is gone.
    OrphanedLayer,
    /// A desired-visible registered layer is absent from the surface.
    MissingLayer,
    /// A source needed by a desired-visible layer is absent.
    MissingSource,
    /// Layout visibility on the surface disagrees with the desired one.
    InconsistentVisibility,
}

impl IssueKind {
    pub fn severity(&self) -> Severity {
        match self {
            IssueKind::OrphanedLayer | IssueKind::MissingSource => Severity::Error,
            IssueKind::MissingLayer | IssueKind::InconsistentVisibility => Severity::Warning,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::OrphanedLayer => "orphaned_layer",
            IssueKind::MissingLayer => "missing_layer",
            IssueKind::MissingSource => "missing_source",
            IssueKind::InconsistentVisibility => "inconsistent_visibility",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One drift finding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    /// Ids involved; the first is the layer or source to act on.
    pub ids: Vec<String>,
    /// Visibility the layer should have (inconsistent visibility only).
    pub expected: Option<Visibility>,
}

impl ValidationIssue {
    pub(crate) fn orphaned_layer(layer_id: &str, source_id: &str) -> Self {
        Self::new(
            IssueKind::OrphanedLayer,
            format!(
                "layer '{}' is on the surface but its source '{}' is not",
                layer_id, source_id
            ),
            vec![layer_id.to_string(), source_id.to_string()],
        )
    }

    pub(crate) fn missing_layer(layer_id: &str) -> Self {
        Self::new(
            IssueKind::MissingLayer,
            format!("layer '{}' should be visible but is not on the surface", layer_id),
            vec![layer_id.to_string()],
        )
    }

    pub(crate) fn missing_source(source_id: &str, layer_id: &str) -> Self {
        Self::new(
            IssueKind::MissingSource,
            format!(
                "source '{}' required by layer '{}' is not on the surface",
                source_id, layer_id
            ),
            vec![source_id.to_string(), layer_id.to_string()],
        )
    }

    pub(crate) fn inconsistent_visibility(
        layer_id: &str,
        expected: Visibility,
        actual: Visibility,
    ) -> Self {
        let mut issue = Self::new(
            IssueKind::InconsistentVisibility,
            format!(
                "layer '{}' should be {} but the surface has it {}",
                layer_id, expected, actual
            ),
            vec![layer_id.to_string()],
        );
        issue.expected = Some(expected);
        issue
    }

    fn new(kind: IssueKind, message: String, ids: Vec<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message,
            ids,
            expected: None,
        }
    }

    /// The layer or source this issue is about.
    pub fn subject(&self) -> &str {
        self.ids.first().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.kind, self.message)
    }
}

/// A repair planned from a validation issue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FixOperation {
    RemoveLayer { layer_id: String },
    AddSource { source_id: String },
    AddLayer { layer_id: String, visible: bool },
    SetVisibility { layer_id: String, visible: bool },
}

impl FixOperation {
    /// Position in the repair order: remove, add-source, add-layer,
    /// set-visibility.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            FixOperation::RemoveLayer { .. } => 0,
            FixOperation::AddSource { .. } => 1,
            FixOperation::AddLayer { .. } => 2,
            FixOperation::SetVisibility { .. } => 3,
        }
    }

    /// Queue operation that performs this fix.
    pub fn to_operation(&self) -> Operation {
        match self {
            FixOperation::RemoveLayer { layer_id } => Operation::remove(layer_id.clone()),
            FixOperation::AddSource { source_id } => Operation::add_source(source_id.clone()),
            FixOperation::AddLayer { layer_id, visible } => {
                Operation::add_layer(layer_id.clone(), *visible)
            }
            FixOperation::SetVisibility { layer_id, visible } => {
                Operation::set_visibility(layer_id.clone(), *visible)
            }
        }
    }
}

impl fmt::Display for FixOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixOperation::RemoveLayer { layer_id } => write!(f, "remove layer '{}'", layer_id),
            FixOperation::AddSource { source_id } => write!(f, "add source '{}'", source_id),
            FixOperation::AddLayer { layer_id, .. } => write!(f, "add layer '{}'", layer_id),
            FixOperation::SetVisibility { layer_id, visible } => write!(
                f,
                "set '{}' {}",
                layer_id,
                Visibility::from_flag(*visible)
            ),
        }
    }
}

/// Result of [`super::StateValidator::auto_fix`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AutoFixResult {
    /// True when every planned fix was applied.
    pub success: bool,
    /// Fixes that were applied, in order.
    pub fixes: Vec<FixOperation>,
    /// One message per fix that failed.
    pub errors: Vec<String>,
}
