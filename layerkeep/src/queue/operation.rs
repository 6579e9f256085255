//! Surface operations and their outcomes.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::error::LayerError;

/// Coarse operation class; selects queue priority and metric names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Add,
    Show,
    Hide,
    Update,
    Remove,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Add => "add",
            OperationKind::Show => "show",
            OperationKind::Hide => "hide",
            OperationKind::Update => "update",
            OperationKind::Remove => "remove",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single mutation against the surface.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    /// Realize a registered layer, initially shown or hidden.
    AddLayer { layer_id: String, visible: bool },
    /// Realize a registered source.
    AddSource { source_id: String },
    Show { layer_id: String },
    Hide { layer_id: String },
    /// Set an arbitrary layout property.
    Update {
        layer_id: String,
        property: String,
        value: Value,
    },
    Remove { layer_id: String },
}

impl Operation {
    pub fn show(layer_id: impl Into<String>) -> Self {
        Operation::Show {
            layer_id: layer_id.into(),
        }
    }

    pub fn hide(layer_id: impl Into<String>) -> Self {
        Operation::Hide {
            layer_id: layer_id.into(),
        }
    }

    /// Show or hide depending on `visible`.
    pub fn set_visibility(layer_id: impl Into<String>, visible: bool) -> Self {
        if visible {
            Self::show(layer_id)
        } else {
            Self::hide(layer_id)
        }
    }

    pub fn add_layer(layer_id: impl Into<String>, visible: bool) -> Self {
        Operation::AddLayer {
            layer_id: layer_id.into(),
            visible,
        }
    }

    pub fn add_source(source_id: impl Into<String>) -> Self {
        Operation::AddSource {
            source_id: source_id.into(),
        }
    }

    pub fn update(layer_id: impl Into<String>, property: impl Into<String>, value: Value) -> Self {
        Operation::Update {
            layer_id: layer_id.into(),
            property: property.into(),
            value,
        }
    }

    pub fn remove(layer_id: impl Into<String>) -> Self {
        Operation::Remove {
            layer_id: layer_id.into(),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::AddLayer { .. } | Operation::AddSource { .. } => OperationKind::Add,
            Operation::Show { .. } => OperationKind::Show,
            Operation::Hide { .. } => OperationKind::Hide,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Remove { .. } => OperationKind::Remove,
        }
    }

    /// Layer or source id the operation acts on.
    pub fn target_id(&self) -> &str {
        match self {
            Operation::AddSource { source_id } => source_id,
            Operation::AddLayer { layer_id, .. }
            | Operation::Show { layer_id }
            | Operation::Hide { layer_id }
            | Operation::Update { layer_id, .. }
            | Operation::Remove { layer_id } => layer_id,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::AddSource { source_id } => write!(f, "add source '{}'", source_id),
            Operation::AddLayer { layer_id, .. } => write!(f, "add layer '{}'", layer_id),
            Operation::Update {
                layer_id, property, ..
            } => write!(f, "update '{}'.{}", layer_id, property),
            other => write!(f, "{} '{}'", other.kind(), other.target_id()),
        }
    }
}

/// Queue-assigned operation identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub(crate) u64);

impl OperationId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// What an executed operation did to the surface.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// False when the surface already matched and nothing was mutated.
    pub changed: bool,
    pub warning: Option<String>,
}

impl ExecutionReport {
    /// The surface was mutated.
    pub fn applied() -> Self {
        Self {
            changed: true,
            warning: None,
        }
    }

    /// Nothing needed doing.
    pub fn skipped(warning: impl Into<String>) -> Self {
        Self {
            changed: false,
            warning: Some(warning.into()),
        }
    }
}

/// Final fate of a queued operation.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationOutcome {
    Committed(ExecutionReport),
    /// Gave up after `attempts` executions.
    Failed { error: LayerError, attempts: u32 },
    /// Sat in the queue longer than the operation timeout.
    Evicted { waited: Duration },
    /// Removed by `cancel`/`clear`, or the queue went away.
    Cancelled,
}

impl OperationOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, OperationOutcome::Committed(_))
    }

    pub fn into_result(self) -> Result<ExecutionReport, LayerError> {
        match self {
            OperationOutcome::Committed(report) => Ok(report),
            OperationOutcome::Failed { error, .. } => Err(error),
            OperationOutcome::Evicted { waited } => Err(LayerError::OperationTimeout {
                elapsed_ms: waited.as_millis() as u64,
            }),
            OperationOutcome::Cancelled => {
                Err(LayerError::InvalidState("operation was cancelled".to_string()))
            }
        }
    }
}
