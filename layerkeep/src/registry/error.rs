//! Registry errors and catalog issues.

use std::fmt;

use thiserror::Error;

use crate::validator::Severity;

/// Errors raised while registering descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A required field is empty.
    #[error("{entity} '{id}' is missing required field '{field}'")]
    MissingField {
        entity: &'static str,
        id: String,
        field: &'static str,
    },

    /// The id is already registered.
    #[error("{entity} '{id}' is already registered")]
    Duplicate { entity: &'static str, id: String },

    /// A layer references a source that is not registered.
    #[error("layer '{layer_id}' references unknown source '{source_id}'")]
    UnknownSource { layer_id: String, source_id: String },

    /// A layer depends on a layer that is not registered.
    #[error("layer '{layer_id}' depends on unknown layer '{dependency}'")]
    UnknownDependency { layer_id: String, dependency: String },

    /// Registering the layer would close a dependency cycle.
    #[error("dependency cycle: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    /// A tiled source has neither tiles nor url.
    #[error("source '{id}' has no tiles or url")]
    MissingLocation { id: String },

    /// Strict mode rejected something that would otherwise only warn.
    #[error("strict mode: {0}")]
    Strict(String),
}

/// One finding of [`super::LayerRegistry::validate_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryIssue {
    pub severity: Severity,
    /// Layer or source id the issue is about.
    pub id: String,
    pub message: String,
}

impl RegistryIssue {
    pub(crate) fn error(id: impl Into<String>, error: &RegistryError) -> Self {
        Self {
            severity: Severity::Error,
            id: id.into(),
            message: error.to_string(),
        }
    }

    pub(crate) fn warning(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for RegistryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.id, self.message)
    }
}
