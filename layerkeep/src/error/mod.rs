//! Error taxonomy and recovery.
//!
//! Every failure in the engine is expressed as a [`LayerError`], whose
//! [`ErrorKind`] selects a fixed [`RecoveryStrategy`]:
//!
//! | Kind                                    | Strategy                     |
//! |-----------------------------------------|------------------------------|
//! | `LAYER_NOT_FOUND`                       | add missing layer, no retry  |
//! | `SOURCE_NOT_FOUND`, `DEPENDENCY_MISSING`| add missing source/dependency|
//! | `SURFACE_NOT_READY`                     | retry after 100ms            |
//! | `OPERATION_TIMEOUT`                     | retry after 500ms            |
//! | `INVALID_STATE`, `QUEUE_FULL`           | fail, no recovery            |
//!
//! Raw surface failures are normalized by [`ErrorHandler::classify`]; the
//! handler is also the one place where failures are logged.

mod classify;
mod handler;

pub use handler::{
    ErrorContext, ErrorHandler, HandledError, RecoveryStrategy, RecoveryTarget,
    OPERATION_TIMEOUT_RETRY_DELAY_MS, SURFACE_NOT_READY_RETRY_DELAY_MS,
};

use std::fmt;

use thiserror::Error;

/// Result type for engine operations.
pub type LayerResult<T> = Result<T, LayerError>;

/// Fixed failure taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    LayerNotFound,
    SourceNotFound,
    DependencyMissing,
    SurfaceNotReady,
    OperationTimeout,
    InvalidState,
    QueueFull,
}

impl ErrorKind {
    /// Upper-case code used in logs and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::LayerNotFound => "LAYER_NOT_FOUND",
            ErrorKind::SourceNotFound => "SOURCE_NOT_FOUND",
            ErrorKind::DependencyMissing => "DEPENDENCY_MISSING",
            ErrorKind::SurfaceNotReady => "SURFACE_NOT_READY",
            ErrorKind::OperationTimeout => "OPERATION_TIMEOUT",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::QueueFull => "QUEUE_FULL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors produced by the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerError {
    /// The layer is not registered or not present on the surface.
    #[error("layer '{layer_id}' not found")]
    LayerNotFound { layer_id: String },

    /// The source is not registered or not present on the surface.
    #[error("source '{source_id}' not found")]
    SourceNotFound { source_id: String },

    /// A layer the target depends on is missing.
    #[error("layer '{layer_id}' is missing dependency '{dependency}'")]
    DependencyMissing { layer_id: String, dependency: String },

    /// The surface is not accepting mutations yet.
    #[error("surface is not ready")]
    SurfaceNotReady,

    /// The operation did not complete in time.
    #[error("operation timed out after {elapsed_ms}ms")]
    OperationTimeout { elapsed_ms: u64 },

    /// Anything the engine cannot recover from.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The operation queue is at capacity.
    #[error("operation queue is full ({capacity} operations pending)")]
    QueueFull { capacity: usize },
}

impl LayerError {
    pub fn layer_not_found(layer_id: impl Into<String>) -> Self {
        LayerError::LayerNotFound {
            layer_id: layer_id.into(),
        }
    }

    pub fn source_not_found(source_id: impl Into<String>) -> Self {
        LayerError::SourceNotFound {
            source_id: source_id.into(),
        }
    }

    pub fn dependency_missing(layer_id: impl Into<String>, dependency: impl Into<String>) -> Self {
        LayerError::DependencyMissing {
            layer_id: layer_id.into(),
            dependency: dependency.into(),
        }
    }

    /// Taxonomy entry of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LayerError::LayerNotFound { .. } => ErrorKind::LayerNotFound,
            LayerError::SourceNotFound { .. } => ErrorKind::SourceNotFound,
            LayerError::DependencyMissing { .. } => ErrorKind::DependencyMissing,
            LayerError::SurfaceNotReady => ErrorKind::SurfaceNotReady,
            LayerError::OperationTimeout { .. } => ErrorKind::OperationTimeout,
            LayerError::InvalidState(_) => ErrorKind::InvalidState,
            LayerError::QueueFull { .. } => ErrorKind::QueueFull,
        }
    }

    /// A critical error ends the current drain pass.
    ///
    /// Losing the surface mid-drain means every remaining operation would
    /// fail the same way.
    pub fn is_critical(&self) -> bool {
        matches!(self, LayerError::SurfaceNotReady)
    }
}
