//! Error handler: classification, strategy table and recovery execution.

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;

use super::classify::classify_message;
use super::{ErrorKind, LayerError};
use crate::queue::OperationKind;
use crate::surface::SurfaceError;

/// Retry delay when the surface was not ready.
pub const SURFACE_NOT_READY_RETRY_DELAY_MS: u64 = 100;

/// Retry delay after a timeout.
pub const OPERATION_TIMEOUT_RETRY_DELAY_MS: u64 = 500;

/// What to do about a failure of a given kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Realize the missing layer, then the caller may retry once.
    AddMissingLayer,
    /// Realize the missing source, then the caller may retry once.
    AddMissingSource,
    /// Realize the missing dependency layer, then the caller may retry once.
    AddMissingDependency,
    /// Transient: retry the same operation after `delay`.
    Retry { delay: Duration },
    /// Nothing sensible can be done.
    Fail,
}

impl RecoveryStrategy {
    /// The fixed strategy table.
    pub fn for_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::LayerNotFound => RecoveryStrategy::AddMissingLayer,
            ErrorKind::SourceNotFound => RecoveryStrategy::AddMissingSource,
            ErrorKind::DependencyMissing => RecoveryStrategy::AddMissingDependency,
            ErrorKind::SurfaceNotReady => RecoveryStrategy::Retry {
                delay: Duration::from_millis(SURFACE_NOT_READY_RETRY_DELAY_MS),
            },
            ErrorKind::OperationTimeout => RecoveryStrategy::Retry {
                delay: Duration::from_millis(OPERATION_TIMEOUT_RETRY_DELAY_MS),
            },
            ErrorKind::InvalidState | ErrorKind::QueueFull => RecoveryStrategy::Fail,
        }
    }

    /// Retry delay for transient strategies.
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            RecoveryStrategy::Retry { delay } => Some(*delay),
            _ => None,
        }
    }
}

/// Where a failure happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorContext {
    /// Kind of operation that failed.
    pub operation: OperationKind,
    /// Layer (or source) the operation targeted.
    pub target_id: String,
    /// How many attempts were made, including the failing one.
    pub attempts: u32,
}

impl ErrorContext {
    pub fn new(operation: OperationKind, target_id: impl Into<String>) -> Self {
        Self {
            operation,
            target_id: target_id.into(),
            attempts: 1,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' (attempt {})",
            self.operation, self.target_id, self.attempts
        )
    }
}

/// Normalized outcome of [`ErrorHandler::handle_error`].
#[derive(Clone, Debug, PartialEq)]
pub struct HandledError {
    /// True when recovery repaired the cause and the operation may be
    /// retried once.
    pub success: bool,
    /// Target of the failed operation.
    pub layer_id: String,
    /// The normalized error.
    pub error: LayerError,
    /// Strategy that was applied.
    pub strategy: RecoveryStrategy,
    /// Whether retrying the operation is sensible.
    pub can_retry: bool,
    /// Suggested wait before a retry.
    pub retry_after: Option<Duration>,
}

/// Performs the repair half of a recovery strategy.
///
/// Implemented by the orchestrator, which owns the knowledge of how to
/// realize catalog entries on the surface.
pub trait RecoveryTarget: Send + Sync {
    /// Realizes a registered layer (and what it needs) on the surface.
    fn add_missing_layer<'a>(&'a self, layer_id: &'a str) -> BoxFuture<'a, Result<(), LayerError>>;

    /// Realizes a registered source on the surface.
    fn add_missing_source<'a>(
        &'a self,
        source_id: &'a str,
    ) -> BoxFuture<'a, Result<(), LayerError>>;
}

/// Classifies failures and executes recovery strategies.
#[derive(Debug, Default)]
pub struct ErrorHandler;

impl ErrorHandler {
    pub fn new() -> Self {
        Self
    }

    /// Normalizes a surface failure.
    ///
    /// `target_id` is the layer or source the failing call was about.
    pub fn classify(&self, error: &SurfaceError, target_id: &str) -> LayerError {
        match error {
            SurfaceError::StyleNotLoaded => LayerError::SurfaceNotReady,
            SurfaceError::LayerNotFound(id) => LayerError::layer_not_found(id.clone()),
            SurfaceError::SourceNotFound(id) => LayerError::source_not_found(id.clone()),
            SurfaceError::Message(message) => classify_message(message, target_id),
        }
    }

    /// Strategy for an error.
    pub fn strategy_for(&self, error: &LayerError) -> RecoveryStrategy {
        RecoveryStrategy::for_kind(error.kind())
    }

    /// Logs the failure and executes its recovery strategy.
    pub async fn handle_error(
        &self,
        error: LayerError,
        context: &ErrorContext,
        target: &dyn RecoveryTarget,
    ) -> HandledError {
        let strategy = self.strategy_for(&error);

        tracing::error!(
            kind = %error.kind(),
            operation = %context.operation,
            target_id = %context.target_id,
            attempts = context.attempts,
            strategy = ?strategy,
            "Layer operation failed: {}",
            error
        );

        let repair = match (&strategy, &error) {
            (RecoveryStrategy::AddMissingLayer, LayerError::LayerNotFound { layer_id }) => {
                Some(target.add_missing_layer(layer_id).await)
            }
            (RecoveryStrategy::AddMissingSource, LayerError::SourceNotFound { source_id }) => {
                Some(target.add_missing_source(source_id).await)
            }
            (
                RecoveryStrategy::AddMissingDependency,
                LayerError::DependencyMissing { dependency, .. },
            ) => Some(target.add_missing_layer(dependency).await),
            _ => None,
        };

        match repair {
            Some(Ok(())) => {
                tracing::info!(
                    target_id = %context.target_id,
                    strategy = ?strategy,
                    "Recovered from {}",
                    error.kind()
                );
                HandledError {
                    success: true,
                    layer_id: context.target_id.clone(),
                    error,
                    strategy,
                    can_retry: true,
                    retry_after: None,
                }
            }
            Some(Err(repair_error)) => {
                tracing::error!(
                    target_id = %context.target_id,
                    strategy = ?strategy,
                    "Recovery failed: {}",
                    repair_error
                );
                HandledError {
                    success: false,
                    layer_id: context.target_id.clone(),
                    error,
                    strategy,
                    can_retry: false,
                    retry_after: None,
                }
            }
            None => HandledError {
                success: false,
                layer_id: context.target_id.clone(),
                error,
                strategy,
                can_retry: strategy.retry_delay().is_some(),
                retry_after: strategy.retry_delay(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTarget {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecoveryTarget for RecordingTarget {
        fn add_missing_layer<'a>(
            &'a self,
            layer_id: &'a str,
        ) -> BoxFuture<'a, Result<(), LayerError>> {
            async move {
                self.calls.lock().push(format!("layer:{}", layer_id));
                if self.fail {
                    Err(LayerError::InvalidState("nope".to_string()))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }

        fn add_missing_source<'a>(
            &'a self,
            source_id: &'a str,
        ) -> BoxFuture<'a, Result<(), LayerError>> {
            async move {
                self.calls.lock().push(format!("source:{}", source_id));
                Ok(())
            }
            .boxed()
        }
    }

    #[test]
    fn test_strategy_table() {
        assert_eq!(
            RecoveryStrategy::for_kind(ErrorKind::LayerNotFound),
            RecoveryStrategy::AddMissingLayer
        );
        assert_eq!(
            RecoveryStrategy::for_kind(ErrorKind::SurfaceNotReady).retry_delay(),
            Some(Duration::from_millis(100))
        );
        assert_eq!(
            RecoveryStrategy::for_kind(ErrorKind::OperationTimeout).retry_delay(),
            Some(Duration::from_millis(500))
        );
        assert_eq!(
            RecoveryStrategy::for_kind(ErrorKind::InvalidState),
            RecoveryStrategy::Fail
        );
        assert_eq!(
            RecoveryStrategy::for_kind(ErrorKind::QueueFull),
            RecoveryStrategy::Fail
        );
    }

    #[test]
    fn test_classify_structured_errors() {
        let handler = ErrorHandler::new();
        assert_eq!(
            handler.classify(&SurfaceError::StyleNotLoaded, "a"),
            LayerError::SurfaceNotReady
        );
        assert_eq!(
            handler.classify(&SurfaceError::SourceNotFound("s".into()), "a"),
            LayerError::source_not_found("s")
        );
    }

    #[tokio::test]
    async fn test_missing_source_is_added() {
        let handler = ErrorHandler::new();
        let target = RecordingTarget::default();
        let context = ErrorContext::new(OperationKind::Show, "zones-fill");

        let handled = handler
            .handle_error(LayerError::source_not_found("zones"), &context, &target)
            .await;

        assert!(handled.success);
        assert!(handled.can_retry);
        assert_eq!(handled.layer_id, "zones-fill");
        assert_eq!(*target.calls.lock(), vec!["source:zones".to_string()]);
    }

    #[tokio::test]
    async fn test_dependency_adds_dependency_layer() {
        let handler = ErrorHandler::new();
        let target = RecordingTarget::default();
        let context = ErrorContext::new(OperationKind::Add, "labels");

        handler
            .handle_error(
                LayerError::dependency_missing("labels", "roads"),
                &context,
                &target,
            )
            .await;

        assert_eq!(*target.calls.lock(), vec!["layer:roads".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_repair_cannot_retry() {
        let handler = ErrorHandler::new();
        let target = RecordingTarget {
            fail: true,
            ..Default::default()
        };
        let context = ErrorContext::new(OperationKind::Show, "a");

        let handled = handler
            .handle_error(LayerError::layer_not_found("a"), &context, &target)
            .await;

        assert!(!handled.success);
        assert!(!handled.can_retry);
    }

    #[tokio::test]
    async fn test_transient_error_reports_retry_after() {
        let handler = ErrorHandler::new();
        let target = RecordingTarget::default();
        let context = ErrorContext::new(OperationKind::Hide, "a").with_attempts(4);

        let handled = handler
            .handle_error(LayerError::OperationTimeout { elapsed_ms: 10 }, &context, &target)
            .await;

        assert!(!handled.success);
        assert!(handled.can_retry);
        assert_eq!(handled.retry_after, Some(Duration::from_millis(500)));
        assert!(target.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_state_fails() {
        let handler = ErrorHandler::new();
        let target = RecordingTarget::default();
        let context = ErrorContext::new(OperationKind::Remove, "a");

        let handled = handler
            .handle_error(LayerError::InvalidState("boom".into()), &context, &target)
            .await;

        assert_eq!(handled.strategy, RecoveryStrategy::Fail);
        assert!(!handled.can_retry);
    }
}
