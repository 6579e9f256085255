//! The layer orchestrator.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::RwLock;

use super::types::{
    BatchOptions, BatchResult, LayerOperationResult, OperationPhase, VisibilityChange,
};
use crate::config::EngineConfig;
use crate::error::{
    ErrorContext, ErrorHandler, LayerError, LayerResult, RecoveryStrategy, RecoveryTarget,
};
use crate::queue::{
    DrainReport, ExecutionReport, Operation, OperationKind, OperationQueue, QueueStatus,
    SurfaceExecutor,
};
use crate::registry::LayerRegistry;
use crate::state::LayerState;
use crate::surface::{Interaction, MapSurface};
use crate::telemetry::{PerformanceMonitor, PerformanceStats};
use crate::types::Visibility;
use crate::validator::{AutoFixResult, FixOperation, StateValidator, ValidationIssue};

/// Disables map interactions while alive.
struct InteractionGuard<'a> {
    surface: &'a dyn MapSurface,
}

impl<'a> InteractionGuard<'a> {
    fn disable(surface: &'a dyn MapSurface) -> Self {
        for interaction in Interaction::ALL {
            surface.set_interaction(interaction, false);
        }
        Self { surface }
    }
}

impl Drop for InteractionGuard<'_> {
    fn drop(&mut self) {
        for interaction in Interaction::ALL {
            self.surface.set_interaction(interaction, true);
        }
    }
}

/// Facade over the reconciliation engine.
///
/// Owns the believed [`LayerState`] and is the only writer to it. All
/// surface mutations go through the operation queue.
pub struct LayerOrchestrator {
    registry: Arc<LayerRegistry>,
    surface: Arc<dyn MapSurface>,
    queue: Arc<OperationQueue>,
    errors: Arc<ErrorHandler>,
    monitor: Arc<PerformanceMonitor>,
    validator: StateValidator,
    state: RwLock<LayerState>,
}

impl fmt::Debug for LayerOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerOrchestrator")
            .field("registry", &self.registry)
            .field("queue", &self.queue)
            .field("state", &*self.state.read())
            .finish()
    }
}

impl LayerOrchestrator {
    /// Wires the engine around a surface.
    ///
    /// The queue starts out ready if the surface style is already loaded.
    pub fn new(registry: LayerRegistry, surface: Arc<dyn MapSurface>, config: &EngineConfig) -> Self {
        let registry = Arc::new(registry);
        let errors = Arc::new(ErrorHandler::new());
        let monitor = Arc::new(PerformanceMonitor::new(config.performance.clone()));
        let executor = SurfaceExecutor::new(
            registry.clone(),
            surface.clone(),
            errors.clone(),
            monitor.clone(),
        );
        let queue = Arc::new(OperationQueue::new(config.queue.clone(), Arc::new(executor)));
        queue.publish_ready(surface.is_style_loaded());
        let validator = StateValidator::new(registry.clone(), surface.clone(), queue.clone());

        tracing::info!(
            layers = registry.layer_count(),
            sources = registry.source_count(),
            "Layer orchestrator ready"
        );

        Self {
            registry,
            surface,
            queue,
            errors,
            monitor,
            validator,
            state: RwLock::new(LayerState::new()),
        }
    }

    pub fn registry(&self) -> &LayerRegistry {
        &self.registry
    }

    pub fn surface(&self) -> &Arc<dyn MapSurface> {
        &self.surface
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Snapshot of the believed state.
    pub fn state(&self) -> LayerState {
        self.state.read().clone()
    }

    pub(crate) fn update_state(&self, update: impl FnOnce(&mut LayerState)) {
        update(&mut self.state.write());
    }

    /// Desired visibility: the belief when there is one, else the
    /// descriptor's flag.
    fn desired_visibility(&self, layer_id: &str) -> bool {
        self.state
            .read()
            .believed_visibility(layer_id)
            .or_else(|| self.registry.get_layer(layer_id).map(|l| l.visible))
            .unwrap_or(false)
    }

    fn advance(&self, layer_id: &str, phase: &mut OperationPhase, next: OperationPhase) {
        tracing::debug!(layer_id, from = %phase, to = %next, "Operation phase");
        *phase = next;
    }

    // =========================================================================
    // Visibility
    // =========================================================================

    /// Shows or hides a registered layer.
    ///
    /// Missing dependencies and sources are provisioned first and the layer
    /// is added (hidden) if absent. Does nothing when the surface already
    /// shows the requested visibility. Recoverable failures are repaired and
    /// the operation retried once.
    pub async fn set_layer_visibility(&self, layer_id: &str, visible: bool) -> LayerOperationResult {
        let metric = self.monitor.start_operation("set_visibility", layer_id);
        let result = self.apply_visibility(layer_id, visible).await;
        let error = result.error.as_ref().map(ToString::to_string);
        self.monitor
            .end_operation(metric, result.success, error.as_deref());
        result
    }

    async fn apply_visibility(&self, layer_id: &str, visible: bool) -> LayerOperationResult {
        let kind = if visible {
            OperationKind::Show
        } else {
            OperationKind::Hide
        };
        let mut phase = OperationPhase::Initiated;

        if !self.registry.has_layer(layer_id) {
            let handled = self
                .errors
                .handle_error(
                    LayerError::layer_not_found(layer_id),
                    &ErrorContext::new(kind, layer_id),
                    self,
                )
                .await;
            return LayerOperationResult::failed(layer_id, handled.error, false);
        }

        if !visible && !self.surface.has_layer(layer_id) {
            self.state.write().set_visibility(layer_id, false);
            return LayerOperationResult::committed(
                layer_id,
                false,
                vec![format!("layer '{}' is not on the surface", layer_id)],
            );
        }

        let mut attempts = 1;
        loop {
            match self.realize_visibility(layer_id, visible, &mut phase).await {
                Ok(report) => {
                    self.advance(layer_id, &mut phase, OperationPhase::Committed);
                    self.state.write().set_visibility(layer_id, visible);
                    let mut result =
                        LayerOperationResult::committed(layer_id, report.changed, Vec::new());
                    result.warnings.extend(report.warning);
                    return result;
                }
                Err(error) if attempts == 1 => {
                    self.advance(layer_id, &mut phase, OperationPhase::Failed);
                    self.advance(layer_id, &mut phase, OperationPhase::Recovery);
                    let context = ErrorContext::new(kind, layer_id).with_attempts(attempts);
                    let handled = self.errors.handle_error(error, &context, self).await;
                    if !handled.success {
                        self.advance(layer_id, &mut phase, OperationPhase::Failed);
                        return LayerOperationResult::failed(
                            layer_id,
                            handled.error,
                            handled.can_retry,
                        );
                    }
                    attempts += 1;
                }
                Err(error) => {
                    self.advance(layer_id, &mut phase, OperationPhase::Failed);
                    tracing::warn!(
                        layer_id,
                        attempts,
                        "Visibility change failed after recovery: {}",
                        error
                    );
                    let can_retry = RecoveryStrategy::for_kind(error.kind())
                        .retry_delay()
                        .is_some();
                    return LayerOperationResult::failed(layer_id, error, can_retry);
                }
            }
        }
    }

    async fn realize_visibility(
        &self,
        layer_id: &str,
        visible: bool,
        phase: &mut OperationPhase,
    ) -> LayerResult<ExecutionReport> {
        self.advance(layer_id, phase, OperationPhase::DependencyCheck);
        if !self.surface.has_layer(layer_id) {
            self.ensure_layer(layer_id, false, &mut HashSet::new())
                .await?;
        }

        let target = Visibility::from_flag(visible);
        if self.surface.visibility(layer_id) == Some(target) {
            tracing::trace!(layer_id, visibility = %target, "Surface already matches");
            return Ok(ExecutionReport::default());
        }

        let ticket = self
            .queue
            .enqueue(Operation::set_visibility(layer_id, visible))?;
        self.advance(layer_id, phase, OperationPhase::Queued);
        self.advance(layer_id, phase, OperationPhase::Executing);
        self.queue.complete(ticket).await
    }

    /// Makes sure a layer and everything it needs is on the surface.
    ///
    /// `visited` guards against dependency cycles.
    fn ensure_layer<'a>(
        &'a self,
        layer_id: &'a str,
        initially_visible: bool,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, LayerResult<()>> {
        async move {
            if self.surface.has_layer(layer_id) {
                return Ok(());
            }
            if !visited.insert(layer_id.to_string()) {
                return Err(LayerError::InvalidState(format!(
                    "dependency cycle through layer '{}'",
                    layer_id
                )));
            }
            let descriptor = self
                .registry
                .get_layer(layer_id)
                .ok_or_else(|| LayerError::layer_not_found(layer_id))?;

            for dependency in &descriptor.dependencies {
                let visible = self.desired_visibility(dependency);
                self.ensure_layer(dependency, visible, &mut *visited).await?;
                if visible {
                    self.state.write().set_visibility(dependency, true);
                }
            }
            for source_id in descriptor.all_sources() {
                self.ensure_source(source_id).await?;
            }

            self.queue
                .submit(Operation::add_layer(layer_id, initially_visible))
                .await?;
            tracing::debug!(layer_id, "Layer added");
            Ok(())
        }
        .boxed()
    }

    async fn ensure_source(&self, source_id: &str) -> LayerResult<()> {
        if !self.surface.has_source(source_id) {
            if !self.registry.has_source(source_id) {
                return Err(LayerError::source_not_found(source_id));
            }
            self.queue.submit(Operation::add_source(source_id)).await?;
            tracing::debug!(source_id, "Source added");
        }
        self.state.write().mark_source_active(source_id);
        Ok(())
    }

    /// Applies many visibility changes.
    ///
    /// All shows run first, then all hides; each group runs concurrently.
    /// With `ultra_fast`, drag-pan and scroll-zoom are disabled for the
    /// duration and re-enabled however the batch ends.
    pub async fn batch_set_layer_visibility(
        &self,
        changes: &[VisibilityChange],
        options: BatchOptions,
    ) -> BatchResult {
        let _guard = options
            .ultra_fast
            .then(|| InteractionGuard::disable(self.surface.as_ref()));

        let (shows, hides): (Vec<&VisibilityChange>, Vec<&VisibilityChange>) =
            changes.iter().partition(|c| c.visible);

        let mut results = join_all(
            shows
                .iter()
                .map(|c| self.set_layer_visibility(&c.layer_id, true)),
        )
        .await;
        results.extend(
            join_all(
                hides
                    .iter()
                    .map(|c| self.set_layer_visibility(&c.layer_id, false)),
            )
            .await,
        );

        let batch = BatchResult::from_results(results);
        tracing::info!(summary = %batch.summary, ultra_fast = options.ultra_fast, "Batch applied");
        batch
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// Adds a registered layer (and what it needs) with its desired
    /// visibility. Succeeds with a warning if it is already present.
    pub async fn add_layer(&self, layer_id: &str) -> LayerOperationResult {
        if self.surface.has_layer(layer_id) {
            return LayerOperationResult::committed(
                layer_id,
                false,
                vec![format!("layer '{}' already exists", layer_id)],
            );
        }
        let visible = self.desired_visibility(layer_id);
        let added = self
            .with_recovery(OperationKind::Add, layer_id, || {
                async move { self.ensure_layer(layer_id, visible, &mut HashSet::new()).await }
                    .boxed()
            })
            .await;
        match added {
            Ok(()) => {
                self.state.write().set_visibility(layer_id, visible);
                LayerOperationResult::committed(layer_id, true, Vec::new())
            }
            Err(failed) => failed,
        }
    }

    /// Adds a registered source. Succeeds with a warning if it is already
    /// present.
    pub async fn add_source(&self, source_id: &str) -> LayerOperationResult {
        if self.surface.has_source(source_id) {
            self.state.write().mark_source_active(source_id);
            return LayerOperationResult::committed(
                source_id,
                false,
                vec![format!("source '{}' already exists", source_id)],
            );
        }
        let added = self
            .with_recovery(OperationKind::Add, source_id, || {
                self.ensure_source(source_id).boxed()
            })
            .await;
        match added {
            Ok(()) => LayerOperationResult::committed(source_id, true, Vec::new()),
            Err(failed) => failed,
        }
    }

    /// Removes a layer. Succeeds with a warning if it is not present.
    pub async fn remove_layer(&self, layer_id: &str) -> LayerOperationResult {
        if !self.surface.has_layer(layer_id) {
            self.state.write().forget_layer(layer_id);
            return LayerOperationResult::committed(
                layer_id,
                false,
                vec![format!("layer '{}' is not on the surface", layer_id)],
            );
        }

        let mut warnings = Vec::new();
        let dependents: Vec<&str> = self
            .registry
            .dependent_layers(layer_id)
            .into_iter()
            .filter(|l| self.surface.has_layer(&l.id))
            .map(|l| l.id.as_str())
            .collect();
        if !dependents.is_empty() {
            warnings.push(format!(
                "layers still depending on '{}': {}",
                layer_id,
                dependents.join(", ")
            ));
        }

        let removed = self
            .with_recovery(OperationKind::Remove, layer_id, || {
                self.queue.submit(Operation::remove(layer_id)).boxed()
            })
            .await;
        match removed {
            Ok(_) => {
                self.state.write().forget_layer(layer_id);
                LayerOperationResult::committed(layer_id, true, warnings)
            }
            Err(failed) => failed,
        }
    }

    /// Runs a structural operation; on failure hands the error to the
    /// handler and, if it repaired the cause, runs the operation once more.
    async fn with_recovery<'a, T, F>(
        &'a self,
        kind: OperationKind,
        target_id: &'a str,
        mut attempt: F,
    ) -> Result<T, LayerOperationResult>
    where
        F: FnMut() -> BoxFuture<'a, LayerResult<T>>,
    {
        let mut attempts = 1;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(error) if attempts == 1 => {
                    let context = ErrorContext::new(kind, target_id).with_attempts(attempts);
                    let handled = self.errors.handle_error(error, &context, self).await;
                    if !handled.success {
                        return Err(LayerOperationResult::failed(
                            target_id,
                            handled.error,
                            handled.can_retry,
                        ));
                    }
                    attempts += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        target_id,
                        operation = %kind,
                        attempts,
                        "Operation failed after recovery: {}",
                        error
                    );
                    let can_retry = RecoveryStrategy::for_kind(error.kind())
                        .retry_delay()
                        .is_some();
                    return Err(LayerOperationResult::failed(target_id, error, can_retry));
                }
            }
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Compares believed state with the surface.
    pub fn validate_state(&self) -> Vec<ValidationIssue> {
        self.validator.validate_map_state(&self.state())
    }

    pub fn can_auto_fix(&self, issues: &[ValidationIssue]) -> bool {
        self.validator.can_auto_fix(issues)
    }

    /// Repairs drift and reconciles the believed state with what was fixed.
    ///
    /// Missing sources and layers are provisioned the same way a visibility
    /// change would, dependencies included. Beliefs about registered layers
    /// are never dropped.
    pub async fn auto_fix(&self, issues: &[ValidationIssue]) -> AutoFixResult {
        let result = self.validator.auto_fix(issues, self).await;
        let mut state = self.state.write();
        for fix in &result.fixes {
            match fix {
                FixOperation::RemoveLayer { layer_id } => {
                    if !self.registry.has_layer(layer_id) {
                        state.forget_layer(layer_id);
                    }
                }
                FixOperation::AddSource { source_id } => state.mark_source_active(source_id),
                FixOperation::AddLayer { layer_id, visible }
                | FixOperation::SetVisibility { layer_id, visible } => {
                    state.set_visibility(layer_id, *visible)
                }
            }
        }
        result
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub fn performance_stats(&self) -> PerformanceStats {
        self.monitor.stats()
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    /// Forwards the surface's "style loaded" event; drains pending work.
    pub async fn on_style_loaded(&self) -> DrainReport {
        self.queue.set_surface_ready(true).await
    }

    /// Forwards the surface's "style unloaded" event; pauses the queue.
    pub fn on_style_unloaded(&self) {
        self.queue.publish_ready(false);
    }
}

impl RecoveryTarget for LayerOrchestrator {
    fn add_missing_layer<'a>(&'a self, layer_id: &'a str) -> BoxFuture<'a, Result<(), LayerError>> {
        async move {
            let visible = self.desired_visibility(layer_id);
            let mut visited = HashSet::new();
            self.ensure_layer(layer_id, visible, &mut visited).await
        }
        .boxed()
    }

    fn add_missing_source<'a>(
        &'a self,
        source_id: &'a str,
    ) -> BoxFuture<'a, Result<(), LayerError>> {
        self.ensure_source(source_id).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryConfig;
    use crate::surface::{InMemorySurface, SurfaceError, SurfaceMutation};
    use crate::types::{LayerCategory, LayerDescriptor, SourceDescriptor, VISIBILITY_PROPERTY};
    use serde_json::json;

    fn registry() -> LayerRegistry {
        let mut registry = LayerRegistry::new(RegistryConfig::default());
        registry
            .register_source(SourceDescriptor::geojson("zones", json!({})))
            .unwrap();
        registry
            .register_source(SourceDescriptor::vector("roads", "https://tiles.example/roads.json"))
            .unwrap();
        registry
            .register_layer(
                LayerDescriptor::new("zones-fill", "Zones", LayerCategory::Zones).with_source("zones"),
            )
            .unwrap();
        registry
            .register_layer(
                LayerDescriptor::new("roads", "Roads", LayerCategory::Base).with_source("roads"),
            )
            .unwrap();
        registry
            .register_layer(
                LayerDescriptor::new("road-labels", "Road labels", LayerCategory::Overlay)
                    .with_source("roads")
                    .with_dependency("roads"),
            )
            .unwrap();
        registry
    }

    fn orchestrator() -> (Arc<InMemorySurface>, LayerOrchestrator) {
        let surface = Arc::new(InMemorySurface::loaded());
        let orchestrator =
            LayerOrchestrator::new(registry(), surface.clone(), &EngineConfig::default());
        (surface, orchestrator)
    }

    #[tokio::test]
    async fn test_show_provisions_source_then_layer() {
        let (surface, orchestrator) = orchestrator();

        let result = orchestrator.set_layer_visibility("zones-fill", true).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.phase, OperationPhase::Committed);
        assert_eq!(
            surface.mutations(),
            vec![
                SurfaceMutation::AddSource("zones".into()),
                SurfaceMutation::AddLayer("zones-fill".into()),
                SurfaceMutation::SetLayout {
                    layer_id: "zones-fill".into(),
                    key: VISIBILITY_PROPERTY.into(),
                    value: json!("visible"),
                },
            ]
        );
        let state = orchestrator.state();
        assert!(state.is_visible("zones-fill"));
        assert!(state.active_sources.contains("zones"));
    }

    #[tokio::test]
    async fn test_show_is_idempotent() {
        let (surface, orchestrator) = orchestrator();
        orchestrator.set_layer_visibility("zones-fill", true).await;
        let second = orchestrator.set_layer_visibility("zones-fill", true).await;

        assert!(second.success);
        assert!(!second.changed);
        assert_eq!(surface.visibility_writes("zones-fill"), 1);
    }

    #[tokio::test]
    async fn test_dependencies_added_first() {
        let (surface, orchestrator) = orchestrator();
        let result = orchestrator.set_layer_visibility("road-labels", true).await;
        assert!(result.success);

        let added: Vec<String> = surface
            .mutations()
            .into_iter()
            .filter_map(|m| match m {
                SurfaceMutation::AddLayer(id) => Some(id),
                _ => None,
            })
            .collect();
        assert_eq!(added, vec!["roads", "road-labels"]);
        assert_eq!(surface.visibility("roads"), Some(Visibility::None));
    }

    #[tokio::test]
    async fn test_unregistered_layer_fails() {
        let (surface, orchestrator) = orchestrator();
        let result = orchestrator.set_layer_visibility("ghost", true).await;

        assert!(!result.success);
        assert_eq!(result.error, Some(LayerError::layer_not_found("ghost")));
        assert_eq!(surface.mutation_count(), 0);
        assert_eq!(orchestrator.state(), LayerState::new());
    }

    #[tokio::test]
    async fn test_hide_absent_layer_warns() {
        let (surface, orchestrator) = orchestrator();
        let result = orchestrator.set_layer_visibility("zones-fill", false).await;
        assert!(result.success);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(surface.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_reprovisions_after_style_reset() {
        let (surface, orchestrator) = orchestrator();
        orchestrator.set_layer_visibility("zones-fill", true).await;
        orchestrator.set_layer_visibility("zones-fill", false).await;

        // The style reloaded behind our back
        surface.drop_layer("zones-fill");
        surface.drop_source("zones");

        let result = orchestrator.set_layer_visibility("zones-fill", true).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(surface.visibility("zones-fill"), Some(Visibility::Visible));
    }

    #[tokio::test]
    async fn test_surface_failure_reported() {
        let (surface, orchestrator) = orchestrator();
        orchestrator.add_layer("zones-fill").await;
        surface.fail_on(
            "zones-fill",
            SurfaceError::Message("WebGL context lost".into()),
            2,
        );

        let result = orchestrator.set_layer_visibility("zones-fill", true).await;
        assert!(!result.success);
        assert!(matches!(result.error, Some(LayerError::InvalidState(_))));
        assert!(!result.can_retry);
        assert!(!orchestrator.state().is_visible("zones-fill"));
        assert_eq!(orchestrator.performance_stats().by_type["set_visibility"].failed, 1);
    }

    #[tokio::test]
    async fn test_batch_ultra_fast_restores_interactions() {
        let (surface, orchestrator) = orchestrator();
        let changes = vec![
            VisibilityChange::show("zones-fill"),
            VisibilityChange::hide("roads"),
            VisibilityChange::show("ghost"),
        ];

        let batch = orchestrator
            .batch_set_layer_visibility(&changes, BatchOptions { ultra_fast: true })
            .await;

        assert_eq!(batch.summary.total, 3);
        assert_eq!(batch.summary.successful, 2);
        assert_eq!(batch.summary.failed, 1);
        assert!(!batch.success);
        assert!(surface.interaction_enabled(Interaction::DragPan));
        assert!(surface.interaction_enabled(Interaction::ScrollZoom));
    }

    #[tokio::test]
    async fn test_add_and_remove_are_idempotent() {
        let (surface, orchestrator) = orchestrator();
        assert!(orchestrator.add_source("zones").await.changed);
        let again = orchestrator.add_source("zones").await;
        assert!(again.success && !again.changed);

        assert!(orchestrator.add_layer("zones-fill").await.changed);
        assert!(!orchestrator.add_layer("zones-fill").await.changed);

        assert!(orchestrator.remove_layer("zones-fill").await.changed);
        let removed = orchestrator.remove_layer("zones-fill").await;
        assert!(removed.success && !removed.changed);
        assert_eq!(removed.warnings.len(), 1);
        assert_eq!(surface.layer_ids(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_remove_warns_about_dependents() {
        let (_surface, orchestrator) = orchestrator();
        orchestrator.set_layer_visibility("road-labels", true).await;
        let result = orchestrator.remove_layer("roads").await;
        assert!(result.success);
        assert!(result.warnings[0].contains("road-labels"));
    }

    #[tokio::test]
    async fn test_validate_and_fix_drift() {
        let (surface, orchestrator) = orchestrator();
        orchestrator.set_layer_visibility("zones-fill", true).await;
        surface.force_layout("zones-fill", VISIBILITY_PROPERTY, json!("none"));

        let issues = orchestrator.validate_state();
        assert_eq!(issues.len(), 1);
        assert!(!orchestrator.can_auto_fix(&issues));

        let fixed = orchestrator.auto_fix(&issues).await;
        assert!(fixed.success);
        assert!(orchestrator.validate_state().is_empty());
    }

    #[tokio::test]
    async fn test_add_layer_recovers_and_retries_once() {
        let (surface, orchestrator) = orchestrator();
        surface.fail_on(
            "zones-fill",
            SurfaceError::Message("Source \"zones\" not found".into()),
            1,
        );

        let result = orchestrator.add_layer("zones-fill").await;

        assert!(result.success, "{:?}", result.error);
        assert!(result.changed);
        assert!(surface.has_layer("zones-fill"));
        assert!(orchestrator.state().active_sources.contains("zones"));
    }

    #[tokio::test]
    async fn test_remove_failure_goes_through_handler() {
        let (surface, orchestrator) = orchestrator();
        orchestrator.set_layer_visibility("zones-fill", true).await;
        surface.fail_on(
            "zones-fill",
            SurfaceError::Message("WebGL context lost".into()),
            1,
        );

        let result = orchestrator.remove_layer("zones-fill").await;

        assert!(!result.success);
        assert!(matches!(result.error, Some(LayerError::InvalidState(_))));
        assert!(!result.can_retry);
        assert!(surface.has_layer("zones-fill"));
        assert!(orchestrator.state().is_visible("zones-fill"));
    }

    #[tokio::test]
    async fn test_auto_fix_provisions_dependencies() {
        let mut registry = LayerRegistry::new(RegistryConfig::default());
        registry
            .register_source(SourceDescriptor::geojson("s", json!({})))
            .unwrap();
        registry
            .register_layer(LayerDescriptor::new("base", "Base", LayerCategory::Base).with_source("s"))
            .unwrap();
        registry
            .register_layer(
                LayerDescriptor::new("top", "Top", LayerCategory::Overlay)
                    .with_source("s")
                    .with_dependency("base")
                    .visible(true),
            )
            .unwrap();
        let surface = Arc::new(InMemorySurface::loaded());
        let orchestrator = LayerOrchestrator::new(registry, surface.clone(), &EngineConfig::default());

        let issues = orchestrator.validate_state();
        let result = orchestrator.auto_fix(&issues).await;

        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(surface.visibility("base"), Some(Visibility::None));
        assert_eq!(surface.visibility("top"), Some(Visibility::Visible));
        assert!(orchestrator.state().is_visible("top"));
        assert!(orchestrator.validate_state().is_empty());
    }

    #[tokio::test]
    async fn test_auto_fix_keeps_layer_whose_source_vanished() {
        let (surface, orchestrator) = orchestrator();
        orchestrator.set_layer_visibility("zones-fill", true).await;
        surface.drop_source("zones");

        let issues = orchestrator.validate_state();
        let result = orchestrator.auto_fix(&issues).await;

        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(
            result.fixes,
            vec![FixOperation::AddSource {
                source_id: "zones".into()
            }]
        );
        assert_eq!(surface.visibility("zones-fill"), Some(Visibility::Visible));
        assert!(orchestrator.state().is_visible("zones-fill"));
        assert!(orchestrator.validate_state().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_style_load() {
        let surface = Arc::new(InMemorySurface::new());
        let orchestrator = Arc::new(LayerOrchestrator::new(
            registry(),
            surface.clone(),
            &EngineConfig::default(),
        ));
        assert!(!orchestrator.queue_status().surface_ready);

        let task = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.set_layer_visibility("zones-fill", true).await })
        };
        tokio::task::yield_now().await;

        surface.set_style_loaded(true);
        orchestrator.on_style_loaded().await;

        let result = task.await.unwrap();
        assert!(result.success, "{:?}", result.error);
        assert!(orchestrator.state().is_visible("zones-fill"));
    }
}
