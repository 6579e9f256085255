//! Execution of single operations against the surface.

use std::fmt;
use std::sync::Arc;

use super::operation::{ExecutionReport, Operation};
use crate::error::{ErrorHandler, LayerError, LayerResult};
use crate::registry::LayerRegistry;
use crate::surface::{LayerDefinition, MapSurface, SurfaceError};
use crate::telemetry::PerformanceMonitor;
use crate::types::{Visibility, VISIBILITY_PROPERTY};

/// Executes one operation.
///
/// Called only from the queue's drain loop, so implementations never see
/// two operations at once.
pub trait OperationExecutor: Send + Sync {
    fn execute(&self, operation: &Operation) -> LayerResult<ExecutionReport>;
}

/// Executes operations against a [`MapSurface`], resolving layer and source
/// definitions from the registry.
///
/// Adds and removes are idempotent: when the surface already matches, the
/// report carries a warning and nothing is mutated.
pub struct SurfaceExecutor {
    registry: Arc<LayerRegistry>,
    surface: Arc<dyn MapSurface>,
    errors: Arc<ErrorHandler>,
    monitor: Arc<PerformanceMonitor>,
}

impl SurfaceExecutor {
    pub fn new(
        registry: Arc<LayerRegistry>,
        surface: Arc<dyn MapSurface>,
        errors: Arc<ErrorHandler>,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        Self {
            registry,
            surface,
            errors,
            monitor,
        }
    }

    fn surface_call(
        &self,
        target_id: &str,
        result: Result<(), SurfaceError>,
    ) -> LayerResult<ExecutionReport> {
        result
            .map(|()| ExecutionReport::applied())
            .map_err(|e| self.errors.classify(&e, target_id))
    }

    fn add_source(&self, source_id: &str) -> LayerResult<ExecutionReport> {
        if self.surface.has_source(source_id) {
            return Ok(ExecutionReport::skipped(format!(
                "source '{}' already exists",
                source_id
            )));
        }
        let source = self
            .registry
            .get_source(source_id)
            .ok_or_else(|| LayerError::source_not_found(source_id))?;
        self.surface_call(
            source_id,
            self.surface.add_source(source_id, source.kind.clone()),
        )
    }

    fn add_layer(&self, layer_id: &str, visible: bool) -> LayerResult<ExecutionReport> {
        if self.surface.has_layer(layer_id) {
            return Ok(ExecutionReport::skipped(format!(
                "layer '{}' already exists",
                layer_id
            )));
        }
        let descriptor = self
            .registry
            .get_layer(layer_id)
            .ok_or_else(|| LayerError::layer_not_found(layer_id))?;

        if let Some(missing) = descriptor
            .all_sources()
            .into_iter()
            .find(|s| !self.surface.has_source(s))
        {
            return Err(LayerError::source_not_found(missing));
        }
        if let Some(missing) = descriptor
            .dependencies
            .iter()
            .find(|d| !self.surface.has_layer(d))
        {
            return Err(LayerError::dependency_missing(layer_id, missing.clone()));
        }

        let definition = LayerDefinition::from_descriptor(descriptor, Visibility::from_flag(visible));
        self.surface_call(layer_id, self.surface.add_layer(definition))
    }

    fn set_visibility(&self, layer_id: &str, visibility: Visibility) -> LayerResult<ExecutionReport> {
        if self.surface.visibility(layer_id) == Some(visibility) {
            return Ok(ExecutionReport::skipped(format!(
                "layer '{}' is already {}",
                layer_id, visibility
            )));
        }
        self.surface_call(
            layer_id,
            self.surface
                .set_layout_property(layer_id, VISIBILITY_PROPERTY, visibility.to_value()),
        )
    }

    fn remove_layer(&self, layer_id: &str) -> LayerResult<ExecutionReport> {
        if !self.surface.has_layer(layer_id) {
            return Ok(ExecutionReport::skipped(format!(
                "layer '{}' is not on the surface",
                layer_id
            )));
        }
        self.surface_call(layer_id, self.surface.remove_layer(layer_id))
    }
}

impl fmt::Debug for SurfaceExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceExecutor")
            .field("layers", &self.registry.layer_count())
            .field("sources", &self.registry.source_count())
            .finish()
    }
}

impl OperationExecutor for SurfaceExecutor {
    fn execute(&self, operation: &Operation) -> LayerResult<ExecutionReport> {
        let metric = self
            .monitor
            .start_operation(operation.kind().as_str(), operation.target_id());

        let result = match operation {
            Operation::AddSource { source_id } => self.add_source(source_id),
            Operation::AddLayer { layer_id, visible } => self.add_layer(layer_id, *visible),
            Operation::Show { layer_id } => self.set_visibility(layer_id, Visibility::Visible),
            Operation::Hide { layer_id } => self.set_visibility(layer_id, Visibility::None),
            Operation::Update {
                layer_id,
                property,
                value,
            } => self.surface_call(
                layer_id,
                self.surface
                    .set_layout_property(layer_id, property, value.clone()),
            ),
            Operation::Remove { layer_id } => self.remove_layer(layer_id),
        };

        match &result {
            Ok(report) => {
                tracing::trace!(
                    operation = %operation,
                    changed = report.changed,
                    "Executed operation"
                );
                self.monitor.end_operation(metric, true, None);
            }
            Err(error) => {
                let message = error.to_string();
                self.monitor.end_operation(metric, false, Some(&message));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryConfig;
    use crate::surface::{InMemorySurface, SurfaceMutation};
    use crate::types::{LayerCategory, LayerDescriptor, SourceDescriptor};
    use serde_json::json;

    fn fixture() -> (Arc<InMemorySurface>, SurfaceExecutor, Arc<PerformanceMonitor>) {
        let mut registry = LayerRegistry::new(RegistryConfig::default());
        registry
            .register_source(SourceDescriptor::geojson("zones", json!({})))
            .unwrap();
        registry
            .register_layer(
                LayerDescriptor::new("zones-fill", "Zones", LayerCategory::Zones).with_source("zones"),
            )
            .unwrap();
        registry
            .register_layer(
                LayerDescriptor::new("zones-label", "Zone labels", LayerCategory::Zones)
                    .with_source("zones")
                    .with_dependency("zones-fill"),
            )
            .unwrap();

        let surface = Arc::new(InMemorySurface::loaded());
        let monitor = Arc::new(PerformanceMonitor::default());
        let executor = SurfaceExecutor::new(
            Arc::new(registry),
            surface.clone(),
            Arc::new(ErrorHandler::new()),
            monitor.clone(),
        );
        (surface, executor, monitor)
    }

    #[test]
    fn test_add_layer_requires_source() {
        let (_surface, executor, monitor) = fixture();
        let err = executor
            .execute(&Operation::add_layer("zones-fill", true))
            .unwrap_err();
        assert_eq!(err, LayerError::source_not_found("zones"));
        assert_eq!(monitor.stats().failed, 1);
    }

    #[test]
    fn test_add_layer_requires_dependency() {
        let (_surface, executor, _monitor) = fixture();
        executor.execute(&Operation::add_source("zones")).unwrap();
        let err = executor
            .execute(&Operation::add_layer("zones-label", true))
            .unwrap_err();
        assert_eq!(err, LayerError::dependency_missing("zones-label", "zones-fill"));
    }

    #[test]
    fn test_adds_are_idempotent() {
        let (surface, executor, _monitor) = fixture();
        assert!(executor.execute(&Operation::add_source("zones")).unwrap().changed);
        let again = executor.execute(&Operation::add_source("zones")).unwrap();
        assert!(!again.changed);
        assert!(again.warning.is_some());
        assert_eq!(surface.mutation_count(), 1);
    }

    #[test]
    fn test_show_skips_when_already_visible() {
        let (surface, executor, _monitor) = fixture();
        executor.execute(&Operation::add_source("zones")).unwrap();
        executor
            .execute(&Operation::add_layer("zones-fill", false))
            .unwrap();

        assert!(executor.execute(&Operation::show("zones-fill")).unwrap().changed);
        assert!(!executor.execute(&Operation::show("zones-fill")).unwrap().changed);
        assert_eq!(surface.visibility_writes("zones-fill"), 1);
    }

    #[test]
    fn test_show_missing_layer_is_classified() {
        let (_surface, executor, _monitor) = fixture();
        let err = executor.execute(&Operation::show("ghost")).unwrap_err();
        assert_eq!(err, LayerError::layer_not_found("ghost"));
    }

    #[test]
    fn test_remove_absent_layer_warns() {
        let (surface, executor, _monitor) = fixture();
        let report = executor.execute(&Operation::remove("zones-fill")).unwrap();
        assert!(!report.changed);
        assert!(surface
            .mutations()
            .iter()
            .all(|m| !matches!(m, SurfaceMutation::RemoveLayer(_))));
    }
}
