//! Drift detection against the live surface.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::issues::{AutoFixResult, FixOperation, IssueKind, ValidationIssue};
use crate::error::{LayerResult, RecoveryTarget};
use crate::queue::{Operation, OperationQueue};
use crate::registry::LayerRegistry;
use crate::state::LayerState;
use crate::surface::MapSurface;
use crate::types::Visibility;

/// Compares believed state with the surface and repairs the difference.
///
/// The surface is re-queried on every call; nothing is cached.
pub struct StateValidator {
    registry: Arc<LayerRegistry>,
    surface: Arc<dyn MapSurface>,
    queue: Arc<OperationQueue>,
}

impl fmt::Debug for StateValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateValidator")
            .field("layers", &self.registry.layer_count())
            .finish()
    }
}

impl StateValidator {
    pub fn new(
        registry: Arc<LayerRegistry>,
        surface: Arc<dyn MapSurface>,
        queue: Arc<OperationQueue>,
    ) -> Self {
        Self {
            registry,
            surface,
            queue,
        }
    }

    /// Finds drift between `state` and the surface.
    ///
    /// A layer's desired visibility is what `state` believes when it has an
    /// opinion, else the descriptor's `visible` flag.
    pub fn validate_map_state(&self, state: &LayerState) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        for layer_id in self.surface.layer_ids() {
            let Some(definition) = self.surface.get_layer(&layer_id) else {
                continue;
            };
            if let Some(source_id) = &definition.source {
                if !self.surface.has_source(source_id) {
                    issues.push(ValidationIssue::orphaned_layer(&layer_id, source_id));
                }
            }
        }

        let mut reported_sources = HashSet::new();
        for descriptor in self.registry.layers() {
            let desired = state
                .believed_visibility(&descriptor.id)
                .unwrap_or(descriptor.visible);

            match self.surface.visibility(&descriptor.id) {
                None if desired => {
                    issues.push(ValidationIssue::missing_layer(&descriptor.id));
                }
                Some(actual) if actual != Visibility::from_flag(desired) => {
                    issues.push(ValidationIssue::inconsistent_visibility(
                        &descriptor.id,
                        Visibility::from_flag(desired),
                        actual,
                    ));
                }
                _ => {}
            }

            if desired {
                for source_id in descriptor.all_sources() {
                    if !self.surface.has_source(source_id)
                        && reported_sources.insert(source_id.to_string())
                    {
                        issues.push(ValidationIssue::missing_source(source_id, &descriptor.id));
                    }
                }
            }
        }

        if !issues.is_empty() {
            tracing::debug!(count = issues.len(), "State validation found drift");
        }
        issues
    }

    /// Returns true if any issue can be repaired by adding something.
    pub fn can_auto_fix(&self, issues: &[ValidationIssue]) -> bool {
        issues
            .iter()
            .any(|i| matches!(i.kind, IssueKind::MissingLayer | IssueKind::MissingSource))
    }

    /// Plans repairs, ordered remove, add-source, add-layer, set-visibility.
    ///
    /// Layers are added in registration order so dependencies come first.
    /// A registered layer whose registered source vanished keeps its place;
    /// the source is re-added under it instead.
    pub fn plan_fixes(&self, issues: &[ValidationIssue]) -> Vec<FixOperation> {
        let mut fixes: Vec<FixOperation> = Vec::new();
        for issue in issues {
            let subject = issue.subject().to_string();
            let fix = match issue.kind {
                IssueKind::OrphanedLayer => match issue.ids.get(1) {
                    Some(source_id)
                        if self.registry.has_layer(&subject)
                            && self.registry.has_source(source_id) =>
                    {
                        FixOperation::AddSource {
                            source_id: source_id.clone(),
                        }
                    }
                    _ => FixOperation::RemoveLayer { layer_id: subject },
                },
                IssueKind::MissingSource => FixOperation::AddSource { source_id: subject },
                IssueKind::MissingLayer => FixOperation::AddLayer {
                    layer_id: subject,
                    visible: true,
                },
                IssueKind::InconsistentVisibility => FixOperation::SetVisibility {
                    layer_id: subject,
                    visible: issue.expected.map_or(true, |v| v.is_visible()),
                },
            };
            if !fixes.contains(&fix) {
                fixes.push(fix);
            }
        }

        let position = |fix: &FixOperation| match fix {
            FixOperation::AddLayer { layer_id, .. } => self
                .registry
                .layers()
                .position(|l| &l.id == layer_id)
                .unwrap_or(usize::MAX),
            _ => 0,
        };
        fixes.sort_by_key(|fix| (fix.rank(), position(fix)));
        fixes
    }

    /// Applies the planned fixes one by one.
    ///
    /// Sources and layers are realized through `target`, which provisions
    /// whatever they depend on; removals and visibility changes go through
    /// the queue. A failing fix is recorded and the remaining fixes still run.
    pub async fn auto_fix(
        &self,
        issues: &[ValidationIssue],
        target: &dyn RecoveryTarget,
    ) -> AutoFixResult {
        let mut result = AutoFixResult::default();

        for fix in self.plan_fixes(issues) {
            match self.apply_fix(&fix, target).await {
                Ok(()) => {
                    tracing::info!(fix = %fix, "Applied state fix");
                    result.fixes.push(fix);
                }
                Err(error) => {
                    tracing::warn!(fix = %fix, "State fix failed: {}", error);
                    result.errors.push(format!("{}: {}", fix, error));
                }
            }
        }

        result.success = result.errors.is_empty();
        result
    }

    async fn apply_fix(&self, fix: &FixOperation, target: &dyn RecoveryTarget) -> LayerResult<()> {
        match fix {
            FixOperation::AddSource { source_id } => target.add_missing_source(source_id).await,
            FixOperation::AddLayer { layer_id, visible } => {
                target.add_missing_layer(layer_id).await?;
                // Already present as someone's dependency, possibly hidden
                if self.surface.visibility(layer_id) != Some(Visibility::from_flag(*visible)) {
                    self.queue
                        .submit(Operation::set_visibility(layer_id.clone(), *visible))
                        .await?;
                }
                Ok(())
            }
            FixOperation::RemoveLayer { .. } | FixOperation::SetVisibility { .. } => {
                self.queue.submit(fix.to_operation()).await.map(|_| ())
            }
        }
    }
}
