//! Map layer policy.
//!
//! Higher-level intents built on the orchestrator's batch API: pick a base
//! map, switch the zones overlay, select a view within a view mode, or apply
//! a named preset. Each intent becomes exactly one batch, and the policy
//! selection is recorded in [`LayerState`](crate::state::LayerState) only
//! when the whole batch succeeds.
//!
//! Presets and view modes come from a [`PolicyConfig`], usually deserialized
//! from JSON:
//!
//! ```json
//! {
//!   "view_modes": {
//!     "transit": { "views": { "buses": ["bus-stops"], "trams": ["tram-lines"] } }
//!   },
//!   "presets": {
//!     "night": { "base_layer": "satellite", "zones": false, "layers": ["bus-stops"] }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orchestrator::{BatchOptions, BatchResult, LayerOrchestrator, VisibilityChange};
use crate::types::LayerCategory;

/// Errors from policy lookups.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("unknown base layer '{0}'")]
    UnknownBaseLayer(String),

    #[error("unknown preset '{0}'")]
    UnknownPreset(String),

    #[error("unknown view '{view}' in mode '{mode}'")]
    UnknownView { mode: String, view: String },
}

/// Selectable base maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseLayer {
    Streets,
    Satellite,
    Hybrid,
    Terrain,
}

impl BaseLayer {
    pub const ALL: [BaseLayer; 4] = [
        BaseLayer::Streets,
        BaseLayer::Satellite,
        BaseLayer::Hybrid,
        BaseLayer::Terrain,
    ];

    /// Layer categories shown for this base map.
    ///
    /// Hybrid is satellite imagery with its label layers on top.
    pub fn categories(&self) -> &'static [LayerCategory] {
        match self {
            BaseLayer::Streets => &[LayerCategory::Base],
            BaseLayer::Satellite => &[LayerCategory::Satellite],
            BaseLayer::Hybrid => &[LayerCategory::Satellite, LayerCategory::Hybrid],
            BaseLayer::Terrain => &[LayerCategory::Terrain],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BaseLayer::Streets => "streets",
            BaseLayer::Satellite => "satellite",
            BaseLayer::Hybrid => "hybrid",
            BaseLayer::Terrain => "terrain",
        }
    }
}

impl fmt::Display for BaseLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaseLayer {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BaseLayer::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PolicyError::UnknownBaseLayer(s.to_string()))
    }
}

/// Mutually exclusive views within one mode; each view lists its layers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewMode {
    #[serde(default)]
    pub views: BTreeMap<String, Vec<String>>,
}

/// A named combination of base map, zones and extra layers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default)]
    pub base_layer: Option<BaseLayer>,
    #[serde(default)]
    pub zones: Option<bool>,
    #[serde(default)]
    pub layers: Vec<String>,
}

/// Presets and view modes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub view_modes: BTreeMap<String, ViewMode>,
    #[serde(default)]
    pub presets: BTreeMap<String, Preset>,
    /// Run policy batches with map interactions disabled.
    #[serde(default)]
    pub ultra_fast: bool,
}

impl PolicyConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Accumulates a batch with one entry per layer. When a layer is pushed
/// more than once, a show beats a hide regardless of order.
#[derive(Default)]
struct ChangeSet {
    changes: Vec<VisibilityChange>,
}

impl ChangeSet {
    fn push(&mut self, layer_id: &str, visible: bool) {
        match self.changes.iter_mut().find(|c| c.layer_id == layer_id) {
            Some(existing) => existing.visible |= visible,
            None => self.changes.push(VisibilityChange::new(layer_id, visible)),
        }
    }

    fn into_vec(self) -> Vec<VisibilityChange> {
        self.changes
    }
}

/// Policy facade over a [`LayerOrchestrator`].
pub struct MapLayerPolicy {
    orchestrator: Arc<LayerOrchestrator>,
    config: PolicyConfig,
}

impl fmt::Debug for MapLayerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapLayerPolicy")
            .field("view_modes", &self.config.view_modes.len())
            .field("presets", &self.config.presets.len())
            .finish()
    }
}

impl MapLayerPolicy {
    pub fn new(orchestrator: Arc<LayerOrchestrator>, config: PolicyConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub fn orchestrator(&self) -> &Arc<LayerOrchestrator> {
        &self.orchestrator
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    fn options(&self) -> BatchOptions {
        BatchOptions {
            ultra_fast: self.config.ultra_fast,
        }
    }

    fn category_layers(&self, category: LayerCategory) -> Vec<String> {
        self.orchestrator
            .registry()
            .layers_by_category(category)
            .into_iter()
            .map(|l| l.id.clone())
            .collect()
    }

    fn push_base_layer(&self, changes: &mut ChangeSet, base: BaseLayer) {
        let selected = base.categories();
        for category in LayerCategory::BASE_CATEGORIES {
            if !selected.contains(&category) {
                for layer_id in self.category_layers(category) {
                    changes.push(&layer_id, false);
                }
            }
        }
        for category in selected {
            for layer_id in self.category_layers(*category) {
                changes.push(&layer_id, true);
            }
        }
    }

    fn push_zones(&self, changes: &mut ChangeSet, visible: bool) {
        for layer_id in self.category_layers(LayerCategory::Zones) {
            changes.push(&layer_id, visible);
        }
    }

    /// Shows the layers of `base` and hides every other base-map layer.
    pub async fn set_base_layer(&self, base: BaseLayer) -> BatchResult {
        let mut changes = ChangeSet::default();
        self.push_base_layer(&mut changes, base);

        let result = self
            .orchestrator
            .batch_set_layer_visibility(&changes.into_vec(), self.options())
            .await;
        if result.success {
            self.orchestrator
                .update_state(|state| state.set_base_layer(base.as_str()));
            tracing::info!(base_layer = %base, "Base layer switched");
        } else {
            tracing::warn!(base_layer = %base, summary = %result.summary, "Base layer switch incomplete");
        }
        result
    }

    /// Shows or hides every zones layer.
    pub async fn set_zones_visible(&self, visible: bool) -> BatchResult {
        let mut changes = ChangeSet::default();
        self.push_zones(&mut changes, visible);

        let result = self
            .orchestrator
            .batch_set_layer_visibility(&changes.into_vec(), self.options())
            .await;
        if result.success {
            self.orchestrator
                .update_state(|state| state.set_zones_visible(visible));
        }
        result
    }

    /// Flips the zones overlay.
    pub async fn toggle_zones(&self) -> BatchResult {
        let visible = !self.orchestrator.state().zones_visible;
        tracing::debug!(visible, "Toggling zones");
        self.set_zones_visible(visible).await
    }

    /// Shows a set of layers in one batch.
    pub async fn activate_layers<S: AsRef<str>>(&self, layer_ids: &[S]) -> BatchResult {
        let mut changes = ChangeSet::default();
        for layer_id in layer_ids {
            changes.push(layer_id.as_ref(), true);
        }
        self.orchestrator
            .batch_set_layer_visibility(&changes.into_vec(), self.options())
            .await
    }

    /// Shows the layers of `view` and hides the other views of `mode`.
    pub async fn select_view(&self, mode: &str, view: &str) -> Result<BatchResult, PolicyError> {
        let unknown = || PolicyError::UnknownView {
            mode: mode.to_string(),
            view: view.to_string(),
        };
        let view_mode = self.config.view_modes.get(mode).ok_or_else(unknown)?;
        let selected = view_mode.views.get(view).ok_or_else(unknown)?;

        let mut changes = ChangeSet::default();
        for (name, layers) in &view_mode.views {
            if name != view {
                for layer_id in layers {
                    changes.push(layer_id, false);
                }
            }
        }
        for layer_id in selected {
            changes.push(layer_id, true);
        }

        let result = self
            .orchestrator
            .batch_set_layer_visibility(&changes.into_vec(), self.options())
            .await;
        if result.success {
            self.orchestrator
                .update_state(|state| state.select_view(mode, view));
        }
        Ok(result)
    }

    /// Applies a named preset as a single batch.
    pub async fn apply_preset(&self, name: &str) -> Result<BatchResult, PolicyError> {
        let preset = self
            .config
            .presets
            .get(name)
            .ok_or_else(|| PolicyError::UnknownPreset(name.to_string()))?;

        let mut changes = ChangeSet::default();
        if let Some(base) = preset.base_layer {
            self.push_base_layer(&mut changes, base);
        }
        if let Some(zones) = preset.zones {
            self.push_zones(&mut changes, zones);
        }
        for layer_id in &preset.layers {
            changes.push(layer_id, true);
        }

        let result = self
            .orchestrator
            .batch_set_layer_visibility(&changes.into_vec(), self.options())
            .await;
        if result.success {
            self.orchestrator.update_state(|state| {
                if let Some(base) = preset.base_layer {
                    state.set_base_layer(base.as_str());
                }
                if let Some(zones) = preset.zones {
                    state.set_zones_visible(zones);
                }
            });
        }
        tracing::info!(preset = name, summary = %result.summary, "Preset applied");
        Ok(result)
    }
}
