//! The believed layer state.
//!
//! `LayerState` is what the application believes it has set on the surface.
//! It is mutated only when an operation commits and is never re-derived from
//! the surface on its own; drift is found by the validator.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Snapshot of believed layer visibility and policy selections.
///
/// Only the orchestrator holds a mutable copy. Everything else receives
/// clones through [`crate::orchestrator::LayerOrchestrator::state`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LayerState {
    /// Layers believed visible.
    pub visible_layers: BTreeSet<String>,

    /// Layers believed hidden.
    pub hidden_layers: BTreeSet<String>,

    /// Sources believed present on the surface.
    pub active_sources: BTreeSet<String>,

    /// Currently selected base layer, by name.
    pub base_layer: Option<String>,

    /// Whether the zones overlay is switched on.
    pub zones_visible: bool,

    /// Selected view per mode (mode name -> view name).
    pub view_selection: BTreeMap<String, String>,
}

impl LayerState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Believed visibility of a layer, or `None` if nothing was ever set.
    pub fn believed_visibility(&self, layer_id: &str) -> Option<bool> {
        if self.visible_layers.contains(layer_id) {
            Some(true)
        } else if self.hidden_layers.contains(layer_id) {
            Some(false)
        } else {
            None
        }
    }

    /// Returns true if the layer is believed visible.
    pub fn is_visible(&self, layer_id: &str) -> bool {
        self.visible_layers.contains(layer_id)
    }

    /// Records a committed visibility change.
    pub(crate) fn set_visibility(&mut self, layer_id: &str, visible: bool) {
        if visible {
            self.hidden_layers.remove(layer_id);
            self.visible_layers.insert(layer_id.to_string());
        } else {
            self.visible_layers.remove(layer_id);
            self.hidden_layers.insert(layer_id.to_string());
        }
    }

    /// Forgets a layer entirely (it was removed from the surface).
    pub(crate) fn forget_layer(&mut self, layer_id: &str) {
        self.visible_layers.remove(layer_id);
        self.hidden_layers.remove(layer_id);
    }

    pub(crate) fn mark_source_active(&mut self, source_id: &str) {
        self.active_sources.insert(source_id.to_string());
    }

    pub(crate) fn set_base_layer(&mut self, name: impl Into<String>) {
        self.base_layer = Some(name.into());
    }

    pub(crate) fn set_zones_visible(&mut self, visible: bool) {
        self.zones_visible = visible;
    }

    pub(crate) fn select_view(&mut self, mode: &str, view: &str) {
        self.view_selection
            .insert(mode.to_string(), view.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_moves_between_sets() {
        let mut state = LayerState::new();
        assert_eq!(state.believed_visibility("a"), None);

        state.set_visibility("a", true);
        assert!(state.is_visible("a"));
        assert!(!state.hidden_layers.contains("a"));

        state.set_visibility("a", false);
        assert_eq!(state.believed_visibility("a"), Some(false));
        assert!(!state.visible_layers.contains("a"));
    }

    #[test]
    fn test_forget_layer() {
        let mut state = LayerState::new();
        state.set_visibility("a", true);
        state.forget_layer("a");
        assert_eq!(state.believed_visibility("a"), None);
    }
}
