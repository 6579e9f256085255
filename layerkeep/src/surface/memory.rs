//! Headless in-memory surface.
//!
//! Behaves like a style-based map library: layers reference sources, layout
//! properties are free-form JSON, and errors come back as plain messages the
//! way a browser map library throws them. Every mutation is recorded so tests
//! can count exactly what the engine did.
//!
//! It also offers hooks that bypass the engine (`drop_source`,
//! `force_layout`, `insert_layer_unchecked`) to simulate the drift caused by
//! other code touching the map directly.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde_json::Value;

use super::{Interaction, LayerDefinition, MapSurface, SurfaceError};
use crate::types::{SourceKind, VISIBILITY_PROPERTY};

/// One recorded mutation against the surface.
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceMutation {
    AddSource(String),
    AddLayer(String),
    RemoveLayer(String),
    SetLayout {
        layer_id: String,
        key: String,
        value: Value,
    },
}

impl SurfaceMutation {
    /// Id of the layer or source the mutation targeted.
    pub fn target(&self) -> &str {
        match self {
            SurfaceMutation::AddSource(id)
            | SurfaceMutation::AddLayer(id)
            | SurfaceMutation::RemoveLayer(id) => id,
            SurfaceMutation::SetLayout { layer_id, .. } => layer_id,
        }
    }
}

/// A failure armed to fire on the next mutations of a target.
#[derive(Debug)]
struct InjectedFailure {
    target: String,
    error: SurfaceError,
    remaining: u32,
}

#[derive(Debug, Default)]
struct SurfaceState {
    style_loaded: bool,
    /// Layers in draw order.
    layers: Vec<LayerDefinition>,
    sources: HashMap<String, SourceKind>,
    disabled_interactions: Vec<Interaction>,
    mutations: Vec<SurfaceMutation>,
    failures: VecDeque<InjectedFailure>,
}

impl SurfaceState {
    fn layer_index(&self, id: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    fn take_failure(&mut self, target: &str) -> Option<SurfaceError> {
        let index = self.failures.iter().position(|f| f.target == target)?;
        let failure = &mut self.failures[index];
        failure.remaining -= 1;
        let error = failure.error.clone();
        if failure.remaining == 0 {
            self.failures.remove(index);
        }
        Some(error)
    }

    fn check_loaded(&self) -> Result<(), SurfaceError> {
        if self.style_loaded {
            Ok(())
        } else {
            Err(SurfaceError::Message(
                "Style is not done loading.".to_string(),
            ))
        }
    }
}

/// In-memory [`MapSurface`] implementation.
#[derive(Debug, Default)]
pub struct InMemorySurface {
    state: Mutex<SurfaceState>,
}

impl InMemorySurface {
    /// Creates a surface whose style has not loaded yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a surface that is already loaded.
    pub fn loaded() -> Self {
        let surface = Self::new();
        surface.set_style_loaded(true);
        surface
    }

    /// Flips the style-loaded flag.
    pub fn set_style_loaded(&self, loaded: bool) {
        self.state.lock().style_loaded = loaded;
    }

    /// Arms `times` failures for mutations targeting `target`.
    pub fn fail_on(&self, target: impl Into<String>, error: SurfaceError, times: u32) {
        if times == 0 {
            return;
        }
        self.state.lock().failures.push_back(InjectedFailure {
            target: target.into(),
            error,
            remaining: times,
        });
    }

    /// All recorded mutations in order.
    pub fn mutations(&self) -> Vec<SurfaceMutation> {
        self.state.lock().mutations.clone()
    }

    /// Number of recorded mutations.
    pub fn mutation_count(&self) -> usize {
        self.state.lock().mutations.len()
    }

    /// Number of visibility writes made to a layer.
    pub fn visibility_writes(&self, layer_id: &str) -> usize {
        self.state
            .lock()
            .mutations
            .iter()
            .filter(|m| {
                matches!(m, SurfaceMutation::SetLayout { layer_id: id, key, .. }
                    if id == layer_id && key == VISIBILITY_PROPERTY)
            })
            .count()
    }

    /// Forgets the recorded mutations.
    pub fn clear_mutations(&self) {
        self.state.lock().mutations.clear();
    }

    /// Returns true unless the interaction was disabled.
    pub fn interaction_enabled(&self, interaction: Interaction) -> bool {
        !self
            .state
            .lock()
            .disabled_interactions
            .contains(&interaction)
    }

    /// Removes a source behind the engine's back.
    pub fn drop_source(&self, id: &str) {
        self.state.lock().sources.remove(id);
    }

    /// Removes a layer behind the engine's back.
    pub fn drop_layer(&self, id: &str) {
        let mut state = self.state.lock();
        if let Some(index) = state.layer_index(id) {
            state.layers.remove(index);
        }
    }

    /// Overwrites a layout property behind the engine's back.
    pub fn force_layout(&self, layer_id: &str, key: &str, value: Value) {
        let mut state = self.state.lock();
        if let Some(index) = state.layer_index(layer_id) {
            state.layers[index].layout.insert(key.to_string(), value);
        }
    }

    /// Inserts a layer without checking its source.
    pub fn insert_layer_unchecked(&self, definition: LayerDefinition) {
        let mut state = self.state.lock();
        let position = state
            .layers
            .iter()
            .rposition(|l| l.z_order <= definition.z_order)
            .map_or(0, |i| i + 1);
        state.layers.insert(position, definition);
    }
}

impl MapSurface for InMemorySurface {
    fn is_style_loaded(&self) -> bool {
        self.state.lock().style_loaded
    }

    fn get_layer(&self, id: &str) -> Option<LayerDefinition> {
        let state = self.state.lock();
        state.layer_index(id).map(|i| state.layers[i].clone())
    }

    fn get_source(&self, id: &str) -> Option<SourceKind> {
        self.state.lock().sources.get(id).cloned()
    }

    fn layer_ids(&self) -> Vec<String> {
        self.state.lock().layers.iter().map(|l| l.id.clone()).collect()
    }

    fn get_layout_property(&self, layer_id: &str, key: &str) -> Option<Value> {
        let state = self.state.lock();
        let index = state.layer_index(layer_id)?;
        state.layers[index].layout.get(key).cloned()
    }

    fn set_layout_property(
        &self,
        layer_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        state.check_loaded()?;
        if let Some(error) = state.take_failure(layer_id) {
            return Err(error);
        }
        let index = state.layer_index(layer_id).ok_or_else(|| {
            SurfaceError::Message(format!(
                "The layer '{}' does not exist in the map's style and cannot be styled.",
                layer_id
            ))
        })?;
        state.layers[index]
            .layout
            .insert(key.to_string(), value.clone());
        state.mutations.push(SurfaceMutation::SetLayout {
            layer_id: layer_id.to_string(),
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    fn add_layer(&self, definition: LayerDefinition) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        state.check_loaded()?;
        if let Some(error) = state.take_failure(&definition.id) {
            return Err(error);
        }
        if state.layer_index(&definition.id).is_some() {
            return Err(SurfaceError::Message(format!(
                "Layer with id \"{}\" already exists on this map",
                definition.id
            )));
        }
        if let Some(source) = &definition.source {
            if !state.sources.contains_key(source) {
                return Err(SurfaceError::Message(format!(
                    "Source \"{}\" not found",
                    source
                )));
            }
        }
        let id = definition.id.clone();
        let position = state
            .layers
            .iter()
            .rposition(|l| l.z_order <= definition.z_order)
            .map_or(0, |i| i + 1);
        state.layers.insert(position, definition);
        state.mutations.push(SurfaceMutation::AddLayer(id));
        Ok(())
    }

    fn add_source(&self, id: &str, source: SourceKind) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        state.check_loaded()?;
        if let Some(error) = state.take_failure(id) {
            return Err(error);
        }
        if state.sources.contains_key(id) {
            return Err(SurfaceError::Message(format!(
                "There is already a source with ID \"{}\".",
                id
            )));
        }
        state.sources.insert(id.to_string(), source);
        state.mutations.push(SurfaceMutation::AddSource(id.to_string()));
        Ok(())
    }

    fn remove_layer(&self, id: &str) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        state.check_loaded()?;
        if let Some(error) = state.take_failure(id) {
            return Err(error);
        }
        let index = state
            .layer_index(id)
            .ok_or_else(|| SurfaceError::LayerNotFound(id.to_string()))?;
        state.layers.remove(index);
        state.mutations.push(SurfaceMutation::RemoveLayer(id.to_string()));
        Ok(())
    }

    fn set_interaction(&self, interaction: Interaction, enabled: bool) {
        let mut state = self.state.lock();
        state.disabled_interactions.retain(|i| *i != interaction);
        if !enabled {
            state.disabled_interactions.push(interaction);
        }
    }
}
