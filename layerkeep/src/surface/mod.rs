//! The rendering surface the engine reconciles against.
//!
//! The surface owns the real layer and source objects. The engine never
//! trusts its own cached beliefs over what the surface reports: validation
//! always re-queries it.
//!
//! The trait exposes exactly the capability set the engine consumes. Each
//! concrete map library gets one adapter implementing [`MapSurface`];
//! [`InMemorySurface`] is the headless adapter used by tests and the CLI.
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`, but callers guarantee that at most
//! one mutation is in flight at a time (all mutations go through the
//! operation queue's single drain loop).

mod memory;

pub use memory::{InMemorySurface, SurfaceMutation};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{LayerDescriptor, LayerKind, SourceKind, Visibility, VISIBILITY_PROPERTY};

/// Errors reported by a surface adapter.
///
/// Adapters that can tell what went wrong return a structured variant. Many
/// map libraries only throw free-form messages; those arrive as
/// [`SurfaceError::Message`] and are classified by text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// The style has not finished loading.
    #[error("style is not loaded")]
    StyleNotLoaded,

    /// The layer does not exist on the surface.
    #[error("layer '{0}' does not exist")]
    LayerNotFound(String),

    /// The source does not exist on the surface.
    #[error("source '{0}' does not exist")]
    SourceNotFound(String),

    /// Unstructured error text from the underlying library.
    #[error("{0}")]
    Message(String),
}

/// Pointer/gesture interactions the engine may suspend during bulk updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Interaction {
    DragPan,
    ScrollZoom,
}

impl Interaction {
    pub const ALL: [Interaction; 2] = [Interaction::DragPan, Interaction::ScrollZoom];
}

/// A layer as it exists (or will exist) on the surface.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerDefinition {
    pub id: String,
    pub kind: LayerKind,
    pub source: Option<String>,
    pub layout: Map<String, Value>,
    pub paint: Value,
    pub z_order: i32,
}

impl LayerDefinition {
    /// Builds a surface definition from a catalog descriptor.
    pub fn from_descriptor(descriptor: &LayerDescriptor, visibility: Visibility) -> Self {
        let mut layout = Map::new();
        layout.insert(VISIBILITY_PROPERTY.to_string(), visibility.to_value());
        Self {
            id: descriptor.id.clone(),
            kind: descriptor.kind,
            source: descriptor.source_id.clone(),
            layout,
            paint: descriptor.paint.clone(),
            z_order: descriptor.z_order,
        }
    }

    /// Layout visibility of this definition.
    pub fn visibility(&self) -> Visibility {
        Visibility::from_layout(self.layout.get(VISIBILITY_PROPERTY))
    }
}

/// The external, stateful rendering surface.
pub trait MapSurface: Send + Sync {
    /// Returns true once the style is loaded and mutations are accepted.
    fn is_style_loaded(&self) -> bool;

    /// Looks up a layer by id.
    fn get_layer(&self, id: &str) -> Option<LayerDefinition>;

    /// Looks up a source by id.
    fn get_source(&self, id: &str) -> Option<SourceKind>;

    /// Ids of all layers currently on the surface, in draw order.
    fn layer_ids(&self) -> Vec<String>;

    /// Reads a layout property of a layer.
    fn get_layout_property(&self, layer_id: &str, key: &str) -> Option<Value>;

    /// Writes a layout property of a layer.
    fn set_layout_property(&self, layer_id: &str, key: &str, value: Value)
        -> Result<(), SurfaceError>;

    /// Adds a layer.
    fn add_layer(&self, definition: LayerDefinition) -> Result<(), SurfaceError>;

    /// Adds a source.
    fn add_source(&self, id: &str, source: SourceKind) -> Result<(), SurfaceError>;

    /// Removes a layer.
    fn remove_layer(&self, id: &str) -> Result<(), SurfaceError>;

    /// Enables or disables a pointer interaction.
    fn set_interaction(&self, interaction: Interaction, enabled: bool);

    /// Returns true if the layer exists.
    fn has_layer(&self, id: &str) -> bool {
        self.get_layer(id).is_some()
    }

    /// Returns true if the source exists.
    fn has_source(&self, id: &str) -> bool {
        self.get_source(id).is_some()
    }

    /// Current layout visibility, or `None` if the layer does not exist.
    fn visibility(&self, layer_id: &str) -> Option<Visibility> {
        if !self.has_layer(layer_id) {
            return None;
        }
        let value = self.get_layout_property(layer_id, VISIBILITY_PROPERTY);
        Some(Visibility::from_layout(value.as_ref()))
    }
}
