//! Catalog types: layer and source descriptors.
//!
//! Descriptors describe the layers and sources that *could* exist on the map
//! surface. They are registered once at startup and never change afterwards;
//! what is actually realized on the surface is tracked separately.
//!
//! # Example
//!
//! ```
//! use layerkeep::types::{LayerCategory, LayerDescriptor, SourceDescriptor};
//!
//! let source = SourceDescriptor::geojson("zones", serde_json::json!({
//!     "type": "FeatureCollection",
//!     "features": []
//! }));
//! let layer = LayerDescriptor::new("zones-fill", "Zones", LayerCategory::Zones)
//!     .with_source("zones");
//!
//! assert_eq!(layer.source_id.as_deref(), Some(source.id.as_str()));
//! assert!(!layer.visible);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Layer Descriptors
// =============================================================================

/// Broad grouping of layers used by the policy layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerCategory {
    /// Street/vector base map.
    Base,
    /// Satellite imagery base map.
    Satellite,
    /// Satellite imagery with labels on top.
    Hybrid,
    /// Terrain/hillshade base map.
    Terrain,
    /// Application data (vehicles, stops, routes).
    Data,
    /// Zone polygons.
    Zones,
    /// Anything drawn above the data layers.
    Overlay,
}

impl LayerCategory {
    /// Categories that compete for the base-map slot.
    pub const BASE_CATEGORIES: [LayerCategory; 4] = [
        LayerCategory::Base,
        LayerCategory::Satellite,
        LayerCategory::Hybrid,
        LayerCategory::Terrain,
    ];

    /// Returns true if this category is one of the base-map categories.
    pub fn is_base(&self) -> bool {
        Self::BASE_CATEGORIES.contains(self)
    }

    /// Lower-case name, as used in catalogs.
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerCategory::Base => "base",
            LayerCategory::Satellite => "satellite",
            LayerCategory::Hybrid => "hybrid",
            LayerCategory::Terrain => "terrain",
            LayerCategory::Data => "data",
            LayerCategory::Zones => "zones",
            LayerCategory::Overlay => "overlay",
        }
    }
}

impl fmt::Display for LayerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendering primitive of a layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    #[default]
    Fill,
    Line,
    Circle,
    Symbol,
    Raster,
    Heatmap,
    Background,
}

/// Static description of a layer that may be realized on the surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    /// Unique layer id.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Category used by base-layer and zones policies.
    pub category: LayerCategory,

    /// Rendering primitive.
    #[serde(default)]
    pub kind: LayerKind,

    /// Source this layer renders from, if any.
    #[serde(default, rename = "source")]
    pub source_id: Option<String>,

    /// Layers that must exist on the surface before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Additional sources that must exist before this layer is shown.
    #[serde(default)]
    pub required_sources: Vec<String>,

    /// Desired visibility when nothing else has been requested.
    #[serde(default)]
    pub visible: bool,

    /// Stacking order (higher draws on top).
    #[serde(default)]
    pub z_order: i32,

    /// Background layers carry no source.
    #[serde(default)]
    pub is_background: bool,

    /// Opaque paint properties handed to the surface as-is.
    #[serde(default)]
    pub paint: serde_json::Value,
}

impl LayerDescriptor {
    /// Creates a hidden, source-less fill layer.
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: LayerCategory) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            kind: LayerKind::default(),
            source_id: None,
            dependencies: Vec::new(),
            required_sources: Vec::new(),
            visible: false,
            z_order: 0,
            is_background: false,
            paint: serde_json::Value::Null,
        }
    }

    /// Sets the source this layer renders from.
    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Adds a layer dependency.
    pub fn with_dependency(mut self, layer_id: impl Into<String>) -> Self {
        self.dependencies.push(layer_id.into());
        self
    }

    /// Adds an extra required source.
    pub fn with_required_source(mut self, source_id: impl Into<String>) -> Self {
        self.required_sources.push(source_id.into());
        self
    }

    /// Sets the desired-visible flag.
    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Sets the rendering primitive.
    pub fn with_kind(mut self, kind: LayerKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the stacking order.
    pub fn with_z_order(mut self, z_order: i32) -> Self {
        self.z_order = z_order;
        self
    }

    /// Marks the layer as a background layer.
    pub fn background(mut self) -> Self {
        self.is_background = true;
        self.kind = LayerKind::Background;
        self
    }

    /// All sources this layer needs: its own source followed by the extra
    /// required ones, without duplicates.
    pub fn all_sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = Vec::new();
        let own = self.source_id.as_deref().into_iter();
        for id in own.chain(self.required_sources.iter().map(String::as_str)) {
            if !sources.contains(&id) {
                sources.push(id);
            }
        }
        sources
    }
}

// =============================================================================
// Source Descriptors
// =============================================================================

/// Point clustering settings for GeoJSON sources.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster radius in pixels.
    pub radius: u32,
    /// Maximum zoom at which points are clustered.
    pub max_zoom: u8,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            radius: 50,
            max_zoom: 14,
        }
    }
}

/// Type-specific source payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceKind {
    /// Inline GeoJSON data.
    #[serde(rename = "geojson")]
    GeoJson {
        #[serde(default)]
        data: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cluster: Option<ClusterConfig>,
    },
    /// Raster tiles.
    Raster {
        #[serde(default)]
        tiles: Vec<String>,
        #[serde(default = "default_tile_size")]
        tile_size: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// Vector tiles.
    Vector {
        #[serde(default)]
        tiles: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
}

fn default_tile_size() -> u32 {
    256
}

impl SourceKind {
    /// Short type name (`geojson`, `raster`, `vector`).
    pub fn type_name(&self) -> &'static str {
        match self {
            SourceKind::GeoJson { .. } => "geojson",
            SourceKind::Raster { .. } => "raster",
            SourceKind::Vector { .. } => "vector",
        }
    }

    /// Tiled sources need either a tile template or a TileJSON url.
    pub fn has_location(&self) -> bool {
        match self {
            SourceKind::GeoJson { .. } => true,
            SourceKind::Raster { tiles, url, .. } | SourceKind::Vector { tiles, url } => {
                !tiles.is_empty() || url.is_some()
            }
        }
    }
}

/// Static description of a data source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Unique source id.
    pub id: String,

    /// Source payload.
    #[serde(flatten)]
    pub kind: SourceKind,
}

impl SourceDescriptor {
    /// Creates a GeoJSON source with inline data.
    pub fn geojson(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind: SourceKind::GeoJson {
                data,
                cluster: None,
            },
        }
    }

    /// Creates a raster source from a tile template.
    pub fn raster(id: impl Into<String>, tile_template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SourceKind::Raster {
                tiles: vec![tile_template.into()],
                tile_size: default_tile_size(),
                url: None,
            },
        }
    }

    /// Creates a vector source from a TileJSON url.
    pub fn vector(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SourceKind::Vector {
                tiles: Vec::new(),
                url: Some(url.into()),
            },
        }
    }

    /// Enables clustering on a GeoJSON source. No effect on other kinds.
    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        if let SourceKind::GeoJson { cluster: slot, .. } = &mut self.kind {
            *slot = Some(cluster);
        }
        self
    }
}

/// A full catalog as loaded from JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerCatalog {
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
    #[serde(default)]
    pub layers: Vec<LayerDescriptor>,
}

impl LayerCatalog {
    /// Parses a catalog from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

// =============================================================================
// Visibility
// =============================================================================

/// Name of the layout property carrying visibility.
pub const VISIBILITY_PROPERTY: &str = "visibility";

/// Layout visibility as understood by the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Visibility {
    Visible,
    None,
}

impl Visibility {
    /// Converts a boolean "visible" flag.
    pub fn from_flag(visible: bool) -> Self {
        if visible {
            Visibility::Visible
        } else {
            Visibility::None
        }
    }

    /// Returns true for [`Visibility::Visible`].
    pub fn is_visible(&self) -> bool {
        matches!(self, Visibility::Visible)
    }

    /// Layout value string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Visible => "visible",
            Visibility::None => "none",
        }
    }

    /// Layout value as JSON.
    pub fn to_value(self) -> serde_json::Value {
        serde_json::Value::String(self.as_str().to_string())
    }

    /// Parses a layout value. A missing value means visible.
    pub fn from_layout(value: Option<&serde_json::Value>) -> Self {
        match value.and_then(|v| v.as_str()) {
            Some("none") => Visibility::None,
            _ => Visibility::Visible,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
