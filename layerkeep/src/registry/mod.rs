//! Static catalog of layer and source descriptors.
//!
//! The registry answers "what layers could exist" independently of "what is
//! live on the surface", so dependency checks happen before any expensive,
//! non-reentrant surface call.
//!
//! Lookups by id are O(1). Derived queries (by category, by source,
//! dependents) are linear scans in registration order.
//!
//! # Example
//!
//! ```
//! use layerkeep::registry::{LayerRegistry, RegistryConfig};
//! use layerkeep::types::{LayerCategory, LayerDescriptor, SourceDescriptor};
//!
//! let mut registry = LayerRegistry::new(RegistryConfig::default());
//! registry.register_source(SourceDescriptor::geojson("zones", serde_json::json!({}))).unwrap();
//! registry
//!     .register_layer(
//!         LayerDescriptor::new("zones-fill", "Zones", LayerCategory::Zones).with_source("zones"),
//!     )
//!     .unwrap();
//!
//! assert!(registry.has_layer("zones-fill"));
//! assert!(registry.validate_all().is_empty());
//! ```

mod error;
mod graph;

pub use error::{RegistryError, RegistryIssue};

use std::collections::HashMap;

use crate::types::{LayerCatalog, LayerCategory, LayerDescriptor, SourceDescriptor};

/// Registry behavior switches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Check referenced sources/dependencies exist when registering.
    ///
    /// Default: true.
    pub validate_on_registration: bool,

    /// Replace an existing descriptor instead of rejecting the duplicate.
    ///
    /// Default: false.
    pub allow_duplicate_ids: bool,

    /// Reject descriptors that would only produce warnings otherwise.
    ///
    /// Default: false.
    pub strict_mode: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            validate_on_registration: true,
            allow_duplicate_ids: false,
            strict_mode: false,
        }
    }
}

/// The layer/source catalog.
#[derive(Debug, Default)]
pub struct LayerRegistry {
    config: RegistryConfig,
    layers: HashMap<String, LayerDescriptor>,
    sources: HashMap<String, SourceDescriptor>,
    layer_order: Vec<String>,
    source_order: Vec<String>,
}

impl LayerRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Builds a registry from a catalog: sources first, then layers in
    /// dependency order.
    ///
    /// Stops at the first descriptor that fails to register.
    pub fn from_catalog(
        catalog: &LayerCatalog,
        config: RegistryConfig,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new(config);
        for source in &catalog.sources {
            registry.register_source(source.clone())?;
        }
        for layer in graph::dependency_order(&catalog.layers) {
            registry.register_layer(layer.clone())?;
        }
        Ok(registry)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a source.
    pub fn register_source(&mut self, source: SourceDescriptor) -> Result<(), RegistryError> {
        if source.id.trim().is_empty() {
            return Err(RegistryError::MissingField {
                entity: "source",
                id: source.id,
                field: "id",
            });
        }
        if !source.kind.has_location() {
            return Err(RegistryError::MissingLocation { id: source.id });
        }
        if self.sources.contains_key(&source.id) {
            if !self.config.allow_duplicate_ids {
                return Err(RegistryError::Duplicate {
                    entity: "source",
                    id: source.id,
                });
            }
            tracing::debug!(source_id = %source.id, "Replacing registered source");
        } else {
            self.source_order.push(source.id.clone());
        }

        tracing::trace!(source_id = %source.id, kind = source.kind.type_name(), "Registered source");
        self.sources.insert(source.id.clone(), source);
        Ok(())
    }

    /// Registers a layer.
    pub fn register_layer(&mut self, layer: LayerDescriptor) -> Result<(), RegistryError> {
        self.check_required_fields(&layer)?;

        if self.layers.contains_key(&layer.id) && !self.config.allow_duplicate_ids {
            return Err(RegistryError::Duplicate {
                entity: "layer",
                id: layer.id,
            });
        }

        if self.config.validate_on_registration {
            self.check_references(&layer)?;
        }

        if let Some(path) = graph::find_cycle(&layer, &self.layers) {
            return Err(RegistryError::DependencyCycle { path });
        }

        if self.config.strict_mode {
            if let Some(warning) = Self::layer_warnings(&layer).into_iter().next() {
                return Err(RegistryError::Strict(warning));
            }
        }

        if !self.layers.contains_key(&layer.id) {
            self.layer_order.push(layer.id.clone());
        } else {
            tracing::debug!(layer_id = %layer.id, "Replacing registered layer");
        }
        tracing::trace!(layer_id = %layer.id, category = %layer.category, "Registered layer");
        self.layers.insert(layer.id.clone(), layer);
        Ok(())
    }

    fn check_required_fields(&self, layer: &LayerDescriptor) -> Result<(), RegistryError> {
        if layer.id.trim().is_empty() {
            return Err(RegistryError::MissingField {
                entity: "layer",
                id: layer.id.clone(),
                field: "id",
            });
        }
        if layer.name.trim().is_empty() {
            return Err(RegistryError::MissingField {
                entity: "layer",
                id: layer.id.clone(),
                field: "name",
            });
        }
        Ok(())
    }

    fn check_references(&self, layer: &LayerDescriptor) -> Result<(), RegistryError> {
        for source_id in layer.all_sources() {
            if !self.sources.contains_key(source_id) {
                return Err(RegistryError::UnknownSource {
                    layer_id: layer.id.clone(),
                    source_id: source_id.to_string(),
                });
            }
        }
        for dependency in &layer.dependencies {
            // Self-dependencies are reported as cycles instead.
            if dependency != &layer.id && !self.layers.contains_key(dependency) {
                return Err(RegistryError::UnknownDependency {
                    layer_id: layer.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
        Ok(())
    }

    fn layer_warnings(layer: &LayerDescriptor) -> Vec<String> {
        let mut warnings = Vec::new();
        if layer.source_id.is_none() && !layer.is_background {
            warnings.push(format!(
                "layer '{}' has no source and is not a background layer",
                layer.id
            ));
        }
        if layer.is_background && layer.source_id.is_some() {
            warnings.push(format!(
                "background layer '{}' should not reference a source",
                layer.id
            ));
        }
        warnings
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn get_layer(&self, id: &str) -> Option<&LayerDescriptor> {
        self.layers.get(id)
    }

    pub fn get_source(&self, id: &str) -> Option<&SourceDescriptor> {
        self.sources.get(id)
    }

    pub fn has_layer(&self, id: &str) -> bool {
        self.layers.contains_key(id)
    }

    pub fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    /// All layers in registration order.
    pub fn layers(&self) -> impl Iterator<Item = &LayerDescriptor> {
        self.layer_order.iter().filter_map(|id| self.layers.get(id))
    }

    /// All sources in registration order.
    pub fn sources(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.source_order.iter().filter_map(|id| self.sources.get(id))
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn layers_by_category(&self, category: LayerCategory) -> Vec<&LayerDescriptor> {
        self.layers().filter(|l| l.category == category).collect()
    }

    /// Layers that need `source_id`, either as their own source or as an
    /// extra required source.
    pub fn layers_by_source(&self, source_id: &str) -> Vec<&LayerDescriptor> {
        self.layers()
            .filter(|l| l.all_sources().contains(&source_id))
            .collect()
    }

    /// Layers that list `layer_id` as a direct dependency.
    pub fn dependent_layers(&self, layer_id: &str) -> Vec<&LayerDescriptor> {
        self.layers()
            .filter(|l| l.dependencies.iter().any(|d| d == layer_id))
            .collect()
    }

    /// Sources a layer needs on the surface before it can be added.
    ///
    /// Empty for unregistered layers.
    pub fn required_sources_of(&self, layer_id: &str) -> Vec<&str> {
        self.layers
            .get(layer_id)
            .map(LayerDescriptor::all_sources)
            .unwrap_or_default()
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Re-checks the whole catalog.
    ///
    /// Never fails; returns every finding instead.
    pub fn validate_all(&self) -> Vec<RegistryIssue> {
        let mut issues = Vec::new();

        for source in self.sources() {
            if !source.kind.has_location() {
                issues.push(RegistryIssue::error(
                    &source.id,
                    &RegistryError::MissingLocation {
                        id: source.id.clone(),
                    },
                ));
            }
        }

        for layer in self.layers() {
            if let Err(error) = self.check_required_fields(layer) {
                issues.push(RegistryIssue::error(&layer.id, &error));
            }
            for source_id in layer.all_sources() {
                if !self.sources.contains_key(source_id) {
                    issues.push(RegistryIssue::error(
                        &layer.id,
                        &RegistryError::UnknownSource {
                            layer_id: layer.id.clone(),
                            source_id: source_id.to_string(),
                        },
                    ));
                }
            }
            for dependency in &layer.dependencies {
                if dependency != &layer.id && !self.layers.contains_key(dependency) {
                    issues.push(RegistryIssue::error(
                        &layer.id,
                        &RegistryError::UnknownDependency {
                            layer_id: layer.id.clone(),
                            dependency: dependency.clone(),
                        },
                    ));
                }
            }
            if let Some(path) = graph::find_cycle(layer, &self.layers) {
                issues.push(RegistryIssue::error(
                    &layer.id,
                    &RegistryError::DependencyCycle { path },
                ));
            }
            for warning in Self::layer_warnings(layer) {
                issues.push(RegistryIssue::warning(&layer.id, warning));
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn zones_source() -> SourceDescriptor {
        SourceDescriptor::geojson("zones", json!({"type": "FeatureCollection", "features": []}))
    }

    fn zones_layer() -> LayerDescriptor {
        LayerDescriptor::new("zones-fill", "Zones", LayerCategory::Zones).with_source("zones")
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = LayerRegistry::default();
        registry.register_source(zones_source()).unwrap();
        registry.register_layer(zones_layer()).unwrap();

        assert!(registry.has_source("zones"));
        assert_eq!(registry.get_layer("zones-fill").unwrap().name, "Zones");
        assert_eq!(registry.layers_by_source("zones").len(), 1);
        assert_eq!(registry.layers_by_category(LayerCategory::Zones).len(), 1);
        assert!(registry.layers_by_category(LayerCategory::Base).is_empty());
        assert_eq!(registry.required_sources_of("zones-fill"), vec!["zones"]);
        assert!(registry.required_sources_of("nope").is_empty());
    }

    #[test]
    fn test_rejects_unknown_source() {
        let mut registry = LayerRegistry::new(RegistryConfig::default());
        let err = registry.register_layer(zones_layer()).unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownSource {
                layer_id: "zones-fill".into(),
                source_id: "zones".into()
            }
        );
        assert_eq!(registry.layer_count(), 0);
    }

    #[test]
    fn test_validation_disabled_defers_to_validate_all() {
        let mut registry = LayerRegistry::new(RegistryConfig {
            validate_on_registration: false,
            ..Default::default()
        });
        registry.register_layer(zones_layer()).unwrap();

        let issues = registry.validate_all();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_error());
        assert!(issues[0].message.contains("unknown source 'zones'"));
    }

    #[test]
    fn test_duplicates() {
        let mut registry = LayerRegistry::new(RegistryConfig::default());
        registry.register_source(zones_source()).unwrap();
        assert!(matches!(
            registry.register_source(zones_source()),
            Err(RegistryError::Duplicate { entity: "source", .. })
        ));

        let mut lenient = LayerRegistry::new(RegistryConfig {
            allow_duplicate_ids: true,
            ..Default::default()
        });
        lenient.register_source(zones_source()).unwrap();
        lenient.register_source(zones_source()).unwrap();
        lenient.register_layer(zones_layer()).unwrap();
        lenient
            .register_layer(zones_layer().visible(true))
            .unwrap();
        assert_eq!(lenient.source_count(), 1);
        assert_eq!(lenient.layer_count(), 1);
        assert!(lenient.get_layer("zones-fill").unwrap().visible);
    }

    #[test]
    fn test_missing_fields() {
        let mut registry = LayerRegistry::new(RegistryConfig::default());
        let err = registry
            .register_layer(LayerDescriptor::new("a", " ", LayerCategory::Data))
            .unwrap_err();
        assert!(matches!(err, RegistryError::MissingField { field: "name", .. }));

        let err = registry
            .register_source(SourceDescriptor {
                id: "tiles".into(),
                kind: crate::types::SourceKind::Raster {
                    tiles: vec![],
                    tile_size: 256,
                    url: None,
                },
            })
            .unwrap_err();
        assert_eq!(err, RegistryError::MissingLocation { id: "tiles".into() });
    }

    #[test]
    fn test_cycle_rejected_at_registration() {
        let mut registry = LayerRegistry::new(RegistryConfig {
            validate_on_registration: false,
            ..Default::default()
        });
        registry
            .register_layer(LayerDescriptor::new("a", "A", LayerCategory::Data).with_dependency("b"))
            .unwrap();
        let err = registry
            .register_layer(LayerDescriptor::new("b", "B", LayerCategory::Data).with_dependency("a"))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DependencyCycle {
                path: vec!["b".into(), "a".into(), "b".into()]
            }
        );
        assert!(!registry.has_layer("b"));
    }

    #[test]
    fn test_dependent_layers() {
        let mut registry = LayerRegistry::new(RegistryConfig::default());
        registry
            .register_layer(LayerDescriptor::new("roads", "Roads", LayerCategory::Base))
            .unwrap();
        registry
            .register_layer(
                LayerDescriptor::new("labels", "Labels", LayerCategory::Overlay)
                    .with_dependency("roads"),
            )
            .unwrap();
        let dependents: Vec<&str> = registry
            .dependent_layers("roads")
            .iter()
            .map(|l| l.id.as_str())
            .collect();
        assert_eq!(dependents, vec!["labels"]);
    }

    #[test]
    fn test_strict_mode_rejects_sourceless_layer() {
        let mut registry = LayerRegistry::new(RegistryConfig {
            strict_mode: true,
            ..Default::default()
        });
        let err = registry
            .register_layer(LayerDescriptor::new("a", "A", LayerCategory::Data))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Strict(_)));

        registry
            .register_layer(LayerDescriptor::new("bg", "Background", LayerCategory::Base).background())
            .unwrap();
    }

    #[test]
    fn test_validate_all_warnings() {
        let mut registry = LayerRegistry::new(RegistryConfig::default());
        registry
            .register_layer(LayerDescriptor::new("a", "A", LayerCategory::Data))
            .unwrap();
        let issues = registry.validate_all();
        assert_eq!(issues.len(), 1);
        assert!(!issues[0].is_error());
    }

    #[test]
    fn test_from_catalog_orders_dependencies() {
        let catalog = LayerCatalog {
            sources: vec![zones_source()],
            layers: vec![
                LayerDescriptor::new("zones-line", "Zone outlines", LayerCategory::Zones)
                    .with_source("zones")
                    .with_dependency("zones-fill"),
                zones_layer(),
            ],
        };
        let registry = LayerRegistry::from_catalog(&catalog, RegistryConfig::default()).unwrap();
        let ids: Vec<&str> = registry.layers().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["zones-fill", "zones-line"]);
    }
}
