//! layerkeep - layer-state reconciliation for interactive maps
//!
//! Turns declarative intents ("show this layer", "switch to satellite",
//! "toggle zones") into safe, ordered mutations against an external map
//! surface whose readiness is asynchronous and whose actual state can drift
//! from what the application believes it set.
//!
//! # Architecture
//!
//! ```text
//!   MapLayerPolicy ──► LayerOrchestrator ──► OperationQueue ──► MapSurface
//!                        │        │              │
//!                        │        │              └─► ErrorHandler (strategy table)
//!                        │        └─► LayerRegistry (descriptors, dependencies)
//!                        └─► StateValidator (drift detection, auto-fix)
//!
//!   PerformanceMonitor records timings throughout.
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use layerkeep::config::EngineConfig;
//! use layerkeep::orchestrator::LayerOrchestrator;
//! use layerkeep::registry::{LayerRegistry, RegistryConfig};
//! use layerkeep::surface::InMemorySurface;
//! use layerkeep::types::{LayerCategory, LayerDescriptor, SourceDescriptor};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let mut registry = LayerRegistry::new(RegistryConfig::default());
//! registry.register_source(SourceDescriptor::geojson("zones", serde_json::json!({}))).unwrap();
//! registry
//!     .register_layer(LayerDescriptor::new("zones-fill", "Zones", LayerCategory::Zones).with_source("zones"))
//!     .unwrap();
//!
//! let surface = Arc::new(InMemorySurface::loaded());
//! let orchestrator = LayerOrchestrator::new(registry, surface, &EngineConfig::default());
//!
//! let result = orchestrator.set_layer_visibility("zones-fill", true).await;
//! assert!(result.success);
//! assert!(orchestrator.state().is_visible("zones-fill"));
//! # });
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod policy;
pub mod queue;
pub mod registry;
pub mod state;
pub mod surface;
pub mod telemetry;
pub mod types;
pub mod validator;

pub use config::{ConfigError, EngineConfig};
pub use error::{ErrorKind, LayerError, LayerResult};
pub use orchestrator::{BatchOptions, BatchResult, LayerOperationResult, LayerOrchestrator, VisibilityChange};
pub use policy::{BaseLayer, MapLayerPolicy, PolicyConfig};
pub use registry::LayerRegistry;
pub use state::LayerState;
pub use surface::{InMemorySurface, MapSurface};
