//! Layer orchestration.
//!
//! [`LayerOrchestrator`] is the facade callers talk to. It turns a request
//! like "show `zones-fill`" into the ordered surface mutations needed to get
//! there:
//!
//! ```text
//!   set_layer_visibility("labels", true)
//!          │
//!          ▼
//!   ┌───────────────┐   absent?   ┌─────────────────────────────────┐
//!   │ dependency    │────────────►│ dependencies → sources → layer  │
//!   │ check         │             │ (each submitted to the queue)   │
//!   └──────┬────────┘             └─────────────────────────────────┘
//!          │ surface already matches? → done, changed = false
//!          ▼
//!   ┌───────────────┐  failure    ┌───────────────┐
//!   │ queue: show   │────────────►│ ErrorHandler  │── repaired → retry once
//!   └──────┬────────┘             └───────────────┘
//!          ▼
//!   believed state updated
//! ```
//!
//! # Example
//!
//! ```ignore
//! let orchestrator = LayerOrchestrator::new(registry, surface, &EngineConfig::default());
//! orchestrator.on_style_loaded().await;
//!
//! let result = orchestrator.set_layer_visibility("zones-fill", true).await;
//! assert!(result.success);
//! ```

mod engine;
mod types;

pub use engine::LayerOrchestrator;
pub use types::{
    BatchOptions, BatchResult, BatchSummary, LayerOperationResult, OperationPhase,
    VisibilityChange,
};
