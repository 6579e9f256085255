//! Priority-ordered, bounded queue of surface operations.
//!
//! Every mutation of the surface goes through [`OperationQueue`], which
//! serializes them through a single drain loop and only drains while the
//! surface reports ready.
//!
//! # Architecture
//!
//! ```text
//! enqueue/submit ──► PendingOperations ──► drain loop ──► OperationExecutor ──► MapSurface
//!                    (priority, FIFO)      (one at a       (SurfaceExecutor)
//!                                           time)
//!                          ▲                    │
//!                          └── retry (delay) ◄──┘  RetryBudget::assess
//! ```
//!
//! Readiness is an explicit signal ([`OperationQueue::set_surface_ready`]);
//! becoming ready triggers a drain.
//!
//! # Example
//!
//! ```ignore
//! use layerkeep::queue::{Operation, OperationQueue, OperationQueueConfig};
//!
//! let queue = OperationQueue::new(OperationQueueConfig::default(), executor);
//! queue.enqueue(Operation::remove("old"))?;
//! queue.enqueue(Operation::add_layer("new", true))?;
//!
//! // The add commits before the remove
//! queue.set_surface_ready(true).await;
//! ```

mod executor;
mod operation;
mod operation_queue;
mod pending;
mod policy;

pub use executor::{OperationExecutor, SurfaceExecutor};
pub use operation::{ExecutionReport, Operation, OperationId, OperationKind, OperationOutcome};
pub use operation_queue::{
    DrainReport, OperationQueue, OperationQueueConfig, OperationTicket, QueueStatus,
    DEFAULT_MAX_QUEUE_SIZE, DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_READY_TIMEOUT_SECS,
};
pub use pending::{PendingOperations, QueuedOperation};
pub use policy::{
    Priority, RetryBudget, RetryDecision, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS,
};
