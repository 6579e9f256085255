//! Drift detection and repair.
//!
//! The surface can change behind the engine's back (a style reload, other
//! code calling the map directly). [`StateValidator`] compares what the
//! engine believes with what the surface reports and plans repairs:
//!
//! | Issue                     | Severity | Fix                          |
//! |---------------------------|----------|------------------------------|
//! | orphaned layer            | error    | remove the layer             |
//! | missing source            | error    | add the source               |
//! | missing layer             | warning  | add the layer, visible       |
//! | inconsistent visibility   | warning  | set the desired visibility   |
//!
//! Fixes run through the operation queue like any other mutation.

mod issues;
mod state_validator;

pub use issues::{AutoFixResult, FixOperation, IssueKind, Severity, ValidationIssue};
pub use state_validator::StateValidator;
