//! Scheduling priority and retry policy for queued operations.
//!
//! # Priority Levels
//!
//! | Kind   | Priority |
//! |--------|----------|
//! | add    | 10       |
//! | show   | 8        |
//! | hide   | 6        |
//! | update | 4        |
//! | remove | 2        |
//!
//! Adds run first so that a show queued right behind the add of its layer
//! finds the layer present.

use std::fmt;
use std::time::Duration;

use super::operation::OperationKind;
use crate::error::{LayerError, RecoveryStrategy};

// =============================================================================
// Priority Constants
// =============================================================================

pub const PRIORITY_ADD: i32 = 10;
pub const PRIORITY_SHOW: i32 = 8;
pub const PRIORITY_HIDE: i32 = 6;
pub const PRIORITY_UPDATE: i32 = 4;
pub const PRIORITY_REMOVE: i32 = 2;

// =============================================================================
// Retry Constants
// =============================================================================

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default minimum delay before a retry (100ms).
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;

/// Operation scheduling priority (higher runs first).
///
/// Operations are drained by priority, then FIFO within the same level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Priority(pub i32);

impl Priority {
    pub const ADD: Priority = Priority(PRIORITY_ADD);
    pub const SHOW: Priority = Priority(PRIORITY_SHOW);
    pub const HIDE: Priority = Priority(PRIORITY_HIDE);
    pub const UPDATE: Priority = Priority(PRIORITY_UPDATE);
    pub const REMOVE: Priority = Priority(PRIORITY_REMOVE);

    pub fn for_kind(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Add => Self::ADD,
            OperationKind::Show => Self::SHOW,
            OperationKind::Hide => Self::HIDE,
            OperationKind::Update => Self::UPDATE,
            OperationKind::Remove => Self::REMOVE,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to do with an operation after an execution attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    Success,
    /// Transient failure; re-enqueue after `delay`.
    Retryable { delay: Duration },
    /// Transient failure, but the retry budget is spent.
    Exhausted,
    /// Failure that retrying cannot fix.
    Fatal,
}

/// Retry budget applied by the drain loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryBudget {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Lower bound on the delay before a retry.
    pub retry_delay: Duration,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl RetryBudget {
    /// Classifies the result of an attempt.
    ///
    /// Only errors whose recovery strategy is a plain retry are retryable;
    /// the delay is the longer of the strategy's delay and `retry_delay`.
    pub fn assess<T>(&self, retry_count: u32, result: &Result<T, LayerError>) -> RetryDecision {
        let error = match result {
            Ok(_) => return RetryDecision::Success,
            Err(error) => error,
        };
        match RecoveryStrategy::for_kind(error.kind()).retry_delay() {
            None => RetryDecision::Fatal,
            Some(_) if retry_count >= self.max_retries => RetryDecision::Exhausted,
            Some(delay) => RetryDecision::Retryable {
                delay: delay.max(self.retry_delay),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert!(Priority::ADD > Priority::SHOW);
        assert!(Priority::SHOW > Priority::HIDE);
        assert!(Priority::HIDE > Priority::UPDATE);
        assert!(Priority::UPDATE > Priority::REMOVE);
        assert_eq!(Priority::for_kind(OperationKind::Remove), Priority(2));
    }

    #[test]
    fn test_assess_success() {
        let budget = RetryBudget::default();
        assert_eq!(budget.assess(0, &Ok::<(), _>(())), RetryDecision::Success);
    }

    #[test]
    fn test_assess_transient_until_exhausted() {
        let budget = RetryBudget::default();
        let timeout: Result<(), _> = Err(LayerError::OperationTimeout { elapsed_ms: 5 });

        assert_eq!(
            budget.assess(0, &timeout),
            RetryDecision::Retryable {
                delay: Duration::from_millis(500)
            }
        );
        assert_eq!(budget.assess(3, &timeout), RetryDecision::Exhausted);
    }

    #[test]
    fn test_assess_uses_longer_delay() {
        let budget = RetryBudget {
            max_retries: 1,
            retry_delay: Duration::from_millis(250),
        };
        let not_ready: Result<(), _> = Err(LayerError::SurfaceNotReady);
        assert_eq!(
            budget.assess(0, &not_ready),
            RetryDecision::Retryable {
                delay: Duration::from_millis(250)
            }
        );
    }

    #[test]
    fn test_assess_fatal() {
        let budget = RetryBudget::default();
        let missing: Result<(), _> = Err(LayerError::source_not_found("zones"));
        assert_eq!(budget.assess(0, &missing), RetryDecision::Fatal);
        let invalid: Result<(), _> = Err(LayerError::InvalidState("x".into()));
        assert_eq!(budget.assess(0, &invalid), RetryDecision::Fatal);
    }
}
