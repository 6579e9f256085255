//! Pending operations, ordered for draining.
//!
//! Operations are ordered by:
//! 1. Priority (descending): adds before shows before removes
//! 2. Enqueue order (ascending): FIFO within the same priority
//!
//! The list is a `Vec` kept sorted with a stable sort on insert, so items can
//! also be removed from the middle (cancellation, delayed retries, eviction).
//! Not thread-safe; the queue wraps it in a mutex.

use std::cmp::Reverse;
use std::fmt;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::operation::{Operation, OperationId, OperationOutcome};
use super::policy::Priority;

// =============================================================================
// Queued Operation
// =============================================================================

/// An operation waiting to be executed.
pub struct QueuedOperation {
    pub id: OperationId,
    pub operation: Operation,
    pub priority: Priority,
    /// Enqueue time; refreshed on retry.
    pub enqueued_at: Instant,
    /// Executions so far that ended in a retryable failure.
    pub retry_count: u32,
    /// Earliest time a retry may run.
    pub not_before: Option<Instant>,
    completion: Option<oneshot::Sender<OperationOutcome>>,
}

impl QueuedOperation {
    pub(crate) fn new(
        id: OperationId,
        operation: Operation,
        completion: oneshot::Sender<OperationOutcome>,
    ) -> Self {
        Self {
            id,
            priority: Priority::for_kind(operation.kind()),
            operation,
            enqueued_at: Instant::now(),
            retry_count: 0,
            not_before: None,
            completion: Some(completion),
        }
    }

    /// How long the operation has been waiting since it was (re-)enqueued.
    pub fn wait_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.enqueued_at)
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |at| at <= now)
    }

    /// Prepares the operation for another attempt after `delay`.
    pub(crate) fn into_retry(mut self, delay: Duration, now: Instant) -> Self {
        self.retry_count += 1;
        self.enqueued_at = now;
        self.not_before = Some(now + delay);
        self
    }

    /// Delivers the final outcome to whoever holds the ticket.
    pub(crate) fn complete(mut self, outcome: OperationOutcome) {
        if let Some(tx) = self.completion.take() {
            // The caller may have given up already
            let _ = tx.send(outcome);
        }
    }
}

impl fmt::Debug for QueuedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedOperation")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("priority", &self.priority)
            .field("retry_count", &self.retry_count)
            .field("not_before", &self.not_before)
            .finish()
    }
}

// =============================================================================
// Pending Operations
// =============================================================================

/// Priority-ordered list of queued operations.
#[derive(Debug, Default)]
pub struct PendingOperations {
    items: Vec<QueuedOperation>,
}

impl PendingOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends and restores priority order.
    pub fn push(&mut self, operation: QueuedOperation) {
        self.items.push(operation);
        self.items.sort_by_key(|op| Reverse(op.priority));
    }

    /// Removes the first operation in drain order that is ready to run.
    pub fn pop_ready(&mut self, now: Instant) -> Option<QueuedOperation> {
        let index = self.items.iter().position(|op| op.is_ready(now))?;
        Some(self.items.remove(index))
    }

    /// Earliest time a delayed retry becomes ready.
    pub fn next_ready_at(&self) -> Option<Instant> {
        self.items.iter().filter_map(|op| op.not_before).min()
    }

    /// Removes operations that waited longer than `timeout`.
    pub fn take_expired(&mut self, now: Instant, timeout: Duration) -> Vec<QueuedOperation> {
        if !self.items.iter().any(|op| op.wait_time(now) > timeout) {
            return Vec::new();
        }
        let (expired, kept) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|op| op.wait_time(now) > timeout);
        self.items = kept;
        expired
    }

    pub fn remove(&mut self, id: OperationId) -> Option<QueuedOperation> {
        let index = self.items.iter().position(|op| op.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn take_all(&mut self) -> Vec<QueuedOperation> {
        std::mem::take(&mut self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedOperation> {
        self.items.iter()
    }
}
