//! The bounded operation queue and its drain loop.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

use super::executor::OperationExecutor;
use super::operation::{ExecutionReport, Operation, OperationId, OperationOutcome};
use super::pending::{PendingOperations, QueuedOperation};
use super::policy::{RetryBudget, RetryDecision, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS};
use crate::error::{LayerError, LayerResult};

// =============================================================================
// Configuration
// =============================================================================

/// Default maximum number of pending operations.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

/// Default age after which a pending operation is evicted (30 seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Default time `submit` waits for the surface to become ready (10 seconds).
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 10;

/// Operation queue configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationQueueConfig {
    /// Retries after the first attempt for transient failures.
    ///
    /// Default: 3.
    pub max_retries: u32,

    /// Minimum delay before a retry.
    ///
    /// Default: 100ms.
    pub retry_delay: Duration,

    /// Maximum number of pending operations.
    ///
    /// Default: 100.
    pub max_queue_size: usize,

    /// Pending operations older than this are evicted. Also bounds how long
    /// `submit` waits for a queued operation to finish.
    ///
    /// Default: 30s.
    pub timeout: Duration,

    /// How long `submit` waits for the surface to become ready.
    ///
    /// Default: 10s.
    pub ready_timeout: Duration,
}

impl Default for OperationQueueConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
            ready_timeout: Duration::from_secs(DEFAULT_READY_TIMEOUT_SECS),
        }
    }
}

impl OperationQueueConfig {
    pub fn retry_budget(&self) -> RetryBudget {
        RetryBudget {
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
        }
    }
}

// =============================================================================
// Tickets and Reports
// =============================================================================

/// Handle to a queued operation's eventual outcome.
#[derive(Debug)]
pub struct OperationTicket {
    id: OperationId,
    receiver: oneshot::Receiver<OperationOutcome>,
}

impl OperationTicket {
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Waits for the operation to finish.
    ///
    /// Resolves to [`OperationOutcome::Cancelled`] if the queue is dropped.
    pub async fn wait(self) -> OperationOutcome {
        self.receiver.await.unwrap_or(OperationOutcome::Cancelled)
    }
}

/// Snapshot of the queue.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub size: usize,
    pub processing: bool,
    pub surface_ready: bool,
    /// Operation currently executing, if any.
    pub current_operation: Option<String>,
}

/// What one drain pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub committed: usize,
    pub failed: usize,
    pub evicted: usize,
    pub retried: usize,
    /// The pass ended with operations still pending because the surface
    /// stopped being ready.
    pub stopped_early: bool,
}

impl fmt::Display for DrainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} committed, {} failed, {} evicted, {} retried",
            self.committed, self.failed, self.evicted, self.retried
        )
    }
}

// =============================================================================
// Operation Queue
// =============================================================================

#[derive(Debug, Default)]
struct QueueInner {
    pending: PendingOperations,
    processing: bool,
    current: Option<String>,
}

enum NextStep {
    Run(QueuedOperation),
    WaitUntil(Instant),
    Stop,
}

/// Serializes all surface mutations through a single drain loop.
///
/// Operations are enqueued from any task; at most one drain runs at a time.
/// The mutex guarding the pending list is never held across an `.await` or
/// while an operation executes.
pub struct OperationQueue {
    config: OperationQueueConfig,
    executor: Arc<dyn OperationExecutor>,
    next_id: AtomicU64,
    inner: Mutex<QueueInner>,
    ready: watch::Sender<bool>,
}

impl fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("OperationQueue")
            .field("config", &self.config)
            .field("pending", &inner.pending.len())
            .field("processing", &inner.processing)
            .field("surface_ready", &*self.ready.borrow())
            .finish()
    }
}

impl OperationQueue {
    /// Creates a queue. The surface starts out not ready.
    pub fn new(config: OperationQueueConfig, executor: Arc<dyn OperationExecutor>) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            config,
            executor,
            next_id: AtomicU64::new(0),
            inner: Mutex::new(QueueInner::default()),
            ready,
        }
    }

    pub fn config(&self) -> &OperationQueueConfig {
        &self.config
    }

    /// Adds an operation without waiting for it.
    ///
    /// Fails with [`LayerError::QueueFull`] when `max_queue_size` operations
    /// are already pending; the queue is left untouched in that case.
    pub fn enqueue(&self, operation: Operation) -> LayerResult<OperationTicket> {
        let mut inner = self.inner.lock();
        if inner.pending.len() >= self.config.max_queue_size {
            tracing::warn!(
                operation = %operation,
                capacity = self.config.max_queue_size,
                "Operation queue full, rejecting"
            );
            return Err(LayerError::QueueFull {
                capacity: self.config.max_queue_size,
            });
        }

        let id = OperationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, receiver) = oneshot::channel();
        let queued = QueuedOperation::new(id, operation, tx);
        tracing::debug!(
            id = %id,
            operation = %queued.operation,
            priority = %queued.priority,
            queue_size = inner.pending.len() + 1,
            "Operation queued"
        );
        inner.pending.push(queued);
        Ok(OperationTicket { id, receiver })
    }

    /// Enqueues an operation and waits for its outcome.
    pub async fn submit(&self, operation: Operation) -> LayerResult<ExecutionReport> {
        let ticket = self.enqueue(operation)?;
        self.complete(ticket).await
    }

    /// Drives an enqueued operation to completion.
    ///
    /// Waits up to `ready_timeout` for the surface to become ready, then
    /// drains and waits up to `timeout` for the result. Giving up removes
    /// the operation if it is still pending.
    pub async fn complete(&self, ticket: OperationTicket) -> LayerResult<ExecutionReport> {
        let id = ticket.id();

        if !self.wait_until_ready().await {
            self.discard(id);
            tracing::warn!(id = %id, "Surface did not become ready in time");
            return Err(LayerError::SurfaceNotReady);
        }

        self.drain().await;

        match tokio::time::timeout(self.config.timeout, ticket.wait()).await {
            Ok(outcome) => outcome.into_result(),
            Err(_) => {
                self.discard(id);
                Err(LayerError::OperationTimeout {
                    elapsed_ms: self.config.timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn wait_until_ready(&self) -> bool {
        let mut receiver = self.ready.subscribe();
        let waited =
            tokio::time::timeout(self.config.ready_timeout, receiver.wait_for(|ready| *ready)).await;
        matches!(waited, Ok(Ok(_)))
    }

    /// Publishes surface readiness; becoming ready triggers a drain.
    pub async fn set_surface_ready(&self, ready: bool) -> DrainReport {
        self.publish_ready(ready);
        if ready {
            self.drain().await
        } else {
            DrainReport::default()
        }
    }

    /// Publishes surface readiness without draining.
    pub fn publish_ready(&self, ready: bool) {
        let previous = self.ready.send_replace(ready);
        if previous != ready {
            tracing::info!(ready, "Surface readiness changed");
        }
    }

    pub fn is_surface_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Executes pending operations in priority order until the queue is
    /// empty or the surface stops being ready.
    ///
    /// Returns immediately with an empty report if a drain is already
    /// running; that drain picks up anything enqueued meanwhile.
    pub async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();
        {
            let mut inner = self.inner.lock();
            if inner.processing {
                return report;
            }
            inner.processing = true;
        }

        let budget = self.config.retry_budget();
        loop {
            let step = self.next_step(&mut report);
            let queued = match step {
                NextStep::Run(queued) => queued,
                NextStep::WaitUntil(at) => {
                    tokio::time::sleep_until(at).await;
                    continue;
                }
                NextStep::Stop => break,
            };

            let result = self.executor.execute(&queued.operation);
            let attempts = queued.retry_count + 1;
            let decision = budget.assess(queued.retry_count, &result);
            self.inner.lock().current = None;

            match result {
                Ok(execution) => {
                    report.committed += 1;
                    queued.complete(OperationOutcome::Committed(execution));
                }
                Err(error) => {
                    let critical = error.is_critical();
                    if let RetryDecision::Retryable { delay } = decision {
                        tracing::warn!(
                            id = %queued.id,
                            operation = %queued.operation,
                            attempt = attempts,
                            delay_ms = delay.as_millis() as u64,
                            "Operation failed, retrying: {}",
                            error
                        );
                        report.retried += 1;
                        self.inner
                            .lock()
                            .pending
                            .push(queued.into_retry(delay, Instant::now()));
                    } else {
                        tracing::warn!(
                            id = %queued.id,
                            operation = %queued.operation,
                            attempts,
                            "Operation failed: {}",
                            error
                        );
                        report.failed += 1;
                        queued.complete(OperationOutcome::Failed { error, attempts });
                    }
                    if critical {
                        self.ready.send_replace(false);
                        tracing::warn!("Surface lost readiness, pausing queue");
                    }
                }
            }
        }

        if report != DrainReport::default() {
            tracing::debug!(report = %report, "Drain pass finished");
        }
        report
    }

    /// Picks the next operation to run, clearing `processing` in the same
    /// critical section that decides to stop.
    fn next_step(&self, report: &mut DrainReport) -> NextStep {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        for expired in inner.pending.take_expired(now, self.config.timeout) {
            let waited = expired.wait_time(now);
            tracing::warn!(
                id = %expired.id,
                operation = %expired.operation,
                waited_ms = waited.as_millis() as u64,
                "Evicting stale operation"
            );
            report.evicted += 1;
            expired.complete(OperationOutcome::Evicted { waited });
        }

        if !self.is_surface_ready() {
            report.stopped_early = !inner.pending.is_empty();
            inner.processing = false;
            return NextStep::Stop;
        }

        if let Some(queued) = inner.pending.pop_ready(now) {
            inner.current = Some(queued.operation.to_string());
            return NextStep::Run(queued);
        }

        match inner.pending.next_ready_at() {
            Some(at) => NextStep::WaitUntil(at),
            None => {
                inner.processing = false;
                NextStep::Stop
            }
        }
    }

    /// Cancels a pending operation; its ticket resolves to `Cancelled`.
    ///
    /// Returns false if the operation is not pending (already running or
    /// finished).
    pub fn cancel(&self, id: OperationId) -> bool {
        let removed = self.inner.lock().pending.remove(id);
        match removed {
            Some(queued) => {
                tracing::debug!(id = %id, operation = %queued.operation, "Operation cancelled");
                queued.complete(OperationOutcome::Cancelled);
                true
            }
            None => false,
        }
    }

    // Drops an abandoned operation without notifying anyone.
    fn discard(&self, id: OperationId) {
        if self.inner.lock().pending.remove(id).is_some() {
            tracing::debug!(id = %id, "Abandoned operation removed");
        }
    }

    /// Cancels every pending operation. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let drained = self.inner.lock().pending.take_all();
        let count = drained.len();
        for queued in drained {
            queued.complete(OperationOutcome::Cancelled);
        }
        if count > 0 {
            tracing::info!(count, "Operation queue cleared");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }

    pub fn status(&self) -> QueueStatus {
        let inner = self.inner.lock();
        QueueStatus {
            size: inner.pending.len(),
            processing: inner.processing,
            surface_ready: self.is_surface_ready(),
            current_operation: inner.current.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    /// Records execution order; can be told to fail per target.
    #[derive(Default)]
    struct RecordingExecutor {
        executed: Mutex<Vec<String>>,
        failures: Mutex<HashMap<String, (LayerError, u32)>>,
    }

    impl RecordingExecutor {
        fn fail(&self, target: &str, error: LayerError, times: u32) {
            self.failures
                .lock()
                .insert(target.to_string(), (error, times));
        }

        fn executed(&self) -> Vec<String> {
            self.executed.lock().clone()
        }
    }

    impl OperationExecutor for RecordingExecutor {
        fn execute(&self, operation: &Operation) -> LayerResult<ExecutionReport> {
            self.executed.lock().push(operation.to_string());
            let mut failures = self.failures.lock();
            if let Some((error, remaining)) = failures.get_mut(operation.target_id()) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(error.clone());
                }
            }
            Ok(ExecutionReport::applied())
        }
    }

    fn queue_with(config: OperationQueueConfig) -> (OperationQueue, Arc<RecordingExecutor>) {
        let executor = Arc::new(RecordingExecutor::default());
        (OperationQueue::new(config, executor.clone()), executor)
    }

    #[tokio::test]
    async fn test_remove_then_add_commits_add_first() {
        let (queue, executor) = queue_with(OperationQueueConfig::default());
        queue.enqueue(Operation::remove("a")).unwrap();
        queue.enqueue(Operation::add_layer("a", true)).unwrap();

        let report = queue.set_surface_ready(true).await;

        assert_eq!(report.committed, 2);
        assert_eq!(executor.executed(), vec!["add layer 'a'", "remove 'a'"]);
    }

    #[tokio::test]
    async fn test_overflow_rejected_without_mutation() {
        let (queue, executor) = queue_with(OperationQueueConfig {
            max_queue_size: 10,
            ..Default::default()
        });

        let mut rejected = 0;
        for n in 0..12 {
            let operation = if n % 2 == 0 {
                Operation::hide(format!("l{}", n))
            } else {
                Operation::show(format!("l{}", n))
            };
            match queue.enqueue(operation) {
                Ok(_) => {}
                Err(LayerError::QueueFull { capacity }) => {
                    assert_eq!(capacity, 10);
                    rejected += 1;
                }
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(rejected, 2);
        assert_eq!(queue.len(), 10);

        queue.set_surface_ready(true).await;
        let executed = executor.executed();
        assert_eq!(executed.len(), 10);
        assert!(executed[..5].iter().all(|e| e.starts_with("show")));
        assert!(executed[5..].iter().all(|e| e.starts_with("hide")));
    }

    #[tokio::test]
    async fn test_nothing_runs_until_ready() {
        let (queue, executor) = queue_with(OperationQueueConfig::default());
        queue.enqueue(Operation::show("a")).unwrap();
        let report = queue.drain().await;
        assert!(report.stopped_early);
        assert!(executor.executed().is_empty());
        assert_eq!(queue.status().size, 1);
        assert!(!queue.status().processing);
    }

    #[tokio::test]
    async fn test_submit_returns_execution_report() {
        let (queue, _executor) = queue_with(OperationQueueConfig::default());
        queue.set_surface_ready(true).await;
        let report = queue.submit(Operation::show("a")).await.unwrap();
        assert!(report.changed);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_times_out_waiting_for_ready() {
        let (queue, executor) = queue_with(OperationQueueConfig {
            ready_timeout: Duration::from_secs(1),
            ..Default::default()
        });
        let err = queue.submit(Operation::show("a")).await.unwrap_err();
        assert_eq!(err, LayerError::SurfaceNotReady);
        assert!(queue.is_empty());
        assert!(executor.executed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retried() {
        let (queue, executor) = queue_with(OperationQueueConfig::default());
        executor.fail("a", LayerError::OperationTimeout { elapsed_ms: 1 }, 2);
        queue.set_surface_ready(true).await;

        let report = queue.submit(Operation::show("a")).await;
        assert!(report.is_ok());
        assert_eq!(executor.executed().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let (queue, executor) = queue_with(OperationQueueConfig {
            max_retries: 2,
            ..Default::default()
        });
        executor.fail("a", LayerError::OperationTimeout { elapsed_ms: 1 }, 10);
        queue.set_surface_ready(true).await;

        let ticket = queue.enqueue(Operation::show("a")).unwrap();
        let report = queue.drain().await;
        assert_eq!(report.retried, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(
            ticket.wait().await,
            OperationOutcome::Failed {
                error: LayerError::OperationTimeout { elapsed_ms: 1 },
                attempts: 3
            }
        );
    }

    #[tokio::test]
    async fn test_fatal_failure_not_retried() {
        let (queue, executor) = queue_with(OperationQueueConfig::default());
        executor.fail("a", LayerError::source_not_found("s"), 5);
        queue.set_surface_ready(true).await;

        let err = queue.submit(Operation::add_layer("a", true)).await.unwrap_err();
        assert_eq!(err, LayerError::source_not_found("s"));
        assert_eq!(executor.executed().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_failure_stops_pass() {
        let (queue, executor) = queue_with(OperationQueueConfig::default());
        executor.fail("a", LayerError::SurfaceNotReady, 1);
        queue.enqueue(Operation::add_layer("a", true)).unwrap();
        queue.enqueue(Operation::show("b")).unwrap();

        let report = queue.set_surface_ready(true).await;
        assert!(report.stopped_early);
        assert_eq!(report.retried, 1);
        assert!(!queue.is_surface_ready());
        assert_eq!(queue.len(), 2);

        let report = queue.set_surface_ready(true).await;
        assert_eq!(report.committed, 2);
        assert_eq!(executor.executed().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_operations_evicted() {
        let (queue, executor) = queue_with(OperationQueueConfig::default());
        let ticket = queue.enqueue(Operation::show("a")).unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;
        let report = queue.set_surface_ready(true).await;

        assert_eq!(report.evicted, 1);
        assert!(executor.executed().is_empty());
        assert!(matches!(ticket.wait().await, OperationOutcome::Evicted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_retry_lets_ready_work_pass() {
        let (queue, executor) = queue_with(OperationQueueConfig::default());
        executor.fail("a", LayerError::OperationTimeout { elapsed_ms: 1 }, 1);
        queue.enqueue(Operation::show("a")).unwrap();
        queue.enqueue(Operation::show("b")).unwrap();
        queue.enqueue(Operation::hide("c")).unwrap();

        let report = queue.set_surface_ready(true).await;

        // The retry waits out its delay while lower tiers run
        assert_eq!(report.retried, 1);
        assert_eq!(report.committed, 3);
        assert_eq!(
            executor.executed(),
            vec!["show 'a'", "show 'b'", "hide 'c'", "show 'a'"]
        );
    }

    /// Blocks in every execution until released, tracking overlap.
    struct GatedExecutor {
        entered: Mutex<std::sync::mpsc::Sender<()>>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl OperationExecutor for GatedExecutor {
        fn execute(&self, _operation: &Operation) -> LayerResult<ExecutionReport> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            let _ = self.entered.lock().send(());
            let _ = self.release.lock().recv();
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(ExecutionReport::applied())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_drain_returns_while_first_runs() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let executor = Arc::new(GatedExecutor {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        });
        let queue = Arc::new(OperationQueue::new(
            OperationQueueConfig::default(),
            executor.clone(),
        ));
        queue.publish_ready(true);
        queue.enqueue(Operation::show("a")).unwrap();
        queue.enqueue(Operation::show("b")).unwrap();

        let first = tokio::spawn({
            let queue = queue.clone();
            async move { queue.drain().await }
        });
        let entered_rx = tokio::task::spawn_blocking(move || {
            entered_rx.recv().unwrap();
            entered_rx
        })
        .await
        .unwrap();

        assert!(queue.status().processing);
        assert_eq!(queue.drain().await, DrainReport::default());
        assert_eq!(queue.status().size, 1);

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        let report = first.await.unwrap();

        assert_eq!(report.committed, 2);
        assert_eq!(entered_rx.try_iter().count(), 1);
        assert_eq!(executor.max_active.load(Ordering::SeqCst), 1);
        assert!(!queue.status().processing);
    }

    #[tokio::test]
    async fn test_cancel_and_clear() {
        let (queue, _executor) = queue_with(OperationQueueConfig::default());
        let first = queue.enqueue(Operation::show("a")).unwrap();
        let second = queue.enqueue(Operation::show("b")).unwrap();
        queue.enqueue(Operation::show("c")).unwrap();

        assert!(queue.cancel(first.id()));
        assert!(!queue.cancel(first.id()));
        assert_eq!(first.wait().await, OperationOutcome::Cancelled);

        assert_eq!(queue.clear(), 2);
        assert_eq!(second.wait().await, OperationOutcome::Cancelled);
        assert_eq!(queue.status(), QueueStatus::default());
    }
}
