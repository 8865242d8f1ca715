//! Scheduler implementation

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Mutex, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::domain::{IdAllocator, TaskId, TaskOptions, TaskStatus};

use super::config::SchedulerConfig;
use super::error::SchedulerError;
use super::handle::TaskHandle;
use super::housekeeping::Housekeeper;
use super::queue::{PendingEntry, PendingQueue, PerformanceMetrics, QueueStatus, SchedulerStats, TaskDistribution};
use super::task::{TaskDetails, TaskRecord};
use super::work::Work;

/// Internal state protected by mutex
struct SchedulerInner<T> {
    /// Current concurrency ceiling (changes with `set_concurrency`)
    max_concurrency: usize,

    /// Every task the scheduler still references
    records: HashMap<TaskId, TaskRecord<T>>,

    /// Priority-ordered ids of Pending tasks
    pending: PendingQueue,

    /// Ids of Running tasks
    running: HashSet<TaskId>,

    ids: IdAllocator,
    stats: SchedulerStats,
    shut_down: bool,
}

impl<T> SchedulerInner<T> {
    fn note_peaks(&mut self) {
        self.stats.peak_concurrent = self.stats.peak_concurrent.max(self.running.len());
        self.stats.peak_queue_depth = self.stats.peak_queue_depth.max(self.pending.len());
    }
}

/// Best-effort text of a panic payload
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub(crate) struct Shared<T> {
    config: SchedulerConfig,
    inner: Mutex<SchedulerInner<T>>,
}

/// The Scheduler runs asynchronous units of work with priority queuing, a
/// concurrency ceiling, per-attempt timeouts and retry with linear backoff.
///
/// All bookkeeping happens under a single mutex, so dispatch has one authority:
/// `advance` only ever tops the running set up to the limit and is safe to call
/// redundantly. Cloning is cheap and every clone drives the same scheduler.
pub struct Scheduler<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> Scheduler<T> {
    /// Create a new scheduler with the given configuration
    pub fn new(config: SchedulerConfig) -> Self {
        debug!(?config, "Scheduler::new: called");
        let max_concurrency = config.max_concurrency.max(1);
        Self {
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(SchedulerInner {
                    max_concurrency,
                    records: HashMap::new(),
                    pending: PendingQueue::new(),
                    running: HashSet::new(),
                    ids: IdAllocator::default(),
                    stats: SchedulerStats::default(),
                    shut_down: false,
                }),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// The configuration this scheduler was built with
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Submit a unit of work
    ///
    /// Fails immediately with [`SchedulerError::QueueFull`] when the pending
    /// queue is at capacity; the work is not enqueued in that case.
    pub async fn submit<W>(&self, work: W, options: TaskOptions) -> Result<TaskHandle<T>, SchedulerError>
    where
        W: Work<T> + 'static,
    {
        self.submit_shared(Arc::new(work), options).await
    }

    /// Submit a unit of work that is already behind an `Arc`
    pub async fn submit_shared(
        &self,
        work: Arc<dyn Work<T>>,
        options: TaskOptions,
    ) -> Result<TaskHandle<T>, SchedulerError> {
        let config = &self.shared.config;
        let mut guard = self.shared.inner.lock().await;
        let inner = &mut *guard;

        if inner.shut_down {
            debug!("Scheduler::submit: rejected, scheduler is shut down");
            return Err(SchedulerError::Shutdown);
        }

        if inner.pending.len() >= config.max_queue_size {
            warn!(
                queue_length = inner.pending.len(),
                max_queue_size = config.max_queue_size,
                "Task queue is full, rejecting submission"
            );
            return Err(SchedulerError::QueueFull {
                max_queue_size: config.max_queue_size,
            });
        }

        let task_id = inner.ids.next_id();
        let priority = options.priority.unwrap_or(config.default_priority);
        let timeout = options.timeout.unwrap_or_else(|| config.timeout());
        let max_retries = options.max_retries.unwrap_or(config.max_retries);

        let (reply_tx, reply_rx) = oneshot::channel();
        let record = TaskRecord::new(task_id, work, priority, timeout, max_retries, options.metadata, reply_tx);
        inner.records.insert(task_id, record);
        inner.pending.insert(PendingEntry::new(task_id, priority));
        inner.stats.total_submitted += 1;
        inner.note_peaks();

        debug!(%task_id, %priority, ?timeout, max_retries, "Task submitted");

        self.advance_locked(inner);

        Ok(TaskHandle::new(task_id, reply_rx, Arc::downgrade(&self.shared)))
    }

    /// Dispatch pending tasks until the running set is full
    pub async fn advance(&self) {
        let mut guard = self.shared.inner.lock().await;
        self.advance_locked(&mut guard);
    }

    fn advance_locked(&self, inner: &mut SchedulerInner<T>) {
        let now = Instant::now();
        while inner.running.len() < inner.max_concurrency {
            let Some(entry) = inner.pending.pop_eligible(now) else {
                break;
            };
            self.dispatch_locked(inner, entry.task_id, now);
        }
    }

    fn dispatch_locked(&self, inner: &mut SchedulerInner<T>, task_id: TaskId, now: Instant) {
        let Some(record) = inner.records.get_mut(&task_id) else {
            warn!(%task_id, "Pending task has no record, dropping it");
            return;
        };
        let Some((work, attempt)) = record.start_attempt(now) else {
            warn!(%task_id, status = %record.status, "Pending task has no work attached, dropping it");
            return;
        };
        let timeout = record.timeout;

        debug!(%task_id, attempt, priority = %record.priority, "Dispatching task");

        let scheduler = self.clone();
        let attempt_task = tokio::spawn(async move {
            let run = AssertUnwindSafe(tokio::time::timeout(timeout, work.run())).catch_unwind();
            let result = match run.await {
                Ok(Ok(Ok(value))) => Ok(value),
                Ok(Ok(Err(report))) => Err(SchedulerError::work(task_id, attempt, report)),
                Ok(Err(_)) => Err(SchedulerError::Timeout {
                    task_id,
                    attempt,
                    timeout,
                }),
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(%task_id, attempt, %message, "Task work panicked");
                    Err(SchedulerError::work(task_id, attempt, eyre::eyre!("work panicked: {}", message)))
                }
            };
            scheduler.finish_attempt(task_id, attempt, result).await;
        });
        record.attach_attempt(attempt_task);

        inner.running.insert(task_id);
        inner.note_peaks();
    }

    /// Apply the result of one attempt
    ///
    /// Results from an attempt the scheduler no longer waits on (the task was
    /// cancelled or swept) are discarded.
    async fn finish_attempt(&self, task_id: TaskId, attempt: u32, result: Result<T, SchedulerError>) {
        let mut guard = self.shared.inner.lock().await;
        let inner = &mut *guard;
        let now = Instant::now();

        let Some(record) = inner.records.get_mut(&task_id) else {
            debug!(%task_id, attempt, "Scheduler::finish_attempt: task no longer tracked");
            return;
        };
        if !record.is_current_attempt(attempt) {
            debug!(%task_id, attempt, status = %record.status, "Scheduler::finish_attempt: stale attempt ignored");
            return;
        }
        record.detach_attempt();
        inner.running.remove(&task_id);

        match result {
            Ok(value) => {
                record.settle(TaskStatus::Completed, Ok(value), now);
                let execution_time = record.execution_time.unwrap_or_default();
                inner.stats.record_completion(execution_time);
                info!(%task_id, attempt, ?execution_time, "Task completed");
            }
            Err(err) => {
                if err.is_timeout() {
                    inner.stats.total_timeouts += 1;
                }

                if err.is_retryable() && record.retry_count < record.max_retries {
                    record.schedule_retry(err.clone());
                    let retry = record.retry_count;
                    let priority = record.priority;
                    let delay = self.shared.config.retry_delay(retry);
                    let eligible_at = now + delay;

                    inner.pending.insert(PendingEntry::delayed(task_id, priority, eligible_at));
                    inner.stats.total_retries += 1;
                    inner.note_peaks();

                    warn!(%task_id, attempt, retry, %priority, ?delay, error = %err, "Task failed, scheduling retry");

                    // The slot stays idle until the backoff elapses
                    let scheduler = self.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep_until(eligible_at).await;
                        scheduler.advance().await;
                    });
                    return;
                }

                warn!(%task_id, attempt, error = %err, "Task failed, retries exhausted");
                record.settle(TaskStatus::Failed, Err(err), now);
                inner.stats.failed += 1;
            }
        }

        self.advance_locked(inner);
    }

    /// Cancel a pending or running task
    ///
    /// A running task's attempt is aborted and its slot freed. Returns false
    /// for unknown ids and tasks that already finished.
    pub async fn cancel(&self, task_id: TaskId) -> bool {
        debug!(%task_id, "Scheduler::cancel: called");
        let mut guard = self.shared.inner.lock().await;
        let inner = &mut *guard;

        if !Self::cancel_locked(inner, task_id, Instant::now()) {
            debug!(%task_id, "Scheduler::cancel: not pending or running");
            return false;
        }

        self.advance_locked(inner);
        true
    }

    fn cancel_locked(inner: &mut SchedulerInner<T>, task_id: TaskId, now: Instant) -> bool {
        let Some(record) = inner.records.get_mut(&task_id) else {
            return false;
        };

        match record.status {
            TaskStatus::Running => {
                inner.running.remove(&task_id);
            }
            TaskStatus::Pending => {
                inner.pending.remove(task_id);
            }
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => return false,
        }

        let was = record.status;
        record.settle(TaskStatus::Cancelled, Err(SchedulerError::Cancelled { task_id }), now);
        inner.stats.cancelled += 1;
        info!(%task_id, %was, "Task cancelled");
        true
    }

    /// Cancel every pending and running task
    pub async fn cancel_all(&self) {
        debug!("Scheduler::cancel_all: called");
        let mut guard = self.shared.inner.lock().await;
        let inner = &mut *guard;
        let now = Instant::now();

        let mut running: Vec<TaskId> = inner.running.iter().copied().collect();
        running.sort();
        let pending: Vec<TaskId> = inner.pending.drain().into_iter().map(|e| e.task_id).collect();

        let mut cancelled = 0usize;
        for task_id in running.into_iter().chain(pending) {
            // Drained pending ids are already out of the queue; cancel_locked
            // only needs the record for them.
            if Self::cancel_locked(inner, task_id, now) {
                cancelled += 1;
            }
        }

        if cancelled > 0 {
            info!(cancelled, "Cancelled all tasks");
        }
    }

    /// Change the concurrency ceiling (clamped to at least 1)
    ///
    /// Raising the limit dispatches more pending tasks right away. Lowering it
    /// never preempts running tasks; the running set drains down naturally.
    pub async fn set_concurrency(&self, new_limit: usize) {
        let mut guard = self.shared.inner.lock().await;
        let inner = &mut *guard;

        let old_limit = inner.max_concurrency;
        inner.max_concurrency = new_limit.max(1);
        info!(old_limit, new_limit = inner.max_concurrency, "Concurrency limit changed");

        if inner.max_concurrency > old_limit {
            self.advance_locked(inner);
        }
    }

    /// Drop finished tasks that completed at least `max_age` ago
    ///
    /// Pending and running tasks are never touched. Returns how many records
    /// were removed.
    pub async fn sweep_completed(&self, max_age: Duration) -> usize {
        let mut guard = self.shared.inner.lock().await;
        let now = Instant::now();

        let expired: Vec<TaskId> = guard
            .records
            .values()
            .filter(|record| record.status.is_terminal())
            .filter(|record| {
                record
                    .completed_at
                    .is_some_and(|at| now.saturating_duration_since(at) >= max_age)
            })
            .map(|record| record.id)
            .collect();

        for task_id in &expired {
            guard.records.remove(task_id);
        }

        if !expired.is_empty() {
            info!(removed = expired.len(), ?max_age, "Swept finished tasks");
        }
        expired.len()
    }

    /// Point-in-time snapshot of queue, running set and counters
    pub async fn status(&self) -> QueueStatus {
        let inner = self.shared.inner.lock().await;
        Self::status_locked(&inner)
    }

    fn status_locked(inner: &SchedulerInner<T>) -> QueueStatus {
        let running_count = inner.running.len();
        QueueStatus {
            queue_length: inner.pending.len(),
            running_count,
            max_concurrency: inner.max_concurrency,
            utilization: running_count as f64 / inner.max_concurrency as f64,
            stats: inner.stats.clone(),
        }
    }

    /// Status snapshot plus the distribution of tasks over states
    pub async fn performance_metrics(&self) -> PerformanceMetrics {
        let inner = self.shared.inner.lock().await;
        let distribution = TaskDistribution {
            pending: inner.pending.len() as u64,
            running: inner.running.len() as u64,
            completed: inner.stats.completed,
            failed: inner.stats.failed,
            cancelled: inner.stats.cancelled,
        };
        PerformanceMetrics {
            status: Self::status_locked(&inner),
            percentages: distribution.percentages(),
            distribution,
        }
    }

    /// Snapshot of a single task, if the scheduler still tracks it
    pub async fn task_details(&self, task_id: TaskId) -> Option<TaskDetails<T>> {
        let inner = self.shared.inner.lock().await;
        inner.records.get(&task_id).map(TaskRecord::details)
    }

    /// Ids of pending tasks in dispatch order
    pub async fn pending_ids(&self) -> Vec<TaskId> {
        let inner = self.shared.inner.lock().await;
        inner.pending.iter().map(|e| e.task_id).collect()
    }

    /// Run `sweep_completed(max_age)` every `interval` in the background
    pub fn spawn_housekeeping(&self, interval: Duration, max_age: Duration) -> Housekeeper {
        Housekeeper::spawn(self.clone(), interval, max_age)
    }

    /// Housekeeping with the configured sweep interval and max age
    pub fn spawn_default_housekeeping(&self) -> Housekeeper {
        let config = &self.shared.config;
        self.spawn_housekeeping(config.sweep_interval(), config.sweep_max_age())
    }

    /// Cancel everything and refuse further submissions
    pub async fn shutdown(&self) {
        info!("Scheduler shutting down");
        {
            let mut inner = self.shared.inner.lock().await;
            inner.shut_down = true;
        }
        self.cancel_all().await;
    }
}
