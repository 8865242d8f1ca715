//! Task records owned by the scheduler and the snapshots handed to callers

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::error::SchedulerError;
use super::work::Work;
use crate::domain::{Metadata, Priority, TaskId, TaskStatus};

/// Terminal result stored on a finished task
#[derive(Debug, Clone)]
pub enum TaskOutcome<T> {
    Success(T),
    Failure(SchedulerError),
}

impl<T> TaskOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn error(&self) -> Option<&SchedulerError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(err) => Some(err),
        }
    }
}

pub(crate) type Reply<T> = oneshot::Sender<Result<T, SchedulerError>>;

/// Single source of truth for one task
///
/// Queue structures (pending queue, running set) hold `TaskId`s only; every
/// state change happens on this record.
pub(crate) struct TaskRecord<T> {
    pub id: TaskId,
    pub status: TaskStatus,
    pub priority: Priority,
    pub timeout: Duration,
    pub retry_count: u32,
    pub max_retries: u32,
    pub metadata: Metadata,

    /// Number of attempts started so far
    pub attempt: u32,

    pub submitted_at: DateTime<Utc>,
    pub created_at: Instant,
    pub started_at: Option<Instant>,
    pub completed_at: Option<Instant>,
    pub execution_time: Option<Duration>,

    pub last_error: Option<SchedulerError>,
    pub outcome: Option<TaskOutcome<T>>,

    /// Dropped once the task is terminal
    work: Option<Arc<dyn Work<T>>>,
    reply: Option<Reply<T>>,
    /// The in-flight attempt, while Running
    attempt_task: Option<JoinHandle<()>>,
}

impl<T: Clone> TaskRecord<T> {
    pub fn new(
        id: TaskId,
        work: Arc<dyn Work<T>>,
        priority: Priority,
        timeout: Duration,
        max_retries: u32,
        metadata: Metadata,
        reply: Reply<T>,
    ) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            priority,
            timeout,
            retry_count: 0,
            max_retries,
            metadata,
            attempt: 0,
            submitted_at: Utc::now(),
            created_at: Instant::now(),
            started_at: None,
            completed_at: None,
            execution_time: None,
            last_error: None,
            outcome: None,
            work: Some(work),
            reply: Some(reply),
            attempt_task: None,
        }
    }

    /// Pending -> Running; returns the work to execute and the attempt number
    pub fn start_attempt(&mut self, now: Instant) -> Option<(Arc<dyn Work<T>>, u32)> {
        let work = self.work.clone()?;
        self.status = TaskStatus::Running;
        self.started_at = Some(now);
        self.attempt += 1;
        Some((work, self.attempt))
    }

    pub fn attach_attempt(&mut self, handle: JoinHandle<()>) {
        self.attempt_task = Some(handle);
    }

    /// Forget the attempt handle once the attempt has reported back
    pub fn detach_attempt(&mut self) {
        self.attempt_task = None;
    }

    /// Is `attempt` the attempt this record is currently waiting on?
    pub fn is_current_attempt(&self, attempt: u32) -> bool {
        self.status == TaskStatus::Running && self.attempt == attempt
    }

    /// Running -> Pending for another attempt at one priority level lower
    pub fn schedule_retry(&mut self, error: SchedulerError) {
        self.attempt_task = None;
        self.retry_count += 1;
        self.priority = self.priority.lower();
        self.status = TaskStatus::Pending;
        self.last_error = Some(error);
    }

    /// Move to a terminal state and resolve the caller's handle
    ///
    /// Returns false if the task had already settled; the outcome never changes
    /// once set.
    pub fn settle(&mut self, status: TaskStatus, result: Result<T, SchedulerError>, now: Instant) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        debug_assert!(status.is_terminal());

        if let Some(attempt) = self.attempt_task.take() {
            attempt.abort();
        }

        self.status = status;
        self.completed_at = Some(now);
        self.execution_time = self.started_at.map(|started| now.saturating_duration_since(started));
        self.work = None;

        self.outcome = Some(match &result {
            Ok(value) => TaskOutcome::Success(value.clone()),
            Err(err) => TaskOutcome::Failure(err.clone()),
        });
        if let Some(reply) = self.reply.take() {
            // The caller may have dropped its handle
            let _ = reply.send(result);
        }
        true
    }

    pub fn details(&self) -> TaskDetails<T> {
        TaskDetails {
            id: self.id,
            status: self.status,
            priority: self.priority,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            attempts: self.attempt,
            timeout: self.timeout,
            metadata: self.metadata.clone(),
            submitted_at: self.submitted_at,
            queued_for: self.started_at.map(|started| started.saturating_duration_since(self.created_at)),
            execution_time: self.execution_time,
            last_error: self.last_error.clone(),
            outcome: self.outcome.clone(),
        }
    }
}

/// Snapshot of one task, returned by `Scheduler::task_details`
#[derive(Debug, Clone)]
pub struct TaskDetails<T> {
    pub id: TaskId,
    pub status: TaskStatus,
    pub priority: Priority,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Attempts started so far
    pub attempts: u32,
    pub timeout: Duration,
    pub metadata: Metadata,
    pub submitted_at: DateTime<Utc>,
    /// Time between submission and the start of the latest attempt
    pub queued_for: Option<Duration>,
    pub execution_time: Option<Duration>,
    /// Error of the most recent failed attempt
    pub last_error: Option<SchedulerError>,
    pub outcome: Option<TaskOutcome<T>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> (TaskRecord<u32>, oneshot::Receiver<Result<u32, SchedulerError>>) {
        let (tx, rx) = oneshot::channel();
        let work: Arc<dyn Work<u32>> = Arc::new(|| async { Ok::<_, eyre::Report>(7) });
        let record = TaskRecord::new(
            TaskId::new(1),
            work,
            Priority::High,
            Duration::from_secs(1),
            2,
            Metadata::new(),
            tx,
        );
        (record, rx)
    }

    #[tokio::test]
    async fn test_settle_is_at_most_once() {
        let (mut record, rx) = record();
        let now = Instant::now();
        record.start_attempt(now).unwrap();

        assert!(record.settle(TaskStatus::Completed, Ok(7), now));
        assert!(!record.settle(
            TaskStatus::Cancelled,
            Err(SchedulerError::Cancelled { task_id: record.id }),
            now
        ));

        assert_eq!(record.status, TaskStatus::Completed);
        assert!(record.outcome.as_ref().unwrap().is_success());
        assert_eq!(rx.await.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_retry_lowers_priority() {
        let (mut record, _rx) = record();
        record.start_attempt(Instant::now()).unwrap();
        record.schedule_retry(SchedulerError::Timeout {
            task_id: record.id,
            attempt: 1,
            timeout: Duration::from_secs(1),
        });

        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.priority, Priority::Normal);
        assert!(record.last_error.as_ref().unwrap().is_timeout());

        let (_, attempt) = record.start_attempt(Instant::now()).unwrap();
        assert_eq!(attempt, 2);
        assert!(record.is_current_attempt(2));
        assert!(!record.is_current_attempt(1));
    }

    #[tokio::test]
    async fn test_terminal_record_releases_work() {
        let (mut record, _rx) = record();
        let now = Instant::now();
        record.settle(TaskStatus::Cancelled, Err(SchedulerError::Cancelled { task_id: record.id }), now);
        assert!(record.start_attempt(now).is_none());
        assert_eq!(record.execution_time, None);
        assert_eq!(record.details().status, TaskStatus::Cancelled);
    }
}
