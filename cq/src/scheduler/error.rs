//! Scheduler error types

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::domain::TaskId;

/// Shared cause of a failed unit of work
pub type WorkFailure = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced by the scheduler, either on submission or through a task handle
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    #[error("Task queue is full (max {max_queue_size} pending tasks)")]
    QueueFull { max_queue_size: usize },

    #[error("{task_id} timed out after {timeout:?} (attempt {attempt})")]
    Timeout {
        task_id: TaskId,
        attempt: u32,
        timeout: Duration,
    },

    #[error("{task_id} failed (attempt {attempt}): {source}")]
    Work {
        task_id: TaskId,
        attempt: u32,
        #[source]
        source: WorkFailure,
    },

    #[error("{task_id} was cancelled")]
    Cancelled { task_id: TaskId },

    #[error("Scheduler is shut down")]
    Shutdown,
}

impl SchedulerError {
    pub(crate) fn work(task_id: TaskId, attempt: u32, report: eyre::Report) -> Self {
        let boxed: Box<dyn StdError + Send + Sync + 'static> = report.into();
        Self::Work {
            task_id,
            attempt,
            source: Arc::from(boxed),
        }
    }

    /// Check if the retry policy applies to this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Work { .. })
    }

    /// Check if this is a cancellation
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Check if this is a per-attempt timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The task this error belongs to, if any
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::Timeout { task_id, .. } | Self::Work { task_id, .. } | Self::Cancelled { task_id } => {
                Some(*task_id)
            }
            Self::QueueFull { .. } | Self::Shutdown => None,
        }
    }
}
