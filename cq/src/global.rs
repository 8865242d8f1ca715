//! Process-wide default scheduler
//!
//! Convenience for callers that do not want to thread a [`Scheduler`] through
//! their code. The instance is created on first use with the default
//! [`SchedulerConfig`] and results are carried as `serde_json::Value`.

use std::sync::OnceLock;

use serde_json::Value;

use crate::domain::{TaskId, TaskOptions};
use crate::scheduler::{QueueStatus, Scheduler, SchedulerConfig, SchedulerError, TaskHandle, Work};

static GLOBAL: OnceLock<Scheduler<Value>> = OnceLock::new();

/// The shared default scheduler
pub fn scheduler() -> &'static Scheduler<Value> {
    GLOBAL.get_or_init(|| Scheduler::new(SchedulerConfig::default()))
}

/// Submit work to the default scheduler
pub async fn submit<W>(work: W, options: TaskOptions) -> Result<TaskHandle<Value>, SchedulerError>
where
    W: Work<Value> + 'static,
{
    scheduler().submit(work, options).await
}

/// Cancel a task on the default scheduler
pub async fn cancel(task_id: TaskId) -> bool {
    scheduler().cancel(task_id).await
}

/// Status snapshot of the default scheduler
pub async fn status() -> QueueStatus {
    scheduler().status().await
}
