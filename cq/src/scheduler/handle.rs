//! Caller-side handle for a submitted task

use std::future::Future;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::core::{Scheduler, Shared};
use super::error::SchedulerError;
use crate::domain::TaskId;

/// Handle to a submitted task
///
/// Await it to get the task's outcome. Exactly one result is delivered per
/// submission; if the scheduler is dropped before the task settles the handle
/// resolves to [`SchedulerError::Shutdown`].
pub struct TaskHandle<T> {
    task_id: TaskId,
    rx: oneshot::Receiver<Result<T, SchedulerError>>,
    scheduler: Weak<Shared<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(task_id: TaskId, rx: oneshot::Receiver<Result<T, SchedulerError>>, scheduler: Weak<Shared<T>>) -> Self {
        Self { task_id, rx, scheduler }
    }

    /// The id assigned at submission
    pub fn id(&self) -> TaskId {
        self.task_id
    }
}

impl<T: Clone + Send + 'static> TaskHandle<T> {
    /// Cancel this task through its scheduler
    ///
    /// Returns false if the task already finished or the scheduler is gone.
    pub async fn cancel(&self) -> bool {
        match self.scheduler.upgrade() {
            Some(shared) => Scheduler::from_shared(shared).cancel(self.task_id).await,
            None => false,
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, SchedulerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SchedulerError::Shutdown)))
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle").field("task_id", &self.task_id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_resolves_with_sent_value() {
        let (tx, rx) = oneshot::channel();
        let handle: TaskHandle<u8> = TaskHandle::new(TaskId::new(1), rx, Weak::new());
        tx.send(Ok(5)).unwrap();
        assert_eq!(handle.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_dropped_sender_is_shutdown() {
        let (tx, rx) = oneshot::channel::<Result<u8, SchedulerError>>();
        let handle = TaskHandle::new(TaskId::new(2), rx, Weak::new());
        drop(tx);
        assert!(matches!(handle.await, Err(SchedulerError::Shutdown)));
    }

    #[tokio::test]
    async fn test_cancel_without_scheduler_is_false() {
        let (_tx, rx) = oneshot::channel::<Result<u8, SchedulerError>>();
        let handle = TaskHandle::new(TaskId::new(3), rx, Weak::new());
        assert_eq!(handle.id(), TaskId::new(3));
        assert!(!handle.cancel().await);
    }
}
