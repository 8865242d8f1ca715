//! Units of work accepted by the scheduler

use std::future::Future;

use async_trait::async_trait;

/// An asynchronous unit of work
///
/// The scheduler calls `run` once per attempt, so a retried task runs the same
/// work object again. Closures returning a future implement this trait.
#[async_trait]
pub trait Work<T>: Send + Sync {
    async fn run(&self) -> eyre::Result<T>;
}

#[async_trait]
impl<T, F, Fut> Work<T> for F
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = eyre::Result<T>> + Send + 'static,
{
    async fn run(&self) -> eyre::Result<T> {
        (self)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counting {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Work<u32> for Counting {
        async fn run(&self) -> eyre::Result<u32> {
            Ok(self.calls.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    #[tokio::test]
    async fn test_closure_is_work() {
        let work: Arc<dyn Work<&'static str>> = Arc::new(|| async { Ok::<_, eyre::Report>("done") });
        assert_eq!(work.run().await.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_struct_work_runs_each_time() {
        let work = Counting {
            calls: AtomicU32::new(0),
        };
        assert_eq!(work.run().await.unwrap(), 1);
        assert_eq!(work.run().await.unwrap(), 2);
    }
}
