//! Bounded-concurrency task scheduler
//!
//! Accepts asynchronous units of work, orders them by priority (FIFO within
//! a priority), runs at most `max_concurrency` at once and retries failures
//! with linear backoff.

mod config;
mod core;
mod error;
mod handle;
mod housekeeping;
mod queue;
mod task;
mod work;

pub use config::SchedulerConfig;
pub use self::core::Scheduler;
pub use error::{SchedulerError, WorkFailure};
pub use handle::TaskHandle;
pub use housekeeping::Housekeeper;
pub use queue::{DistributionPercentages, PerformanceMetrics, QueueStatus, SchedulerStats, TaskDistribution};
pub use task::{TaskDetails, TaskOutcome};
pub use work::Work;
