//! convqueue - bounded-concurrency task scheduler
//!
//! Runs asynchronous units of work with a priority queue (FIFO within a
//! priority), a ceiling on how many run at once, a per-attempt timeout and
//! retries with linear backoff. Every submission resolves exactly once.
//!
//! # Modules
//!
//! - [`scheduler`] - the scheduler, its handle, config and error types
//! - [`domain`] - task ids, priorities, statuses and submission options
//! - [`global`] - lazily created process-wide scheduler
//! - [`validate`] - image file validation, the CLI's unit of work
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod global;
pub mod scheduler;
pub mod validate;

// Re-export commonly used types
pub use config::Config;
pub use domain::{Metadata, Priority, TaskId, TaskOptions, TaskStatus};
pub use scheduler::{
    Housekeeper, PerformanceMetrics, QueueStatus, Scheduler, SchedulerConfig, SchedulerError, SchedulerStats,
    TaskDetails, TaskDistribution, TaskHandle, TaskOutcome, Work,
};
pub use validate::{FileReport, FileValidation, ImageKind, ValidationConfig, validate_bytes, validate_file};
