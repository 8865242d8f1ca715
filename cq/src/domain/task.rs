//! Task status and submission options

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Priority;

/// Opaque caller-supplied annotation (e.g. the originating file name)
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Task status
///
/// State transitions:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Pending (retryable failure, loops until the budget is spent)
/// - Pending -> Running -> Failed
/// - Pending | Running -> Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-task options; unset fields fall back to the scheduler configuration
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub priority: Option<Priority>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub metadata: Metadata,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Attach one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_options_builder() {
        let opts = TaskOptions::new()
            .with_priority(Priority::High)
            .with_timeout(Duration::from_millis(50))
            .with_max_retries(0)
            .with_metadata("file", "logo.svg");

        assert_eq!(opts.priority, Some(Priority::High));
        assert_eq!(opts.timeout, Some(Duration::from_millis(50)));
        assert_eq!(opts.max_retries, Some(0));
        assert_eq!(opts.metadata["file"], "logo.svg");
    }

    #[test]
    fn test_default_options_are_unset() {
        let opts = TaskOptions::default();
        assert!(opts.priority.is_none());
        assert!(opts.timeout.is_none());
        assert!(opts.max_retries.is_none());
        assert!(opts.metadata.is_empty());
    }
}
