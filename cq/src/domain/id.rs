//! Task identifiers
//!
//! Ids are assigned by the scheduler from a per-instance counter and render as
//! `task-{n}`. A counter never wraps in practice, so an id is never reused
//! while the scheduler still references the task.

use serde::{Deserialize, Serialize};

/// Identifier of a submitted task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(u64);

impl TaskId {
    /// Prefix used by the string form
    pub const PREFIX: &'static str = "task-";

    /// Wrap a raw sequence number
    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// The raw sequence number
    pub fn seq(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = String;

    /// Accepts both `task-7` and a bare `7`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix(Self::PREFIX).unwrap_or(s);
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| format!("Invalid task id: {}", s))
    }
}

impl TryFrom<String> for TaskId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.to_string()
    }
}

/// Monotonic id allocator owned by one scheduler instance
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    last: u64,
}

impl IdAllocator {
    pub(crate) fn next_id(&mut self) -> TaskId {
        self.last += 1;
        TaskId(self.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_is_monotonic() {
        let mut ids = IdAllocator::default();
        let a = ids.next_id();
        let b = ids.next_id();
        let c = ids.next_id();
        assert!(a < b && b < c);
        assert_eq!(a.seq(), 1);
        assert_eq!(c.seq(), 3);
    }

    #[test]
    fn test_display_and_parse() {
        let id = TaskId::new(42);
        assert_eq!(id.to_string(), "task-42");
        assert_eq!("task-42".parse::<TaskId>().unwrap(), id);
        assert_eq!("42".parse::<TaskId>().unwrap(), id);
        assert!("task-x".parse::<TaskId>().is_err());
    }

    #[test]
    fn test_serializes_as_string() {
        let json = serde_json::to_string(&TaskId::new(5)).unwrap();
        assert_eq!(json, "\"task-5\"");
        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TaskId::new(5));
    }
}
