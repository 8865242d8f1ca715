//! Pending queue and snapshot types for the scheduler

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::domain::{Priority, TaskId};

/// A pending task waiting for a slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingEntry {
    pub task_id: TaskId,
    pub priority: Priority,
    /// Retried tasks sit in the queue but are not dispatched before this instant
    pub eligible_at: Option<Instant>,
}

impl PendingEntry {
    pub fn new(task_id: TaskId, priority: Priority) -> Self {
        Self {
            task_id,
            priority,
            eligible_at: None,
        }
    }

    pub fn delayed(task_id: TaskId, priority: Priority, eligible_at: Instant) -> Self {
        Self {
            task_id,
            priority,
            eligible_at: Some(eligible_at),
        }
    }

    fn is_eligible(&self, now: Instant) -> bool {
        self.eligible_at.is_none_or(|at| at <= now)
    }
}

/// Priority-ordered pending queue
///
/// Entries are kept sorted by descending priority. A new entry goes after every
/// existing entry of the same priority, so each priority band is FIFO.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    entries: Vec<PendingEntry>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert before the first entry of strictly lower priority
    pub fn insert(&mut self, entry: PendingEntry) {
        let index = self
            .entries
            .iter()
            .position(|e| e.priority < entry.priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(index, entry);
    }

    /// Remove the highest-priority entry that is eligible at `now`
    pub fn pop_eligible(&mut self, now: Instant) -> Option<PendingEntry> {
        let index = self.entries.iter().position(|e| e.is_eligible(now))?;
        Some(self.entries.remove(index))
    }

    pub fn remove(&mut self, task_id: TaskId) -> Option<PendingEntry> {
        let index = self.entries.iter().position(|e| e.task_id == task_id)?;
        Some(self.entries.remove(index))
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.entries.iter().any(|e| e.task_id == task_id)
    }

    /// Empty the queue, returning entries in dispatch order
    pub fn drain(&mut self) -> Vec<PendingEntry> {
        std::mem::take(&mut self.entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingEntry> {
        self.entries.iter()
    }
}

/// Aggregate counters for the scheduler
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SchedulerStats {
    pub total_submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub total_retries: u64,
    pub total_timeouts: u64,
    /// Running mean over completed tasks, in milliseconds
    pub average_execution_ms: f64,
    pub peak_concurrent: usize,
    pub peak_queue_depth: usize,
}

impl SchedulerStats {
    /// Count a completion and fold its execution time into the running mean
    pub(crate) fn record_completion(&mut self, execution_time: Duration) {
        self.completed += 1;
        let n = self.completed as f64;
        let sample = execution_time.as_secs_f64() * 1000.0;
        self.average_execution_ms = (self.average_execution_ms * (n - 1.0) + sample) / n;
    }
}

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub queue_length: usize,
    pub running_count: usize,
    pub max_concurrency: usize,
    /// `running_count / max_concurrency`
    pub utilization: f64,
    pub stats: SchedulerStats,
}

impl QueueStatus {
    /// Utilization formatted as a percentage, e.g. `66.7%`
    pub fn utilization_percent(&self) -> String {
        format!("{:.1}%", self.utilization * 100.0)
    }
}

/// Task counts by state
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDistribution {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

/// Share of each state in a [`TaskDistribution`], in percent
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct DistributionPercentages {
    pub pending: f64,
    pub running: f64,
    pub completed: f64,
    pub failed: f64,
    pub cancelled: f64,
}

impl TaskDistribution {
    pub fn total(&self) -> u64 {
        self.pending + self.running + self.completed + self.failed + self.cancelled
    }

    /// Percentages per state; all zero when nothing has been seen yet
    pub fn percentages(&self) -> DistributionPercentages {
        let total = self.total();
        if total == 0 {
            return DistributionPercentages::default();
        }
        let pct = |n: u64| n as f64 / total as f64 * 100.0;
        DistributionPercentages {
            pending: pct(self.pending),
            running: pct(self.running),
            completed: pct(self.completed),
            failed: pct(self.failed),
            cancelled: pct(self.cancelled),
        }
    }
}

/// Status snapshot plus task distribution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub status: QueueStatus,
    pub distribution: TaskDistribution,
    pub percentages: DistributionPercentages,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(queue: &PendingQueue) -> Vec<u64> {
        queue.iter().map(|e| e.task_id.seq()).collect()
    }

    #[test]
    fn test_higher_priority_goes_first() {
        let mut queue = PendingQueue::new();
        queue.insert(PendingEntry::new(TaskId::new(1), Priority::Normal));
        queue.insert(PendingEntry::new(TaskId::new(2), Priority::High));
        queue.insert(PendingEntry::new(TaskId::new(3), Priority::Normal));
        queue.insert(PendingEntry::new(TaskId::new(4), Priority::Low));
        queue.insert(PendingEntry::new(TaskId::new(5), Priority::Critical));

        assert_eq!(ids(&queue), vec![5, 2, 1, 3, 4]);
    }

    #[test]
    fn test_pop_skips_entries_in_backoff() {
        let now = Instant::now();
        let mut queue = PendingQueue::new();
        queue.insert(PendingEntry::delayed(
            TaskId::new(1),
            Priority::High,
            now + Duration::from_secs(1),
        ));
        queue.insert(PendingEntry::new(TaskId::new(2), Priority::Low));

        let first = queue.pop_eligible(now).unwrap();
        assert_eq!(first.task_id, TaskId::new(2));
        assert!(queue.pop_eligible(now).is_none());

        let later = queue.pop_eligible(now + Duration::from_secs(1)).unwrap();
        assert_eq!(later.task_id, TaskId::new(1));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_and_contains() {
        let mut queue = PendingQueue::new();
        queue.insert(PendingEntry::new(TaskId::new(1), Priority::Normal));
        queue.insert(PendingEntry::new(TaskId::new(2), Priority::Normal));

        assert!(queue.contains(TaskId::new(2)));
        assert!(queue.remove(TaskId::new(2)).is_some());
        assert!(!queue.contains(TaskId::new(2)));
        assert!(queue.remove(TaskId::new(2)).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_running_average() {
        let mut stats = SchedulerStats::default();
        stats.record_completion(Duration::from_millis(100));
        assert_eq!(stats.average_execution_ms, 100.0);
        stats.record_completion(Duration::from_millis(300));
        assert_eq!(stats.average_execution_ms, 200.0);
        stats.record_completion(Duration::from_millis(200));
        assert_eq!(stats.average_execution_ms, 200.0);
        assert_eq!(stats.completed, 3);
    }

    #[test]
    fn test_distribution_percentages() {
        let dist = TaskDistribution {
            pending: 1,
            running: 1,
            completed: 2,
            failed: 0,
            cancelled: 0,
        };
        let pct = dist.percentages();
        assert_eq!(pct.completed, 50.0);
        assert_eq!(pct.pending, 25.0);
        assert_eq!(pct.failed, 0.0);

        assert_eq!(TaskDistribution::default().percentages(), DistributionPercentages::default());
    }

    #[test]
    fn test_utilization_percent() {
        let status = QueueStatus {
            queue_length: 0,
            running_count: 2,
            max_concurrency: 3,
            utilization: 2.0 / 3.0,
            stats: SchedulerStats::default(),
        };
        assert_eq!(status.utilization_percent(), "66.7%");
    }

    fn priority_strategy() -> impl Strategy<Value = Priority> {
        prop_oneof![
            Just(Priority::Low),
            Just(Priority::Normal),
            Just(Priority::High),
            Just(Priority::Critical),
        ]
    }

    proptest! {
        #[test]
        fn queue_is_priority_descending_and_fifo_within_band(
            priorities in proptest::collection::vec(priority_strategy(), 0..64)
        ) {
            let mut queue = PendingQueue::new();
            for (i, p) in priorities.iter().enumerate() {
                queue.insert(PendingEntry::new(TaskId::new(i as u64), *p));
            }

            let now = Instant::now();
            let mut popped = Vec::new();
            while let Some(entry) = queue.pop_eligible(now) {
                popped.push(entry);
            }

            prop_assert_eq!(popped.len(), priorities.len());
            for pair in popped.windows(2) {
                prop_assert!(pair[0].priority >= pair[1].priority);
                if pair[0].priority == pair[1].priority {
                    prop_assert!(pair[0].task_id < pair[1].task_id);
                }
            }
        }
    }
}
