//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::Priority;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Max tasks executing at once
    #[serde(rename = "max-concurrency", default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Max pending tasks accepted before submissions are rejected
    #[serde(rename = "max-queue-size", default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Per-attempt timeout in milliseconds
    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries allowed after the first attempt
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Linear backoff base: retry n waits `n * retry-delay-ms`
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// How often the housekeeping loop sweeps finished tasks
    #[serde(rename = "sweep-interval-ms", default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Finished tasks older than this are dropped by the sweep
    #[serde(rename = "sweep-max-age-ms", default = "default_sweep_max_age_ms")]
    pub sweep_max_age_ms: u64,

    /// Default priority for new tasks
    #[serde(rename = "default-priority", default)]
    pub default_priority: Priority,
}

fn default_max_concurrency() -> usize {
    3
}

fn default_max_queue_size() -> usize {
    100
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_sweep_interval_ms() -> u64 {
    5 * 60 * 1000
}

fn default_sweep_max_age_ms() -> u64 {
    10 * 60 * 1000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_queue_size: default_max_queue_size(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            sweep_max_age_ms: default_sweep_max_age_ms(),
            default_priority: Priority::Normal,
        }
    }
}

impl SchedulerConfig {
    /// Get the per-attempt timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Backoff before the given retry (1-based)
    pub fn retry_delay(&self, retry: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(u64::from(retry)))
    }

    /// Get the sweep interval as a Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Get the sweep max age as a Duration
    pub fn sweep_max_age(&self) -> Duration {
        Duration::from_millis(self.sweep_max_age_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_concurrency, 3);
        assert_eq!(config.max_queue_size, 100);
        assert_eq!(config.timeout_ms, 60_000);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.default_priority, Priority::Normal);
    }

    #[test]
    fn test_retry_delay_is_linear() {
        let config = SchedulerConfig::default();
        assert_eq!(config.retry_delay(1), Duration::from_secs(1));
        assert_eq!(config.retry_delay(2), Duration::from_secs(2));
        assert_eq!(config.retry_delay(5), Duration::from_secs(5));
    }

    #[test]
    fn test_durations() {
        let config = SchedulerConfig {
            timeout_ms: 50,
            ..Default::default()
        };
        assert_eq!(config.timeout(), Duration::from_millis(50));
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.sweep_max_age(), Duration::from_secs(600));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: SchedulerConfig = serde_yaml::from_str("max-concurrency: 8\ntimeout-ms: 1500\n").unwrap();
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.timeout_ms, 1500);
        assert_eq!(config.max_queue_size, 100);
        assert_eq!(config.max_retries, 2);
    }
}
