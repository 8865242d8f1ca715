//! convqueue configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::scheduler::SchedulerConfig;
use crate::validate::ValidationConfig;

/// Main convqueue configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR); the CLI flag wins
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Scheduler limits, timeouts and retry policy
    pub scheduler: SchedulerConfig,

    /// File validation limits
    pub validation: ValidationConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .convqueue.yml
        let local_config = PathBuf::from(".convqueue.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/convqueue/convqueue.yml
        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Best-effort read of `log-level` before logging is set up
    ///
    /// Any failure here is reported again by the full `load` afterwards.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|config| config.log_level)
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("convqueue").join("convqueue.yml"))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let mut config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.scheduler.max_concurrency = config.scheduler.max_concurrency.max(1);

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.log_level, None);
        assert_eq!(config.scheduler.max_concurrency, 3);
        assert_eq!(config.scheduler.max_queue_size, 100);
        assert_eq!(config.validation.max_svg_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug

scheduler:
  max-concurrency: 8
  max-queue-size: 500
  timeout-ms: 30000
  max-retries: 4
  retry-delay-ms: 250
  default-priority: high

validation:
  max-gif-bytes: 1048576
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.scheduler.max_concurrency, 8);
        assert_eq!(config.scheduler.max_queue_size, 500);
        assert_eq!(config.scheduler.timeout_ms, 30000);
        assert_eq!(config.scheduler.max_retries, 4);
        assert_eq!(config.scheduler.retry_delay_ms, 250);
        assert_eq!(config.scheduler.default_priority, Priority::High);
        assert_eq!(config.validation.max_gif_bytes, 1_048_576);
        // Unset keys keep their defaults
        assert_eq!(config.scheduler.sweep_max_age_ms, 600_000);
        assert_eq!(config.validation.max_svg_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "scheduler:\n  max-concurrency: 0\n  max-retries: 1").unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.scheduler.max_concurrency, 1);
        assert_eq!(config.scheduler.max_retries, 1);
    }

    #[test]
    fn test_load_explicit_path_errors() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "scheduler: [not, a, map]").unwrap();
        assert!(Config::load(Some(&file.path().to_path_buf())).is_err());

        let missing = PathBuf::from("/nonexistent/convqueue.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_log_level() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "log-level: warn").unwrap();

        let level = Config::load_log_level(Some(&file.path().to_path_buf()));
        assert_eq!(level.as_deref(), Some("warn"));
    }
}
