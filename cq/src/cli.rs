//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::domain::Priority;

/// convqueue - bounded-concurrency file processing queue
#[derive(Parser)]
#[command(
    name = "cq",
    about = "Run file validation through a bounded-concurrency priority queue",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate image files, one scheduled task per file
    Validate {
        /// Files to validate
        #[arg(value_name = "PATHS", required = true)]
        paths: Vec<PathBuf>,

        /// Max files validated at once (overrides config)
        #[arg(short = 'n', long)]
        concurrency: Option<usize>,

        /// Per-attempt timeout in milliseconds (overrides config)
        #[arg(short, long)]
        timeout_ms: Option<u64>,

        /// Retries per file after the first attempt (overrides config)
        #[arg(short = 'r', long)]
        max_retries: Option<u32>,

        /// Priority for every submitted file (low, normal, high, critical)
        #[arg(short, long)]
        priority: Option<Priority>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Log file location
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("convqueue")
        .join("logs")
        .join("convqueue.log")
}

/// Output format for validate/config commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => {
                debug!(%s, "OutputFormat::from_str: unknown format");
                Err(format!("Unknown format: {}. Use: text or json", s))
            }
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_validate() {
        let cli = Cli::try_parse_from([
            "cq",
            "-l",
            "debug",
            "validate",
            "a.png",
            "b.svg",
            "--concurrency",
            "4",
            "--priority",
            "high",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Validate {
                paths,
                concurrency,
                priority,
                format,
                timeout_ms,
                max_retries,
            } => {
                assert_eq!(paths, vec![PathBuf::from("a.png"), PathBuf::from("b.svg")]);
                assert_eq!(concurrency, Some(4));
                assert_eq!(priority, Some(Priority::High));
                assert_eq!(format, OutputFormat::Json);
                assert_eq!(timeout_ms, None);
                assert_eq!(max_retries, None);
            }
            other => panic!("expected validate, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_requires_paths() {
        assert!(Cli::try_parse_from(["cq", "validate"]).is_err());
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("plain".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("table".parse::<OutputFormat>().is_err());
    }
}
