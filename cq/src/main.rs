//! convqueue - bounded-concurrency file processing queue
//!
//! CLI entry point for validating files through the scheduler.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info};

use convqueue::cli::{Cli, Command, OutputFormat, get_log_path};
use convqueue::config::Config;
use convqueue::domain::{Priority, TaskOptions};
use convqueue::scheduler::{QueueStatus, Scheduler, SchedulerError};
use convqueue::validate::{FileReport, FileValidation};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Validate {
            paths,
            concurrency,
            timeout_ms,
            max_retries,
            priority,
            format,
        } => {
            let overrides = Overrides {
                concurrency,
                timeout_ms,
                max_retries,
                priority,
            };
            cmd_validate(&config, overrides, paths, format).await
        }
        Command::Config { format } => cmd_config(&config, format),
    }
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Default)]
struct Overrides {
    concurrency: Option<usize>,
    timeout_ms: Option<u64>,
    max_retries: Option<u32>,
    priority: Option<Priority>,
}

/// Outcome of one file, as printed
#[derive(Debug, Serialize)]
struct FileResult {
    path: PathBuf,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<FileReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl FileResult {
    fn new(path: PathBuf, result: Result<FileReport, SchedulerError>) -> Self {
        match result {
            Ok(report) => Self {
                path,
                status: if report.valid { "ok" } else { "invalid" },
                report: Some(report),
                error: None,
            },
            Err(e) => Self {
                path,
                status: "error",
                report: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn passed(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug, Serialize)]
struct ValidateOutput {
    files: Vec<FileResult>,
    status: QueueStatus,
}

/// Validate every path through a scheduler built from the effective config
async fn cmd_validate(config: &Config, overrides: Overrides, paths: Vec<PathBuf>, format: OutputFormat) -> Result<()> {
    debug!(?overrides, count = paths.len(), "cmd_validate: called");
    let mut scheduler_config = config.scheduler.clone();
    if let Some(concurrency) = overrides.concurrency {
        scheduler_config.max_concurrency = concurrency;
    }
    if let Some(timeout_ms) = overrides.timeout_ms {
        scheduler_config.timeout_ms = timeout_ms;
    }
    if let Some(max_retries) = overrides.max_retries {
        scheduler_config.max_retries = max_retries;
    }
    // Every path on the command line is accepted, even past the queue limit
    scheduler_config.max_queue_size = scheduler_config.max_queue_size.max(paths.len());

    let scheduler: Scheduler<FileReport> = Scheduler::new(scheduler_config);

    let mut submitted = Vec::with_capacity(paths.len());
    for path in paths {
        let mut options = TaskOptions::new().with_metadata("path", path.display().to_string());
        if let Some(priority) = overrides.priority {
            options = options.with_priority(priority);
        }
        let work = FileValidation::new(path.clone(), config.validation.clone());
        let handle = scheduler
            .submit(work, options)
            .await
            .context(format!("Failed to queue {}", path.display()))?;
        submitted.push((path, handle));
    }

    let (paths, handles): (Vec<_>, Vec<_>) = submitted.into_iter().unzip();
    let outcomes = join_all(handles).await;
    let files: Vec<FileResult> = paths
        .into_iter()
        .zip(outcomes)
        .map(|(path, outcome)| FileResult::new(path, outcome))
        .collect();

    let output = ValidateOutput {
        status: scheduler.status().await,
        files,
    };
    let failed = output.files.iter().filter(|f| !f.passed()).count();
    info!(total = output.files.len(), failed, "Validation finished");

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => print_validate_text(&output),
    }

    if failed > 0 {
        return Err(eyre::eyre!("{} of {} files failed validation", failed, output.files.len()));
    }
    Ok(())
}

fn print_validate_text(output: &ValidateOutput) {
    for file in &output.files {
        let path = file.path.display();
        match (&file.report, &file.error) {
            (Some(report), _) if report.valid => {
                let kind = report.kind.map(|k| k.to_string()).unwrap_or_else(|| "unknown".to_string());
                println!("{} {} ({}, {} bytes)", "ok     ".green(), path, kind, report.size);
                for warning in &report.warnings {
                    println!("        {} {}", "warning:".yellow(), warning);
                }
            }
            (Some(report), _) => {
                println!("{} {}", "invalid".red(), path);
                for error in &report.errors {
                    println!("        {}", error);
                }
            }
            (None, error) => {
                println!("{} {}: {}", "error  ".red(), path, error.as_deref().unwrap_or("unknown error"));
            }
        }
    }

    let status = &output.status;
    let stats = &status.stats;
    println!();
    println!("Queue Status");
    println!("------------");
    println!("Concurrency: {} (peak {})", status.max_concurrency, stats.peak_concurrent);
    println!("Utilization: {}", status.utilization_percent());
    println!("Submitted:   {}", stats.total_submitted);
    println!("  Completed: {}", stats.completed);
    println!("  Failed:    {}", stats.failed);
    println!("  Retries:   {}", stats.total_retries);
    println!("  Timeouts:  {}", stats.total_timeouts);
    println!("Average execution: {:.1}ms", stats.average_execution_ms);
}

/// Print the effective configuration
fn cmd_config(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(%format, "cmd_config: called");
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", serde_yaml::to_string(config)?),
    }
    Ok(())
}
