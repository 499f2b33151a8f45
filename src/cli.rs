//! Command-line surface
//!
//! Parsing lives in [`Cli`]; [`run`] does the work so that tests can drive
//! it with an explicit configuration, registry and output sink.

use crate::config::Config;
use crate::context::TaskContext;
use crate::error::Result;
use crate::runner::{ExecutionMode, ExecutionReport, TaskRegistry, TaskRunner};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;

/// Exit code when at least one task failed and `--fail-on-error` is set
pub const EXIT_TASK_FAILED: u8 = 1;

/// Exit code for setup errors (configuration, report persistence)
pub const EXIT_SETUP_ERROR: u8 = 2;

/// Run crypto data collection and report jobs
#[derive(Debug, Clone, Parser)]
#[command(name = "datatask", version, about, long_about = None)]
pub struct Cli {
    /// Tasks to run (default: every registered task)
    #[arg(value_name = "TASK")]
    pub tasks: Vec<String>,

    /// Run tasks concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Maximum concurrent tasks with --parallel
    #[arg(long, default_value_t = 3, value_name = "N")]
    pub max_workers: usize,

    /// Print the available tasks and exit
    #[arg(long)]
    pub list_tasks: bool,

    /// Directory for execution_report.json (default: LOG_DIR)
    #[arg(long, value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    /// Exit with status 1 if any task failed
    #[arg(long)]
    pub fail_on_error: bool,

    /// Delete expired cache entries before running
    #[arg(long)]
    pub purge_cache: bool,
}

impl Cli {
    /// Scheduling mode selected by the flags
    pub fn mode(&self) -> ExecutionMode {
        if self.parallel {
            ExecutionMode::Concurrent {
                max_workers: self.max_workers.max(1),
            }
        } else {
            ExecutionMode::Sequential
        }
    }

    /// Process exit code for a finished invocation
    pub fn exit_code(&self, outcome: &Outcome) -> u8 {
        match outcome {
            Outcome::Completed(report) if self.fail_on_error && report.failed_tasks > 0 => {
                EXIT_TASK_FAILED
            }
            _ => 0,
        }
    }
}

/// What an invocation did
#[derive(Debug)]
pub enum Outcome {
    /// `--list-tasks`: nothing was executed
    Listed,
    /// Tasks ran and the report was saved
    Completed(ExecutionReport),
}

/// Write the registry as `name: description` lines
pub fn list_tasks(registry: &TaskRegistry, out: &mut impl Write) -> Result<()> {
    writeln!(out, "Available tasks:")?;
    for job in registry.iter() {
        writeln!(out, "  {}: {}", job.name(), job.description())?;
    }
    Ok(())
}

/// Execute one invocation
///
/// `--list-tasks` returns before any service is built, so it performs no
/// network or cache access and writes no report.
pub async fn run(cli: &Cli, registry: TaskRegistry, config: Config, out: &mut impl Write) -> Result<Outcome> {
    if cli.list_tasks {
        list_tasks(&registry, out)?;
        return Ok(Outcome::Listed);
    }

    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| config.paths.log_dir.clone());
    let ctx = TaskContext::new(config)?;

    if cli.purge_cache {
        let removed = ctx.cache.purge_expired().await;
        writeln!(out, "Purged {removed} expired cache entries")?;
    }

    let names = if cli.tasks.is_empty() {
        registry.names()
    } else {
        cli.tasks.clone()
    };

    let runner = TaskRunner::new(registry, ctx);
    let report = runner.run(&names, cli.mode()).await;
    let path = report.save(&output_dir).await?;
    report.log_summary();

    writeln!(
        out,
        "{} tasks: {} succeeded, {} failed (report: {})",
        report.total_tasks,
        report.successful_tasks,
        report.failed_tasks,
        path.display()
    )?;
    for failed in report.failures() {
        writeln!(
            out,
            "  - {}: {}",
            failed.task,
            failed.error.as_deref().unwrap_or("unknown error")
        )?;
    }

    Ok(Outcome::Completed(report))
}
