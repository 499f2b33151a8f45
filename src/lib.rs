//! # datatask
//!
//! Data collection and static report jobs for a Web3 content site.
//!
//! ## Design Philosophy
//!
//! datatask is designed to be:
//! - **Resilient** - A failing source degrades to cached or sample data, a failing job never stops the rest
//! - **Polite** - One shared rate limiter and a file cache sit in front of every outbound request
//! - **Configurable** - Every directory, endpoint, limit and credential comes from the environment
//! - **Library-first** - The binary is a thin clap wrapper over [`cli::run`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use datatask::{Config, ExecutionMode, TaskContext, TaskRunner, jobs};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let ctx = TaskContext::new(config)?;
//!     let runner = TaskRunner::new(jobs::default_registry(), ctx);
//!
//!     let names = runner.registry().names();
//!     let report = runner
//!         .run(&names, ExecutionMode::Concurrent { max_workers: 3 })
//!         .await;
//!     report.log_summary();
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// File-backed response cache with TTL
pub mod cache;
/// Command-line surface
pub mod cli;
/// Configuration types
pub mod config;
/// Shared services handed to every job
pub mod context;
/// Error types
pub mod error;
/// HTTP fetching and the cached source pipeline
pub mod fetch;
/// Concrete data jobs
pub mod jobs;
/// JSON and Markdown persistence helpers
pub mod output;
/// Sliding-window rate limiter
pub mod rate_limiter;
/// Retry logic with exponential backoff
pub mod retry;
/// Task registry and runner
pub mod runner;
/// Formatting and validation helpers
pub mod utils;

// Re-export commonly used types
pub use cache::Cache;
pub use config::Config;
pub use context::TaskContext;
pub use error::{Error, Result};
pub use fetch::{FetchClient, FetchRequest, Source, SourceResult};
pub use rate_limiter::RateLimiter;
pub use retry::{IsRetryable, RetryPolicy};
pub use runner::{
    ExecutionMode, ExecutionReport, FnJob, Job, JobResult, JobStatus, TaskRegistry, TaskRunner,
};
