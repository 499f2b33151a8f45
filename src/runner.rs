//! Task registry and runner
//!
//! Jobs are registered by name in a [`TaskRegistry`]. A [`TaskRunner`] executes
//! a requested subset either one after another or on a bounded pool of tokio
//! tasks, and condenses the outcomes into an [`ExecutionReport`].
//!
//! Every requested name yields exactly one [`JobResult`]: unknown names fail
//! immediately, and a job that returns an error or panics is recorded as
//! `failed` without disturbing the jobs around it.
//!
//! # Example
//!
//! ```no_run
//! use datatask::config::Config;
//! use datatask::context::TaskContext;
//! use datatask::runner::{ExecutionMode, FnJob, TaskRegistry, TaskRunner};
//!
//! # async fn example() -> datatask::Result<()> {
//! let mut registry = TaskRegistry::new();
//! registry.register(FnJob::new("hello", "Say hello", || async {
//!     tracing::info!("hello");
//!     Ok(())
//! }));
//!
//! let runner = TaskRunner::new(registry, TaskContext::new(Config::default())?);
//! let report = runner
//!     .run(&["hello".to_string()], ExecutionMode::Concurrent { max_workers: 3 })
//!     .await;
//! report.save(std::path::Path::new("logs")).await?;
//! # Ok(())
//! # }
//! ```

use crate::context::TaskContext;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Error recorded for names missing from the registry
pub const UNKNOWN_TASK: &str = "Unknown task";

/// File name of the persisted execution report
pub const REPORT_FILE: &str = "execution_report.json";

/// A named unit of work
#[async_trait]
pub trait Job: Send + Sync {
    /// Registry name used on the command line
    fn name(&self) -> &str;

    /// One-line description for `--list-tasks`
    fn description(&self) -> &str;

    /// Run to completion
    async fn run(&self, ctx: &TaskContext) -> Result<()>;
}

/// Adapter turning a zero-argument async closure into a [`Job`]
pub struct FnJob<F> {
    name: String,
    description: String,
    func: F,
}

impl<F, Fut> FnJob<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    /// Wrap `func` under `name`
    pub fn new(name: impl Into<String>, description: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            func,
        }
    }
}

#[async_trait]
impl<F, Fut> Job for FnJob<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, _ctx: &TaskContext) -> Result<()> {
        (self.func)().await
    }
}

/// Ordered collection of jobs keyed by name
#[derive(Clone, Default)]
pub struct TaskRegistry {
    jobs: Vec<Arc<dyn Job>>,
}

impl TaskRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job, replacing any job already registered under the same name
    pub fn register<J: Job + 'static>(&mut self, job: J) -> &mut Self {
        let job: Arc<dyn Job> = Arc::new(job);
        match self.jobs.iter_mut().find(|j| j.name() == job.name()) {
            Some(slot) => *slot = job,
            None => self.jobs.push(job),
        }
        self
    }

    /// Look up a job by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Job>> {
        self.jobs.iter().find(|j| j.name() == name).cloned()
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<String> {
        self.jobs.iter().map(|j| j.name().to_string()).collect()
    }

    /// Iterate jobs in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Job>> {
        self.jobs.iter()
    }

    /// Number of registered jobs
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("jobs", &self.names())
            .finish()
    }
}

/// How requested jobs are scheduled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One at a time, in request order
    Sequential,
    /// Up to `max_workers` at once, results in completion order
    Concurrent {
        /// Worker bound (values below 1 are treated as 1)
        max_workers: usize,
    },
}

/// Terminal state of a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Completed without error
    Success,
    /// Returned an error, panicked, or was never started
    Failed,
}

/// Outcome of one requested task
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobResult {
    /// Requested task name
    pub task: String,
    /// Final status
    pub status: JobStatus,
    /// Elapsed seconds, present on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Wall-clock start, absent if the job never started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Local>>,
    /// Wall-clock end
    pub end_time: DateTime<Local>,
    /// Stringified error, present on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    fn success(task: String, start_time: DateTime<Local>, end_time: DateTime<Local>, elapsed: f64) -> Self {
        Self {
            task,
            status: JobStatus::Success,
            duration: Some(elapsed),
            start_time: Some(start_time),
            end_time,
            error: None,
        }
    }

    fn failed(task: String, start_time: Option<DateTime<Local>>, error: impl Into<String>) -> Self {
        Self {
            task,
            status: JobStatus::Failed,
            duration: None,
            start_time,
            end_time: Local::now(),
            error: Some(error.into()),
        }
    }

    /// Result for a name that is not registered
    pub fn unknown(task: impl Into<String>) -> Self {
        let now = Local::now();
        Self::failed(task.into(), Some(now), UNKNOWN_TASK)
    }

    /// True if the job succeeded
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}

/// Aggregate of one runner invocation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// When the report was assembled
    pub execution_time: DateTime<Local>,
    /// Number of results
    pub total_tasks: usize,
    /// Results with status `success`
    pub successful_tasks: usize,
    /// Results with status `failed`
    pub failed_tasks: usize,
    /// One entry per requested name
    pub results: Vec<JobResult>,
}

impl ExecutionReport {
    /// Build a report, deriving the counters from `results`
    pub fn from_results(results: Vec<JobResult>) -> Self {
        let successful_tasks = results.iter().filter(|r| r.is_success()).count();
        Self {
            execution_time: Local::now(),
            total_tasks: results.len(),
            successful_tasks,
            failed_tasks: results.len() - successful_tasks,
            results,
        }
    }

    /// Results that failed
    pub fn failures(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    /// Write `execution_report.json` under `dir`
    pub async fn save(&self, dir: &Path) -> Result<PathBuf> {
        crate::output::ensure_directory(dir).await?;
        let path = dir.join(REPORT_FILE);
        crate::output::save_json(self, &path).await?;
        tracing::info!(path = %path.display(), "Execution report saved");
        Ok(path)
    }

    /// Log totals and every failed task with its error
    pub fn log_summary(&self) {
        tracing::info!(
            total = self.total_tasks,
            successful = self.successful_tasks,
            failed = self.failed_tasks,
            "Task summary"
        );
        if self.failed_tasks > 0 {
            tracing::warn!("Failed tasks:");
            for result in self.failures() {
                tracing::warn!(
                    task = %result.task,
                    error = result.error.as_deref().unwrap_or("unknown error"),
                    "  - failed"
                );
            }
        }
    }
}

/// Executes registered jobs against a shared context
pub struct TaskRunner {
    registry: TaskRegistry,
    ctx: Arc<TaskContext>,
}

impl TaskRunner {
    /// Create a runner over `registry`
    pub fn new(registry: TaskRegistry, ctx: TaskContext) -> Self {
        Self {
            registry,
            ctx: Arc::new(ctx),
        }
    }

    /// Registry backing this runner
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Shared context handed to jobs
    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    /// Run the named tasks and report on them
    pub async fn run(&self, names: &[String], mode: ExecutionMode) -> ExecutionReport {
        tracing::info!(tasks = ?names, ?mode, "Running tasks");
        let results = match mode {
            ExecutionMode::Sequential => self.run_sequential(names).await,
            ExecutionMode::Concurrent { max_workers } => {
                self.run_concurrent(names, max_workers).await
            }
        };
        ExecutionReport::from_results(results)
    }

    async fn run_sequential(&self, names: &[String]) -> Vec<JobResult> {
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            match self.registry.get(name) {
                Some(job) => results.push(execute(job.as_ref(), &self.ctx).await),
                None => {
                    tracing::error!(task = %name, "Unknown task");
                    results.push(JobResult::unknown(name.as_str()));
                }
            }
        }
        results
    }

    async fn run_concurrent(&self, names: &[String], max_workers: usize) -> Vec<JobResult> {
        let mut results = Vec::with_capacity(names.len());
        let mut valid = Vec::new();
        for name in names {
            match self.registry.get(name) {
                Some(job) => valid.push(job),
                None => {
                    tracing::error!(task = %name, "Unknown task");
                    results.push(JobResult::unknown(name.as_str()));
                }
            }
        }

        let workers = Arc::new(Semaphore::new(max_workers.max(1)));
        let mut join_set = JoinSet::new();
        let mut outstanding: Vec<String> = Vec::with_capacity(valid.len());

        for job in valid {
            let ctx = Arc::clone(&self.ctx);
            let workers = Arc::clone(&workers);
            outstanding.push(job.name().to_string());

            join_set.spawn(async move {
                let _permit = match workers.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return JobResult::failed(job.name().to_string(), None, e.to_string()),
                };
                execute(job.as_ref(), &ctx).await
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => {
                    if let Some(pos) = outstanding.iter().position(|n| *n == result.task) {
                        outstanding.swap_remove(pos);
                    }
                    results.push(result);
                }
                Err(e) => tracing::error!(error = %e, "Task aborted"),
            }
        }

        // Anything still outstanding was lost with its tokio task
        for name in outstanding {
            results.push(JobResult::failed(name, None, "task aborted"));
        }

        results
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

async fn execute(job: &dyn Job, ctx: &TaskContext) -> JobResult {
    let name = job.name().to_string();
    tracing::info!(task = %name, "Starting task");

    let start_time = Local::now();
    let started = Instant::now();
    let outcome = AssertUnwindSafe(job.run(ctx)).catch_unwind().await;

    match outcome {
        Ok(Ok(())) => {
            let elapsed = started.elapsed().as_secs_f64();
            tracing::info!(task = %name, duration = %format!("{elapsed:.1}s"), "Task succeeded");
            JobResult::success(name, start_time, Local::now(), elapsed)
        }
        Ok(Err(e)) => {
            tracing::error!(task = %name, error = %e, "Task failed");
            JobResult::failed(name, Some(start_time), e.to_string())
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(task = %name, panic = %message, "Task panicked");
            JobResult::failed(name, Some(start_time), format!("panic: {message}"))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn context(tmp: &TempDir) -> TaskContext {
        let mut config = Config::default();
        config.cache.dir = tmp.path().join("cache");
        TaskContext::new(config).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn ok_job(name: &'static str) -> FnJob<impl Fn() -> std::future::Ready<Result<()>> + Send + Sync> {
        FnJob::new(name, format!("{name} job"), || std::future::ready(Ok(())))
    }

    #[tokio::test]
    async fn sequential_preserves_order_and_flags_unknown() {
        let tmp = TempDir::new().unwrap();
        let mut registry = TaskRegistry::new();
        registry.register(ok_job("a")).register(ok_job("b"));
        let runner = TaskRunner::new(registry, context(&tmp));

        let report = runner
            .run(&names(&["a", "unknown", "b"]), ExecutionMode::Sequential)
            .await;

        let order: Vec<_> = report.results.iter().map(|r| r.task.as_str()).collect();
        assert_eq!(order, ["a", "unknown", "b"]);
        assert_eq!(report.total_tasks, 3);
        assert_eq!(report.successful_tasks, 2);
        assert_eq!(report.failed_tasks, 1);

        let unknown = &report.results[1];
        assert_eq!(unknown.status, JobStatus::Failed);
        assert_eq!(unknown.error.as_deref(), Some(UNKNOWN_TASK));
        assert!(unknown.duration.is_none());

        let a = &report.results[0];
        assert!(a.is_success());
        assert!(a.duration.is_some());
        assert!(a.start_time.unwrap() <= a.end_time);
    }

    #[tokio::test]
    async fn sequential_continues_after_failure() {
        let tmp = TempDir::new().unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let mut registry = TaskRegistry::new();
        registry.register(FnJob::new("bad", "fails", || async {
            Err(Error::Job("upstream gone".into()))
        }));
        let counter = Arc::clone(&ran);
        registry.register(FnJob::new("good", "counts", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));
        let runner = TaskRunner::new(registry, context(&tmp));

        let report = runner.run(&names(&["bad", "good"]), ExecutionMode::Sequential).await;

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(report.results[0].error.as_deref(), Some("upstream gone"));
        assert!(report.results[1].is_success());
    }

    fn concurrent_registry(active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>, panics: bool) -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        for name in ["j1", "j2", "j3", "j4"] {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            registry.register(FnJob::new(name, "worker", move || {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    if name == "j3" {
                        if panics {
                            panic!("worker exploded");
                        }
                        return Err(Error::Job("j3 broke".into()));
                    }
                    Ok(())
                }
            }));
        }
        registry
    }

    #[tokio::test]
    async fn concurrent_bounds_workers_and_records_failure() {
        let tmp = TempDir::new().unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let runner = TaskRunner::new(
            concurrent_registry(Arc::clone(&active), Arc::clone(&peak), false),
            context(&tmp),
        );

        let report = runner
            .run(&names(&["j1", "j2", "j3", "j4"]), ExecutionMode::Concurrent { max_workers: 2 })
            .await;

        assert_eq!(report.total_tasks, 4);
        assert_eq!(report.failed_tasks, 1);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        let failed: Vec<_> = report.failures().map(|r| r.task.as_str()).collect();
        assert_eq!(failed, ["j3"]);

        let mut seen: Vec<_> = report.results.iter().map(|r| r.task.clone()).collect();
        seen.sort();
        assert_eq!(seen, ["j1", "j2", "j3", "j4"]);
    }

    #[tokio::test]
    async fn concurrent_survives_panicking_job() {
        let tmp = TempDir::new().unwrap();
        let runner = TaskRunner::new(
            concurrent_registry(Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)), true),
            context(&tmp),
        );

        let report = runner
            .run(&names(&["j1", "j2", "j3", "j4"]), ExecutionMode::Concurrent { max_workers: 2 })
            .await;

        assert_eq!(report.total_tasks, 4);
        assert_eq!(report.failed_tasks, 1);
        let failed = report.failures().next().unwrap();
        assert_eq!(failed.task, "j3");
        assert!(failed.error.as_deref().unwrap().contains("worker exploded"));
    }

    #[tokio::test]
    async fn concurrent_records_unknown_names_first() {
        let tmp = TempDir::new().unwrap();
        let mut registry = TaskRegistry::new();
        registry.register(ok_job("a"));
        let runner = TaskRunner::new(registry, context(&tmp));

        let report = runner
            .run(&names(&["a", "nope"]), ExecutionMode::Concurrent { max_workers: 0 })
            .await;

        assert_eq!(report.results[0].task, "nope");
        assert_eq!(report.results[1].task, "a");
        assert!(report.results[1].is_success());
    }

    #[test]
    fn report_counters_are_consistent() {
        let now = Local::now();
        let results = vec![
            JobResult::success("a".into(), now, now, 0.5),
            JobResult::unknown("x"),
            JobResult::failed("b".into(), Some(now), "boom"),
        ];

        let report = ExecutionReport::from_results(results);

        assert_eq!(report.total_tasks, report.results.len());
        assert_eq!(report.total_tasks, report.successful_tasks + report.failed_tasks);
        assert_eq!(report.failed_tasks, 2);
    }

    #[tokio::test]
    async fn report_is_saved_as_json() {
        let tmp = TempDir::new().unwrap();
        let now = Local::now();
        let report = ExecutionReport::from_results(vec![
            JobResult::success("a".into(), now, now, 1.25),
            JobResult::unknown("zzz"),
        ]);

        let path = report.save(&tmp.path().join("logs")).await.unwrap();

        assert_eq!(path.file_name().unwrap(), REPORT_FILE);
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["total_tasks"], 2);
        assert_eq!(json["successful_tasks"], 1);
        assert_eq!(json["failed_tasks"], 1);
        assert_eq!(json["results"][0]["status"], "success");
        assert_eq!(json["results"][0]["duration"], 1.25);
        assert!(json["results"][0].get("error").is_none());
        assert_eq!(json["results"][1]["status"], "failed");
        assert_eq!(json["results"][1]["error"], UNKNOWN_TASK);
        assert!(json["results"][1].get("duration").is_none());
        assert!(json["execution_time"].is_string());
    }

    #[test]
    fn registry_replaces_duplicate_names() {
        let mut registry = TaskRegistry::new();
        registry.register(ok_job("a")).register(ok_job("b"));
        registry.register(FnJob::new("a", "replacement", || std::future::ready(Ok(()))));

        assert_eq!(registry.names(), ["a", "b"]);
        assert_eq!(registry.get("a").unwrap().description(), "replacement");
        assert!(registry.get("c").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn panic_messages_are_extracted() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "unknown panic");
    }
}
