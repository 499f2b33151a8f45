//! Command-line behaviour through `cli::run`

mod common;

use clap::Parser;
use common::TestEnv;
use datatask::cli::{self, Cli, EXIT_TASK_FAILED, Outcome};
use datatask::{Cache, jobs};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("datatask").chain(args.iter().copied())).unwrap()
}

#[tokio::test]
async fn list_tasks_has_no_side_effects() {
    let env = TestEnv::start().await;
    env.mount_all_sources().await;
    let cli = parse(&["--list-tasks"]);
    let mut out = Vec::new();

    let outcome = cli::run(&cli, jobs::default_registry(), env.config(), &mut out)
        .await
        .unwrap();

    assert!(matches!(outcome, Outcome::Listed));
    assert_eq!(cli.exit_code(&outcome), 0);
    let printed = String::from_utf8(out).unwrap();
    for name in jobs::default_registry().names() {
        assert!(printed.contains(&format!("  {name}: ")), "{printed}");
    }
    assert_eq!(env.request_count().await, 0);
    assert!(!env.exists("cache"));
    assert!(!env.exists("logs"));
    assert!(!env.exists("data"));
}

#[test]
fn list_tasks_works_with_broken_configuration() {
    let dir = tempfile::TempDir::new().unwrap();
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_datatask"))
        .arg("--list-tasks")
        .current_dir(dir.path())
        .env("CACHE_TTL_HOURS", "not-a-number")
        .env("RETRY_BACKOFF", "-1")
        .output()
        .unwrap();

    assert!(output.status.success(), "{output:?}");
    let printed = String::from_utf8(output.stdout).unwrap();
    assert!(printed.starts_with("Available tasks:\n"), "{printed}");
    assert!(printed.contains("  airdrops: "), "{printed}");
    assert!(printed.contains("  tutorials: "), "{printed}");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn broken_configuration_fails_a_run() {
    let dir = tempfile::TempDir::new().unwrap();
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_datatask"))
        .arg("headlines")
        .current_dir(dir.path())
        .env("CACHE_TTL_HOURS", "6000000000000000")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(i32::from(cli::EXIT_SETUP_ERROR)));
    assert!(String::from_utf8_lossy(&output.stderr).contains("out of range"));
}

#[tokio::test]
async fn report_defaults_to_log_dir() {
    let env = TestEnv::start().await;
    let cli = parse(&["headlines"]);
    let mut out = Vec::new();

    let outcome = cli::run(&cli, jobs::default_registry(), env.config(), &mut out)
        .await
        .unwrap();

    let Outcome::Completed(report) = &outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(report.successful_tasks, 1);
    assert_eq!(cli.exit_code(&outcome), 0);
    let saved = env.read_json("logs/execution_report.json");
    assert_eq!(saved["results"][0]["task"], "headlines");
}

#[tokio::test]
async fn output_dir_overrides_report_location() {
    let env = TestEnv::start().await;
    let target = env.root().join("out");
    let cli = parse(&["headlines", "--output-dir", target.to_str().unwrap()]);
    let mut out = Vec::new();

    cli::run(&cli, jobs::default_registry(), env.config(), &mut out)
        .await
        .unwrap();

    assert!(env.exists("out/execution_report.json"));
    assert!(!env.exists("logs/execution_report.json"));
}

#[tokio::test]
async fn unknown_task_fails_only_with_fail_on_error() {
    let env = TestEnv::start().await;
    let mut out = Vec::new();

    let lenient = parse(&["bogus", "headlines"]);
    let outcome = cli::run(&lenient, jobs::default_registry(), env.config(), &mut out)
        .await
        .unwrap();
    assert_eq!(lenient.exit_code(&outcome), 0);

    let strict = parse(&["bogus", "headlines", "--fail-on-error", "--parallel"]);
    let outcome = cli::run(&strict, jobs::default_registry(), env.config(), &mut out)
        .await
        .unwrap();
    assert_eq!(strict.exit_code(&outcome), EXIT_TASK_FAILED);

    let Outcome::Completed(report) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(report.results[0].task, "bogus");
    assert_eq!(report.failed_tasks, 1);
    assert!(String::from_utf8(out).unwrap().contains("  - bogus: Unknown task"));
}

#[tokio::test]
async fn purge_cache_removes_expired_entries() {
    let env = TestEnv::start().await;
    let config = env.config();

    let cache = Cache::new(config.cache.dir.clone(), config.cache.ttl);
    cache.set("old_entry", &serde_json::json!({"v": 1})).await;
    cache.set("fresh_entry", &serde_json::json!({"v": 2})).await;
    let entry = cache.entry_path("old_entry");
    assert!(entry.exists());

    // Backdate past the default 24h TTL
    let mut raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&entry).unwrap()).unwrap();
    let old = chrono::Utc::now() - chrono::Duration::hours(48);
    raw["timestamp"] = serde_json::json!(old);
    std::fs::write(&entry, raw.to_string()).unwrap();

    let cli = parse(&["headlines", "--purge-cache"]);
    let mut out = Vec::new();
    cli::run(&cli, jobs::default_registry(), config, &mut out)
        .await
        .unwrap();

    assert!(!entry.exists());
    assert!(cache.entry_path("fresh_entry").exists());
    assert!(String::from_utf8(out).unwrap().contains("Purged 1 expired cache entries"));
}
