//! End-to-end runs of the built-in jobs against a mock API server

mod common;

use common::{TestEnv, WHALE};
use datatask::{ExecutionMode, JobStatus, TaskContext, TaskRunner, jobs};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn all_tasks() -> Vec<String> {
    jobs::default_registry().names()
}

#[tokio::test]
async fn every_job_succeeds_sequentially() {
    let env = TestEnv::start().await;
    env.mount_all_sources().await;

    let runner = TaskRunner::new(jobs::default_registry(), TaskContext::new(env.config()).unwrap());
    let report = runner.run(&all_tasks(), ExecutionMode::Sequential).await;

    assert_eq!(report.total_tasks, 7);
    assert_eq!(report.failed_tasks, 0, "{:?}", report.failures().collect::<Vec<_>>());
    let order: Vec<&str> = report.results.iter().map(|r| r.task.as_str()).collect();
    assert_eq!(
        order,
        ["airdrops", "wallets", "rankings", "headlines", "strategies", "sdk", "tutorials"]
    );

    assert!(env.exists(&format!("data/wallets/{WHALE}_data.json")));
    assert!(env.exists(&format!("content/wallets/{WHALE}.md")));
    assert!(env.exists("content/wallets/index.md"));
    assert!(env.exists("content/rankings/index.md"));
    assert!(env.exists("content/daily/index.md"));
    assert!(env.exists("content/tools/index.md"));
    assert!(env.exists("content/airdrops/index.md"));
    assert!(env.exists("content/strategies/index.md"));
    assert!(env.exists("content/tutorials/index.md"));

    let projects = env.read_json("data/airdrops/projects.json");
    let with_campaigns: Vec<&str> = projects
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["campaigns"][0]["name"] == "Season One")
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(with_campaigns, ["LayerZero", "ZKSync", "Linea"]);

    let strategies = env.read_json("data/strategies/strategy_metrics.json");
    assert_eq!(strategies[0]["name"], "Momentum Strategy");

    let stats = env.read_json(&format!("data/wallets/{WHALE}_stats.json"));
    assert_eq!(stats["token_value_usd"], 25000.0);
    assert_eq!(stats["defi_value_usd"], 1500.0);

    let rankings = env.read_json("data/rankings/current_rankings.json");
    assert_eq!(rankings["defi"][0]["name"], "Lido");
    assert_eq!(rankings["dapps"][0]["name"], "Uniswap");

    let sdks = env.read_json("data/tools/sdk_updates.json");
    let sdks = sdks.as_array().unwrap();
    assert_eq!(sdks.len(), 5);
    for sdk in sdks {
        assert_eq!(sdk["latest_version"], "v2.0.0");
        assert_eq!(sdk["stars"], 4200);
    }
    let web3_py = sdks.iter().find(|s| s["name"] == "web3.py").unwrap();
    assert_eq!(web3_py["pypi_version"], "7.1.0");
    let viem = sdks.iter().find(|s| s["name"] == "viem").unwrap();
    assert_eq!(viem["npm_version"], "4.2.0");
}

#[tokio::test]
async fn concurrent_run_matches_sequential_outputs() {
    let env = TestEnv::start().await;
    env.mount_all_sources().await;

    let runner = TaskRunner::new(jobs::default_registry(), TaskContext::new(env.config()).unwrap());
    let report = runner
        .run(&all_tasks(), ExecutionMode::Concurrent { max_workers: 2 })
        .await;

    assert_eq!(report.total_tasks, 7);
    assert_eq!(report.successful_tasks, 7);
    let mut names: Vec<&str> = report.results.iter().map(|r| r.task.as_str()).collect();
    names.sort_unstable();
    assert_eq!(
        names,
        ["airdrops", "headlines", "rankings", "sdk", "strategies", "tutorials", "wallets"]
    );
    assert!(env.exists("content/tools/index.md"));
    assert!(env.exists("content/wallets/index.md"));
}

#[tokio::test]
async fn failing_source_fails_only_its_job() {
    let env = TestEnv::start().await;
    Mock::given(method("GET"))
        .and(path("/user/token_list"))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .mount(&env.server)
        .await;
    env.mount_all_sources().await;

    let runner = TaskRunner::new(jobs::default_registry(), TaskContext::new(env.config()).unwrap());
    let names = vec!["wallets".to_string(), "rankings".to_string(), "nope".to_string()];
    let report = runner.run(&names, ExecutionMode::Sequential).await;

    assert_eq!(report.total_tasks, 3);
    assert_eq!(report.successful_tasks, 1);
    assert_eq!(report.failed_tasks, 2);

    let wallets = &report.results[0];
    assert_eq!(wallets.status, JobStatus::Failed);
    assert!(wallets.error.as_deref().unwrap().contains("no wallet data"));
    assert!(report.results[1].is_success());
    assert_eq!(report.results[2].error.as_deref(), Some("Unknown task"));
    assert!(!env.exists("content/wallets/index.md"));
}

#[tokio::test]
async fn unavailable_rankings_sources_fall_back_to_samples() {
    let env = TestEnv::start().await;
    // Nothing mounted: every request answers 404

    let runner = TaskRunner::new(jobs::default_registry(), TaskContext::new(env.config()).unwrap());
    let report = runner
        .run(&["rankings".to_string()], ExecutionMode::Sequential)
        .await;

    assert_eq!(report.successful_tasks, 1);
    let rankings = env.read_json("data/rankings/current_rankings.json");
    assert!(!rankings["dapps"].as_array().unwrap().is_empty());
    assert!(!rankings["defi"].as_array().unwrap().is_empty());
    assert!(!rankings["nft_marketplaces"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn report_is_written_where_asked() {
    let env = TestEnv::start().await;
    let runner = TaskRunner::new(jobs::default_registry(), TaskContext::new(env.config()).unwrap());
    let report = runner.run(&["headlines".to_string()], ExecutionMode::Sequential).await;

    let path = report.save(&env.root().join("reports")).await.unwrap();

    assert!(path.ends_with("reports/execution_report.json"));
    let saved = env.read_json("reports/execution_report.json");
    assert_eq!(saved["total_tasks"], 1);
    assert_eq!(saved["successful_tasks"], 1);
    assert_eq!(saved["results"][0]["task"], "headlines");
    assert_eq!(saved["results"][0]["status"], "success");
}
