//! Common test utilities for datatask integration tests

#![allow(dead_code)]

use datatask::Config;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Address used by the wallet fixtures
pub const WHALE: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";

/// Every directory the crate writes to, rooted in one temp dir
pub struct TestEnv {
    pub dir: TempDir,
    pub server: MockServer,
}

impl TestEnv {
    pub async fn start() -> Self {
        Self {
            dir: tempfile::tempdir().expect("temp dir"),
            server: MockServer::start().await,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Environment a test run would see, with every source on the mock server
    pub fn vars(&self) -> HashMap<String, String> {
        let root = self.root();
        let uri = self.server.uri();
        let mut vars: HashMap<String, String> = [
            ("DATA_DIR", root.join("data").display().to_string()),
            ("CONTENT_DIR", root.join("content").display().to_string()),
            ("LOG_DIR", root.join("logs").display().to_string()),
            ("CACHE_DIR", root.join("cache").display().to_string()),
            ("REQUEST_DELAY", "0".to_string()),
            ("REQUEST_TIMEOUT", "5".to_string()),
            ("MAX_RETRIES", "0".to_string()),
            ("RATE_LIMIT_PER_MINUTE", "0".to_string()),
            ("WALLET_ADDRESSES", WHALE.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        for key in [
            "DEBANK_API_URL",
            "DAPPRADAR_API_URL",
            "DEFILLAMA_API_URL",
            "NEWS_API_URL",
            "GITHUB_API_URL",
            "NPM_REGISTRY_URL",
            "PYPI_API_URL",
            "GALXE_API_URL",
        ] {
            vars.insert(key.to_string(), uri.clone());
        }
        vars
    }

    /// Configuration built through the same lookup path as `Config::from_env`
    pub fn config(&self) -> Config {
        self.config_with(&[])
    }

    pub fn config_with(&self, overrides: &[(&str, &str)]) -> Config {
        let mut vars = self.vars();
        for (k, v) in overrides {
            vars.insert((*k).to_string(), (*v).to_string());
        }
        Config::from_lookup(|key| vars.get(key).cloned()).expect("valid test config")
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.root().join(relative))
            .unwrap_or_else(|e| panic!("reading {relative}: {e}"))
    }

    pub fn read_json(&self, relative: &str) -> Value {
        serde_json::from_str(&self.read(relative)).expect("valid JSON")
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.root().join(relative).exists()
    }

    /// Number of requests the mock server has seen
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|r| r.len())
            .unwrap_or(0)
    }

    /// Mount healthy responses for every source the built-in jobs use
    pub async fn mount_all_sources(&self) {
        Mock::given(method("GET"))
            .and(path("/user/token_list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "ETH", "name": "Ether", "chain": "eth", "amount": 10.0, "price": 2000.0},
                {"symbol": "USDC", "name": "USD Coin", "chain": "eth", "amount": 5000.0, "price": 1.0}
            ])))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/complex_protocol_list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "Aave", "chain": "eth", "portfolio_item_list": [{"stats": {"net_usd_value": 1500.0}}]}
            ])))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dapps"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "dapps": [
                    {"name": "Uniswap", "category": "DEX", "chain": "ethereum", "users_24h": 120000, "volume_24h_usd": 5.0e8},
                    {"name": "OpenSea", "category": "Marketplace", "chain": "ethereum", "users_24h": 90000, "volume_24h_usd": 2.0e7}
                ]
            })))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/protocols"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "Lido", "category": "Liquid Staking", "chain": "Ethereum", "tvl": 3.0e10, "change_1d": 1.2},
                {"name": "Aave", "category": "Lending", "chain": "Multi-Chain", "tvl": 1.2e10, "change_1d": null}
            ])))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/repos/[^/]+/[^/]+/releases$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "tag_name": "v2.0.0",
                    "name": "v2.0.0",
                    "published_at": "2026-10-01T12:00:00Z",
                    "html_url": "https://github.com/example/sdk/releases/tag/v2.0.0",
                    "body": "Breaking changes\n```js\nconst client = createClient()\n```"
                }
            ])))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/repos/[^/]+/[^/]+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stargazers_count": 4200, "forks_count": 300, "open_issues_count": 12
            })))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/[^/]+/json$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"info": {"version": "7.1.0"}})))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"spaces": [
                    {"id": "1", "name": "LayerZero"},
                    {"id": "2", "name": "zksync"},
                    {"id": "5", "name": "Linea"}
                ]}
            })))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/spaces/[^/]+/campaigns$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"campaigns": [
                    {"id": "GC1", "name": "Season One", "type": "Drop", "participantsCount": 800}
                ]}
            })))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/[a-z0-9]+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dist-tags": {"latest": "4.2.0"}})))
            .with_priority(10)
            .mount(&self.server)
            .await;
    }
}
