//! Configuration types for datatask
//!
//! Every setting has a documented default and can be overridden from the
//! environment at process start via [`Config::from_env`]. Tests build a
//! configuration from an in-memory map through [`Config::from_lookup`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, path::PathBuf, str::FromStr, time::Duration};

/// API credentials for external sources
///
/// All keys are optional: jobs fall back to sample data or unauthenticated
/// endpoints when a key is missing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApiKeys {
    /// NewsAPI key (`NEWS_API_KEY`); without it the headlines job uses sample news
    #[serde(default)]
    pub news_api_key: Option<String>,

    /// GitHub token (`GITHUB_TOKEN`) for higher API rate limits
    #[serde(default)]
    pub github_token: Option<String>,

    /// DeBank access key (`DEBANK_ACCESS_KEY`), sent as the `AccessKey` header
    #[serde(default)]
    pub debank_access_key: Option<String>,
}

/// Output and state directories
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathConfig {
    /// JSON snapshots (default: "data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Markdown reports (default: "content")
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,

    /// Log files (default: "logs")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            content_dir: default_content_dir(),
            log_dir: default_log_dir(),
        }
    }
}

/// HTTP client behaviour
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Pause between per-item requests inside a job (default: 1 second)
    #[serde(default = "default_request_delay", with = "secs_f64_serde")]
    pub request_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            request_delay: default_request_delay(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Number of retries after the first attempt (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (default: 1 second)
    #[serde(default = "default_base_delay", with = "secs_f64_serde")]
    pub base_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound for a single backoff delay (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: default_base_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay: default_max_delay(),
            jitter: false,
        }
    }
}

/// Outbound request rate limit shared by all jobs
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Calls admitted per trailing minute (default: 60, 0 = unlimited)
    #[serde(default = "default_calls_per_minute")]
    pub calls_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls_per_minute: default_calls_per_minute(),
        }
    }
}

/// File cache settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory (default: "cache")
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Entry lifetime (default: 24 hours)
    #[serde(default = "default_cache_ttl", with = "duration_serde")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            ttl: default_cache_ttl(),
        }
    }
}

/// Base URLs of the external sources
///
/// Overridable so that tests and mirrors can point jobs elsewhere.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// DeBank OpenAPI (`DEBANK_API_URL`)
    pub debank: String,
    /// DappRadar API (`DAPPRADAR_API_URL`)
    pub dappradar: String,
    /// DefiLlama API (`DEFILLAMA_API_URL`)
    pub defillama: String,
    /// NewsAPI (`NEWS_API_URL`)
    pub newsapi: String,
    /// GitHub REST API (`GITHUB_API_URL`)
    pub github: String,
    /// npm registry (`NPM_REGISTRY_URL`)
    pub npm: String,
    /// PyPI JSON API (`PYPI_API_URL`)
    pub pypi: String,
    /// Galxe campaign API (`GALXE_API_URL`)
    pub galxe: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            debank: "https://openapi.debank.com/v1".into(),
            dappradar: "https://dappradar.com/api".into(),
            defillama: "https://api.llama.fi".into(),
            newsapi: "https://newsapi.org/v2".into(),
            github: "https://api.github.com".into(),
            npm: "https://registry.npmjs.org".into(),
            pypi: "https://pypi.org/pypi".into(),
            galxe: "https://galxe.com/api/v1".into(),
        }
    }
}

/// Wallets tracked by the `wallets` job
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Addresses to track (`WALLET_ADDRESSES`, comma separated)
    #[serde(default = "default_wallet_addresses")]
    pub addresses: Vec<String>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            addresses: default_wallet_addresses(),
        }
    }
}

/// A developer SDK tracked by the `sdk` job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkSpec {
    /// Display name
    pub name: String,
    /// GitHub owner
    pub repo_owner: String,
    /// GitHub repository
    pub repo_name: String,
    /// npm package name, if published there
    #[serde(default)]
    pub npm_package: Option<String>,
    /// PyPI package name, if published there
    #[serde(default)]
    pub pypi_package: Option<String>,
}

impl SdkSpec {
    fn new(name: &str, owner: &str, repo: &str) -> Self {
        Self {
            name: name.into(),
            repo_owner: owner.into(),
            repo_name: repo.into(),
            npm_package: None,
            pypi_package: None,
        }
    }

    fn npm(mut self, package: &str) -> Self {
        self.npm_package = Some(package.into());
        self
    }

    fn pypi(mut self, package: &str) -> Self {
        self.pypi_package = Some(package.into());
        self
    }

    /// Public GitHub URL of the repository
    pub fn repo_url(&self) -> String {
        format!("https://github.com/{}/{}", self.repo_owner, self.repo_name)
    }
}

/// SDKs tracked by the `sdk` job
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SdkConfig {
    /// Tracked SDKs
    #[serde(default = "default_sdks")]
    pub sdks: Vec<SdkSpec>,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            sdks: default_sdks(),
        }
    }
}

/// Main configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// API credentials
    #[serde(default)]
    pub api: ApiKeys,

    /// Output directories
    #[serde(default)]
    pub paths: PathConfig,

    /// HTTP client behaviour
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Retry policy for source fetches
    #[serde(default)]
    pub retry: RetryConfig,

    /// Shared outbound rate limit
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// File cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Source base URLs
    #[serde(default)]
    pub sources: SourceConfig,

    /// Wallet tracking
    #[serde(default)]
    pub wallets: WalletConfig,

    /// SDK tracking
    #[serde(default)]
    pub sdk: SdkConfig,

    /// Verbose logging (`DEBUG=true`)
    #[serde(default)]
    pub debug: bool,
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    ///
    /// Unset or empty variables keep their defaults. Values that fail to
    /// parse produce [`Error::Config`] naming the offending variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let api = ApiKeys {
            news_api_key: get("NEWS_API_KEY"),
            github_token: get("GITHUB_TOKEN"),
            debank_access_key: get("DEBANK_ACCESS_KEY"),
        };

        let paths = PathConfig {
            data_dir: get("DATA_DIR").map_or(defaults.paths.data_dir, PathBuf::from),
            content_dir: get("CONTENT_DIR").map_or(defaults.paths.content_dir, PathBuf::from),
            log_dir: get("LOG_DIR").map_or(defaults.paths.log_dir, PathBuf::from),
        };

        let fetch = FetchConfig {
            user_agent: get("USER_AGENT").unwrap_or(defaults.fetch.user_agent),
            timeout: Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT", 30u64)?),
            request_delay: secs_f64(&get, "REQUEST_DELAY", 1.0)?,
        };

        let retry = RetryConfig {
            max_retries: parse_or(&get, "MAX_RETRIES", defaults.retry.max_retries)?,
            base_delay: secs_f64(&get, "RETRY_BASE_DELAY", 1.0)?,
            backoff_multiplier: backoff(&get, defaults.retry.backoff_multiplier)?,
            max_delay: defaults.retry.max_delay,
            jitter: parse_bool(&get, "RETRY_JITTER", false)?,
        };

        let rate_limit = RateLimitConfig {
            calls_per_minute: parse_or(
                &get,
                "RATE_LIMIT_PER_MINUTE",
                defaults.rate_limit.calls_per_minute,
            )?,
        };

        let cache = CacheConfig {
            dir: get("CACHE_DIR").map_or(defaults.cache.dir, PathBuf::from),
            ttl: ttl_hours(&get, 24)?,
        };

        let d = defaults.sources;
        let sources = SourceConfig {
            debank: get("DEBANK_API_URL").unwrap_or(d.debank),
            dappradar: get("DAPPRADAR_API_URL").unwrap_or(d.dappradar),
            defillama: get("DEFILLAMA_API_URL").unwrap_or(d.defillama),
            newsapi: get("NEWS_API_URL").unwrap_or(d.newsapi),
            github: get("GITHUB_API_URL").unwrap_or(d.github),
            npm: get("NPM_REGISTRY_URL").unwrap_or(d.npm),
            pypi: get("PYPI_API_URL").unwrap_or(d.pypi),
            galxe: get("GALXE_API_URL").unwrap_or(d.galxe),
        };
        for (key, value) in [
            ("DEBANK_API_URL", &sources.debank),
            ("DAPPRADAR_API_URL", &sources.dappradar),
            ("DEFILLAMA_API_URL", &sources.defillama),
            ("NEWS_API_URL", &sources.newsapi),
            ("GITHUB_API_URL", &sources.github),
            ("NPM_REGISTRY_URL", &sources.npm),
            ("PYPI_API_URL", &sources.pypi),
            ("GALXE_API_URL", &sources.galxe),
        ] {
            url::Url::parse(value)
                .map_err(|e| Error::config(key, format!("invalid URL {value:?}: {e}")))?;
        }

        let wallets = match get("WALLET_ADDRESSES") {
            Some(list) => WalletConfig {
                addresses: list
                    .split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect(),
            },
            None => defaults.wallets,
        };

        Ok(Config {
            api,
            paths,
            fetch,
            retry,
            rate_limit,
            cache,
            sources,
            wallets,
            sdk: defaults.sdk,
            debug: parse_bool(&get, "DEBUG", false)?,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(key, format!("cannot parse {raw:?}: {e}"))),
        None => Ok(default),
    }
}

fn secs_f64<G>(get: &G, key: &str, default: f64) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let secs: f64 = parse_or(get, key, default)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::config(key, format!("invalid duration {secs}: {e}")))
}

fn ttl_hours<G>(get: &G, default: u64) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let hours: u64 = parse_or(get, "CACHE_TTL_HOURS", default)?;
    hours
        .checked_mul(3600)
        .map(Duration::from_secs)
        .ok_or_else(|| {
            Error::config("CACHE_TTL_HOURS", format!("{hours} hours is out of range"))
        })
}

/// `RETRY_BACKOFF`, which must be finite and positive
fn backoff<G>(get: &G, default: f64) -> Result<f64>
where
    G: Fn(&str) -> Option<String>,
{
    let factor: f64 = parse_or(get, "RETRY_BACKOFF", default)?;
    if factor.is_finite() && factor > 0.0 {
        Ok(factor)
    } else {
        Err(Error::config(
            "RETRY_BACKOFF",
            format!("expected a positive finite number, got {factor}"),
        ))
    }
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes") => Ok(true),
        Some(v) if matches!(v.as_str(), "false" | "0" | "no") => Ok(false),
        Some(v) => Err(Error::config(key, format!("expected a boolean, got {v:?}"))),
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("content")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_request_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_calls_per_minute() -> u32 {
    60
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_wallet_addresses() -> Vec<String> {
    vec![
        "0x742d35Cc6634C0532925a3b844Bc454e4438f44e".into(),
        "0x28c6c06298d514db089934071355e5743bf21d60".into(),
        "0xbe0eb53f46cd790cd13851d5eff43d12404d33e8".into(),
    ]
}

fn default_sdks() -> Vec<SdkSpec> {
    vec![
        SdkSpec::new("web3.js", "web3", "web3.js").npm("web3"),
        SdkSpec::new("ethers.js", "ethers-io", "ethers.js").npm("ethers"),
        SdkSpec::new("web3.py", "ethereum", "web3.py").pypi("web3"),
        SdkSpec::new("wagmi", "wevm", "wagmi").npm("wagmi"),
        SdkSpec::new("viem", "wevm", "viem").npm("viem"),
    ]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Fractional-second Duration serialization helper
mod secs_f64_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
