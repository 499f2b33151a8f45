//! Data-collection jobs
//!
//! One module per report. Jobs backed by external sources fetch through the
//! shared [`TaskContext`](crate::context::TaskContext) and fall back to
//! bundled sample data where the source is optional; the strategy and
//! tutorial jobs work from local files. Each writes its JSON data and a
//! Markdown report under `DATA_DIR` and `CONTENT_DIR`.

pub mod airdrops;
pub mod headlines;
pub mod rankings;
pub mod sdk;
pub mod strategies;
pub mod tutorials;
pub mod wallets;

use crate::runner::TaskRegistry;
use serde::{Deserialize, Deserializer};

pub use airdrops::AirdropsJob;
pub use headlines::HeadlinesJob;
pub use rankings::RankingsJob;
pub use sdk::SdkJob;
pub use strategies::StrategiesJob;
pub use tutorials::TutorialsJob;
pub use wallets::WalletsJob;

/// Registry with every built-in job, in `--list-tasks` order
pub fn default_registry() -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry
        .register(AirdropsJob)
        .register(WalletsJob)
        .register(RankingsJob)
        .register(HeadlinesJob)
        .register(StrategiesJob)
        .register(SdkJob)
        .register(TutorialsJob);
    registry
}

/// Deserialize `null` as the type's default
///
/// External APIs send `null` for missing numbers and strings; combined with
/// `#[serde(default)]` this accepts both absent and null fields.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Timestamp format used in report headers and snapshot metadata
pub(crate) const GENERATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Local time formatted for report headers
pub(crate) fn generated_at() -> String {
    chrono::Local::now().format(GENERATED_AT_FORMAT).to_string()
}

/// Context with every source pointed at `base_url` and all paths under `root`
#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) fn test_context(root: &std::path::Path, base_url: &str) -> crate::context::TaskContext {
    let mut config = crate::config::Config::default();
    config.paths.data_dir = root.join("data");
    config.paths.content_dir = root.join("content");
    config.paths.log_dir = root.join("logs");
    config.cache.dir = root.join("cache");
    config.fetch.request_delay = std::time::Duration::ZERO;
    config.fetch.timeout = std::time::Duration::from_secs(5);
    config.retry.max_retries = 0;
    config.rate_limit.calls_per_minute = 0;
    let sources = &mut config.sources;
    for url in [
        &mut sources.debank,
        &mut sources.dappradar,
        &mut sources.defillama,
        &mut sources.newsapi,
        &mut sources.github,
        &mut sources.npm,
        &mut sources.pypi,
        &mut sources.galxe,
    ] {
        *url = base_url.to_string();
    }
    crate::context::TaskContext::new(config).unwrap()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn default_registry_lists_all_jobs_in_order() {
        let registry = default_registry();
        assert_eq!(
            registry.names(),
            ["airdrops", "wallets", "rankings", "headlines", "strategies", "sdk", "tutorials"]
        );
        assert!(registry.iter().all(|job| !job.description().is_empty()));
    }

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "null_as_default")]
        price: f64,
        #[serde(default, deserialize_with = "null_as_default")]
        symbol: String,
    }

    #[test]
    fn null_and_missing_fields_use_defaults() {
        let s: Sample = serde_json::from_str(r#"{"price": null}"#).unwrap();
        assert_eq!(s.price, 0.0);
        assert_eq!(s.symbol, "");

        let s: Sample = serde_json::from_str(r#"{"price": 2.5, "symbol": "ETH"}"#).unwrap();
        assert_eq!(s.price, 2.5);
        assert_eq!(s.symbol, "ETH");
    }
}
