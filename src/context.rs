//! Shared services handed to every job
//!
//! A [`TaskContext`] is built once at process start and passed by reference
//! into each job. It replaces process-wide singletons: tests construct their
//! own context pointing at temporary directories and mock servers.

use crate::cache::Cache;
use crate::config::Config;
use crate::error::Result;
use crate::fetch::{FetchClient, FetchRequest, Source};
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Configuration plus the cache, limiter, HTTP client and retry policy
#[derive(Clone, Debug)]
pub struct TaskContext {
    /// Loaded configuration
    pub config: Arc<Config>,
    /// Payload cache
    pub cache: Cache,
    /// Outbound request limiter shared by all jobs
    pub rate_limiter: Arc<RateLimiter>,
    /// HTTP client
    pub client: FetchClient,
    /// Retry policy for source fetches
    pub retry: RetryPolicy,
}

impl TaskContext {
    /// Build every service from configuration
    pub fn new(config: Config) -> Result<Self> {
        let cache = Cache::from_config(&config.cache);
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.calls_per_minute));
        let client = FetchClient::new(&config.fetch)?;
        let retry = RetryPolicy::from_config(&config.retry);

        tracing::debug!(
            cache_dir = %config.cache.dir.display(),
            calls_per_minute = config.rate_limit.calls_per_minute,
            max_retries = config.retry.max_retries,
            "Task context ready"
        );

        Ok(Self {
            config: Arc::new(config),
            cache,
            rate_limiter,
            client,
            retry,
        })
    }

    /// Cache-then-network fetcher for the given cache key
    pub fn source(&self, key: impl Into<String>) -> Source<'_> {
        Source {
            key: key.into(),
            client: &self.client,
            cache: &self.cache,
            rate_limiter: &self.rate_limiter,
            retry: &self.retry,
        }
    }

    /// Retried, rate-limited JSON GET that bypasses the cache
    ///
    /// For payloads assembled from several requests, where the job caches
    /// the combined value itself.
    pub async fn fetch_json<T: DeserializeOwned>(&self, request: &FetchRequest) -> Result<T> {
        self.retry
            .run_retryable(|| self.client.get_json::<T>(request, Some(self.rate_limiter.as_ref())))
            .await
    }

    /// Pause between per-item requests inside a job
    pub async fn pace(&self) {
        let delay = self.config.fetch.request_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
