//! HTTP fetching for external data sources
//!
//! [`FetchClient`] performs single GET requests: optionally rate limited,
//! never retried, failures reported as `None` (or as an [`Error`] through
//! [`FetchClient::try_fetch`] for callers that retry).
//!
//! [`Source`] layers the cache and a [`RetryPolicy`] on top of it and returns
//! a [`SourceResult`], so jobs choose their fallback explicitly.

use crate::cache::Cache;
use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

/// A GET request description
#[derive(Clone, Debug, Default)]
pub struct FetchRequest {
    /// Absolute URL
    pub url: String,
    /// Extra headers
    pub headers: Vec<(String, String)>,
    /// Query parameters
    pub params: Vec<(String, String)>,
    /// Per-request timeout (None = client default)
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    /// Start a GET request for `url`
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a header when the value is present
    pub fn header_opt(self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.header(name, value),
            None => self,
        }
    }

    /// Add a query parameter
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    /// Override the timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Thin wrapper over a shared `reqwest::Client`
#[derive(Clone, Debug)]
pub struct FetchClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl FetchClient {
    /// Build a client with the configured user agent and default timeout
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    /// Default per-request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue one GET, returning `None` on transport failure or non-2xx status
    ///
    /// Failures are logged; callers treat `None` as "try the next source".
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        rate_limiter: Option<&RateLimiter>,
    ) -> Option<reqwest::Response> {
        match self.try_fetch(request, rate_limiter).await {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::error!(url = %request.url, error = %e, "Request failed");
                None
            }
        }
    }

    /// Issue one GET, mapping transport failures and non-2xx statuses to errors
    pub async fn try_fetch(
        &self,
        request: &FetchRequest,
        rate_limiter: Option<&RateLimiter>,
    ) -> Result<reqwest::Response> {
        if let Some(limiter) = rate_limiter {
            limiter.admit().await;
        }

        let mut builder = self
            .client
            .get(&request.url)
            .timeout(request.timeout.unwrap_or(self.timeout));
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        tracing::debug!(url = %request.url, "GET");
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// GET and decode a JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        request: &FetchRequest,
        rate_limiter: Option<&RateLimiter>,
    ) -> Result<T> {
        let response = self.try_fetch(request, rate_limiter).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Outcome of fetching from an external source
#[derive(Clone, Debug, PartialEq)]
pub enum SourceResult<T> {
    /// Data obtained from cache or network
    Available(T),
    /// Source could not be reached; the reason is the final error
    Unavailable(String),
}

impl<T> SourceResult<T> {
    /// True if data was obtained
    pub fn is_available(&self) -> bool {
        matches!(self, SourceResult::Available(_))
    }

    /// Convert into an Option, discarding the reason
    pub fn ok(self) -> Option<T> {
        match self {
            SourceResult::Available(value) => Some(value),
            SourceResult::Unavailable(_) => None,
        }
    }

    /// Return the data or compute a fallback from the failure reason
    pub fn unwrap_or_else(self, fallback: impl FnOnce(&str) -> T) -> T {
        match self {
            SourceResult::Available(value) => value,
            SourceResult::Unavailable(reason) => fallback(&reason),
        }
    }

    /// Transform available data
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SourceResult<U> {
        match self {
            SourceResult::Available(value) => SourceResult::Available(f(value)),
            SourceResult::Unavailable(reason) => SourceResult::Unavailable(reason),
        }
    }
}

/// Cache-then-network fetch for one logical key
///
/// Usually obtained from [`TaskContext::source`](crate::context::TaskContext::source).
pub struct Source<'a> {
    pub(crate) key: String,
    pub(crate) client: &'a FetchClient,
    pub(crate) cache: &'a Cache,
    pub(crate) rate_limiter: &'a RateLimiter,
    pub(crate) retry: &'a RetryPolicy,
}

impl Source<'_> {
    /// Cache key of this source
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fetch a JSON payload of type `T`, caching it on success
    pub async fn fetch_json<T>(&self, request: FetchRequest) -> SourceResult<T>
    where
        T: DeserializeOwned + Serialize,
    {
        self.fetch_json_with(request, |raw: T| raw).await
    }

    /// Fetch a raw payload, normalise it, and cache the normalised value
    ///
    /// A cache hit returns the previously normalised value without touching
    /// the network.
    pub async fn fetch_json_with<R, T, F>(&self, request: FetchRequest, normalize: F) -> SourceResult<T>
    where
        R: DeserializeOwned,
        T: DeserializeOwned + Serialize,
        F: FnOnce(R) -> T,
    {
        if let Some(cached) = self.cache.get::<T>(&self.key).await {
            tracing::debug!(key = %self.key, "Using cached data");
            return SourceResult::Available(cached);
        }

        let fetched = self
            .retry
            .run_retryable(|| self.client.get_json::<R>(&request, Some(self.rate_limiter)))
            .await;

        match fetched {
            Ok(raw) => {
                let value = normalize(raw);
                self.cache.set(&self.key, &value).await;
                tracing::info!(key = %self.key, url = %request.url, "Fetched source");
                SourceResult::Available(value)
            }
            Err(e) => {
                tracing::warn!(key = %self.key, url = %request.url, error = %e, "Source unavailable");
                SourceResult::Unavailable(e.to_string())
            }
        }
    }
}
