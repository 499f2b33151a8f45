//! Retry logic with exponential backoff
//!
//! [`RetryPolicy`] wraps any zero-argument async operation. The delay after
//! the n-th failed attempt (zero based) is `base_delay * backoff_multiplier^n`,
//! capped at `max_delay`, optionally with jitter. After `max_retries` retries
//! the last error is returned to the caller; retries are never swallowed.
//!
//! # Example
//!
//! ```no_run
//! use datatask::retry::RetryPolicy;
//! use datatask::config::RetryConfig;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::from_config(&RetryConfig::default());
//! let value = policy
//!     .run(|| async {
//!         // Your operation here
//!         Ok::<_, String>(42)
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, 5xx, 429) should return `true`.
/// Permanent failures (4xx, malformed payloads, bad configuration) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Body decode failures are permanent, everything else on the wire is not
            Error::Network(e) => !e.is_decode() && !e.is_builder(),
            Error::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Config { .. } => false,
            Error::Serialization(_) => false,
            Error::InvalidAddress(_) => false,
            Error::Job(_) => false,
            Error::Other(_) => false,
        }
    }
}

/// Bounded exponential-backoff retry policy
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = `max_retries + 1`
    pub max_retries: u32,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Growth factor applied per attempt
    pub backoff_multiplier: f64,
    /// Cap for a single delay (None = uncapped)
    pub max_delay: Option<Duration>,
    /// Scale each delay by a random factor in `[1.0, 2.0]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Build a policy from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay,
            backoff_multiplier: config.backoff_multiplier,
            max_delay: Some(config.max_delay),
            jitter: config.jitter,
        }
    }

    /// Policy without any retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff delay after the given zero-based failed attempt, before jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Run `operation`, retrying every failure
    pub async fn run<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if(operation, |_| true).await
    }

    /// Run an operation whose error type knows whether it is transient
    pub async fn run_retryable<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: IsRetryable + Display,
    {
        self.run_if(operation, E::is_retryable).await
    }

    /// Run `operation`, retrying only failures for which `should_retry` holds
    pub async fn run_if<F, Fut, T, E, P>(&self, mut operation: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(e) if attempt < self.max_retries && should_retry(&e) => {
                    let delay = self.delay_for(attempt);
                    let delay = if self.jitter { add_jitter(delay) } else { delay };
                    attempt += 1;

                    tracing::warn!(
                        error = %e,
                        attempt = attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Operation failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if should_retry(&e) {
                        tracing::error!(
                            error = %e,
                            attempts = attempt + 1,
                            "Operation failed after all retry attempts exhausted"
                        );
                    } else {
                        tracing::error!(error = %e, "Operation failed with non-retryable error");
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
