//! Sliding-window rate limiting for outbound requests
//!
//! The RateLimiter bounds how many calls may start within any trailing
//! window (one minute by default). One instance is shared by every job of a
//! run, so the window is kept behind an async mutex.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default window length
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Process-wide outbound request limiter
///
/// # Algorithm
///
/// - The timestamps of admitted calls are kept in order
/// - Before each admission, timestamps older than the window are dropped
/// - If the remaining count is at the limit, the caller sleeps until the
///   oldest timestamp leaves the window, then its own timestamp is recorded
///
/// The lock is held across that sleep, so waiting callers are admitted one
/// at a time in arrival order and the window can never be overfilled.
#[derive(Debug)]
pub struct RateLimiter {
    /// Calls allowed per window (0 = unlimited)
    calls_per_window: u32,
    /// Window length
    window: Duration,
    /// Admitted-call timestamps, oldest first
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting `calls_per_minute` calls per trailing minute
    ///
    /// # Examples
    ///
    /// ```
    /// use datatask::rate_limiter::RateLimiter;
    ///
    /// // 60 calls per minute
    /// let limiter = RateLimiter::new(60);
    ///
    /// // Unlimited
    /// let unlimited = RateLimiter::new(0);
    /// ```
    #[must_use]
    pub fn new(calls_per_minute: u32) -> Self {
        Self::with_window(calls_per_minute, DEFAULT_WINDOW)
    }

    /// Create a limiter with a custom window length
    #[must_use]
    pub fn with_window(calls_per_window: u32, window: Duration) -> Self {
        Self {
            calls_per_window,
            window,
            calls: Mutex::new(VecDeque::with_capacity(calls_per_window as usize)),
        }
    }

    /// Configured limit, None if unlimited
    pub fn limit(&self) -> Option<u32> {
        if self.calls_per_window == 0 {
            None
        } else {
            Some(self.calls_per_window)
        }
    }

    /// Wait until one more call fits in the window, then record it
    ///
    /// Returns immediately for an unlimited limiter.
    pub async fn admit(&self) {
        if self.calls_per_window == 0 {
            return;
        }

        let mut calls = self.calls.lock().await;
        let now = Instant::now();
        self.evict(&mut calls, now);

        if calls.len() >= self.calls_per_window as usize
            && let Some(&oldest) = calls.front()
        {
            let ready_at = oldest + self.window;
            let wait = ready_at.saturating_duration_since(now);
            tracing::info!(
                wait_ms = wait.as_millis() as u64,
                limit = self.calls_per_window,
                "Rate limit reached, waiting"
            );
            tokio::time::sleep_until(ready_at).await;
            self.evict(&mut calls, Instant::now());
        }

        calls.push_back(Instant::now());
    }

    /// Number of calls currently inside the window
    pub async fn in_window(&self) -> usize {
        let mut calls = self.calls.lock().await;
        self.evict(&mut calls, Instant::now());
        calls.len()
    }

    fn evict(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = calls.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(60)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_limit_without_waiting() {
        let limiter = RateLimiter::new(5);
        let start = Instant::now();

        for _ in 0..5 {
            limiter.admit().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_window().await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn call_over_limit_waits_for_oldest_to_expire() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();

        limiter.admit().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.admit().await;

        // Third call must wait until the first one (t=0) leaves the window (t=60)
        limiter.admit().await;
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        assert_eq!(limiter.in_window().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_never_waits_or_records() {
        let limiter = RateLimiter::new(0);
        assert_eq!(limiter.limit(), None);

        for _ in 0..1000 {
            limiter.admit().await;
        }
        assert_eq!(limiter.in_window().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_never_exceed_limit_in_any_window() {
        let window = Duration::from_secs(60);
        let limit = 3u32;
        let limiter = Arc::new(RateLimiter::with_window(limit, window));
        let admitted = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = limiter.clone();
            let admitted = admitted.clone();
            handles.push(tokio::spawn(async move {
                limiter.admit().await;
                admitted.lock().await.push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut times = admitted.lock().await.clone();
        times.sort();
        assert_eq!(times.len(), 10);

        for (i, &t) in times.iter().enumerate() {
            let in_window = times[i..]
                .iter()
                .take_while(|&&later| later.duration_since(t) < window)
                .count();
            assert!(
                in_window <= limit as usize,
                "{in_window} calls admitted within one window starting at call {i}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn custom_window_expires_entries() {
        let limiter = RateLimiter::with_window(1, Duration::from_millis(100));
        limiter.admit().await;
        assert_eq!(limiter.in_window().await, 1);

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(limiter.in_window().await, 0);
    }
}
