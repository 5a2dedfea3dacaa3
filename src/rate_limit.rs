//! Per-client rate limiting for unlock requests
//!
//! Two independent trackers share the same window duration:
//! - [`RateLimiter`] counts start requests per client address and rejects
//!   once the quota for the current window is spent.
//! - [`FailureTracker`] counts consecutive incorrect-password outcomes per
//!   client address and blocks further attempts past a cap, regardless of
//!   the general quota.
//!
//! Both maps are swept lazily: every operation first evicts entries whose
//! window started longer than one window duration ago. Neither tracker
//! performs any external I/O.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

/// Request count within one fixed window
struct RequestWindow {
    /// When this window opened
    window_start: Instant,
    /// Requests consumed in this window
    count: u32,
}

/// Sliding-window request limiter keyed by client address
pub struct RateLimiter {
    windows: Mutex<HashMap<String, RequestWindow>>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    /// Create a limiter admitting `max_requests` per `window` per client
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window,
            max_requests,
        }
    }

    /// Consume one rate-limit unit for `client`.
    ///
    /// Returns `false` without consuming when the client has already spent
    /// its quota for the current window.
    pub async fn check_and_consume(&self, client: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        windows.retain(|_, w| now.duration_since(w.window_start) <= self.window);

        match windows.get_mut(client) {
            None => {
                windows.insert(
                    client.to_string(),
                    RequestWindow {
                        window_start: now,
                        count: 1,
                    },
                );
                true
            }
            Some(entry) if entry.count >= self.max_requests => false,
            Some(entry) => {
                entry.count += 1;
                true
            }
        }
    }
}

/// Consecutive-failure count within one window
struct FailureWindow {
    /// When the first failure of this run was recorded
    first_at: Instant,
    /// Failures recorded since then
    count: u32,
}

/// Tracks consecutive incorrect-password outcomes per client address
pub struct FailureTracker {
    failures: Mutex<HashMap<String, FailureWindow>>,
    window: Duration,
    max_failures: u32,
}

impl FailureTracker {
    /// Create a tracker capping runs at `max_failures` within `window`
    pub fn new(window: Duration, max_failures: u32) -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            window,
            max_failures,
        }
    }

    /// Record one incorrect-password outcome for `client`
    pub async fn record_failure(&self, client: &str) {
        let now = Instant::now();
        let mut failures = self.failures.lock().await;
        failures.retain(|_, f| now.duration_since(f.first_at) <= self.window);

        match failures.get_mut(client) {
            Some(entry) => entry.count += 1,
            None => {
                failures.insert(
                    client.to_string(),
                    FailureWindow {
                        first_at: now,
                        count: 1,
                    },
                );
            }
        }
    }

    /// Forget the client's failure run; called on any successful unlock
    pub async fn clear(&self, client: &str) {
        self.failures.lock().await.remove(client);
    }

    /// True once the client has hit the failure cap inside the window
    pub async fn has_exceeded(&self, client: &str) -> bool {
        let now = Instant::now();
        let mut failures = self.failures.lock().await;
        failures.retain(|_, f| now.duration_since(f.first_at) <= self.window);

        failures
            .get(client)
            .map(|f| f.count >= self.max_failures)
            .unwrap_or(false)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn quota_admits_exactly_max_requests_per_window() {
        let limiter = RateLimiter::new(Duration::from_secs(900), 30);

        for i in 1..=30 {
            assert!(
                limiter.check_and_consume("203.0.113.7").await,
                "request {i} should pass the rate check"
            );
        }
        assert!(
            !limiter.check_and_consume("203.0.113.7").await,
            "request 31 must be rejected"
        );
    }

    #[tokio::test]
    async fn quota_is_per_client() {
        let limiter = RateLimiter::new(Duration::from_secs(900), 2);

        assert!(limiter.check_and_consume("a").await);
        assert!(limiter.check_and_consume("a").await);
        assert!(!limiter.check_and_consume("a").await);
        // a different client is unaffected
        assert!(limiter.check_and_consume("b").await);
    }

    #[tokio::test]
    async fn expired_window_resets_the_count() {
        let limiter = RateLimiter::new(Duration::from_millis(30), 1);

        assert!(limiter.check_and_consume("a").await);
        assert!(!limiter.check_and_consume("a").await);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            limiter.check_and_consume("a").await,
            "a fresh window should admit the client again"
        );
    }

    #[tokio::test]
    async fn failure_cap_blocks_after_max_failures() {
        let tracker = FailureTracker::new(Duration::from_secs(900), 10);

        for _ in 0..9 {
            tracker.record_failure("a").await;
        }
        assert!(!tracker.has_exceeded("a").await);

        tracker.record_failure("a").await;
        assert!(tracker.has_exceeded("a").await);
    }

    #[tokio::test]
    async fn clear_resets_the_failure_run() {
        let tracker = FailureTracker::new(Duration::from_secs(900), 2);

        tracker.record_failure("a").await;
        tracker.record_failure("a").await;
        assert!(tracker.has_exceeded("a").await);

        tracker.clear("a").await;
        assert!(!tracker.has_exceeded("a").await);
    }

    #[tokio::test]
    async fn failures_expire_with_the_window() {
        let tracker = FailureTracker::new(Duration::from_millis(30), 1);

        tracker.record_failure("a").await;
        assert!(tracker.has_exceeded("a").await);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!tracker.has_exceeded("a").await);
    }
}
