//! Application state for the API server

use crate::config::Config;
use crate::jobs::JobStore;
use crate::rate_limit::{FailureTracker, RateLimiter};
use crate::runner::UnlockRunner;
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clones); owns the job store and both
/// rate-limiting trackers.
#[derive(Clone)]
pub struct AppState {
    /// All live unlock jobs
    pub store: Arc<JobStore>,
    /// Per-client request quota
    pub limiter: Arc<RateLimiter>,
    /// Per-client consecutive incorrect-password tally
    pub failures: Arc<FailureTracker>,
    /// Service configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Build the state graph from configuration and a process runner.
    ///
    /// The failure tracker is shared between the store (which records and
    /// clears failures as jobs settle) and the start handler (which rejects
    /// clients past the cap).
    pub fn new(config: Arc<Config>, runner: Arc<dyn UnlockRunner>) -> Self {
        let failures = Arc::new(FailureTracker::new(
            config.unlock.rate_window,
            config.unlock.max_password_failures,
        ));
        let limiter = Arc::new(RateLimiter::new(
            config.unlock.rate_window,
            config.unlock.max_requests_per_window,
        ));
        let store = Arc::new(JobStore::new(
            runner,
            failures.clone(),
            config.unlock.rate_window,
        ));
        Self {
            store,
            limiter,
            failures,
            config,
        }
    }
}
