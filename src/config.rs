//! Engine configuration and validation limits.

use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Triagedesk";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed timer period for the scheduled list refresh.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;

/// Minimum spacing between non-forced refreshes. Distinct from (and shorter
/// than) the timer period so a failed fetch retries on the very next tick.
pub const DEFAULT_DEBOUNCE_SECS: u64 = 10;

/// Remote fetch attempts before a call is surfaced as failed.
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// Response text cap, checked before any network call.
pub const MAX_RESPONSE_TEXT_LEN: usize = 10_000;

/// Flag reason cap, checked before any network call.
pub const MAX_FLAG_REASON_LEN: usize = 500;

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> &'static str {
    "info,triagedesk=debug"
}

/// Tunables injected into the engine at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub refresh_interval: Duration,
    pub debounce_interval: Duration,
    pub fetch_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            debounce_interval: Duration::from_secs(DEFAULT_DEBOUNCE_SECS),
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
        }
    }
}
