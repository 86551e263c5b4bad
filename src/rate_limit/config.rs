//! Rate limiter configuration.

use std::time::Duration;

/// Torn allows 100 requests per minute per key; the default leaves headroom
/// for other tools sharing the key.
pub const DEFAULT_MAX_REQUESTS: u64 = 50;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Length of the sliding window.
    pub window: Duration,
    /// Requests allowed per key inside one window.
    pub max_requests: u64,
    /// Added to every computed wait so the oldest record has left the window.
    pub safety_buffer: Duration,
    /// Waits allowed before `wait_if_needed` gives up.
    pub max_wait_checks: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: DEFAULT_MAX_REQUESTS,
            safety_buffer: Duration::from_millis(100),
            max_wait_checks: 10,
        }
    }
}
