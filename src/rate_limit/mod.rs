//! Sliding-window rate limiting for Torn API keys.
//!
//! Every request made with a key is recorded against the key's hash; a
//! caller waits while the number of records inside the trailing window is
//! at the configured maximum. Backends:
//! - In-memory (single process, ephemeral)
//! - SQLite/PostgreSQL (shared between worker processes)
//! - Redis (distributed, behind the `redis-backend` feature)

mod backend;
mod config;
mod database;
mod limiter;
mod memory;

#[cfg(feature = "redis-backend")]
mod redis;

pub use backend::{RateLimitBackend, RateLimitError, RateLimitResult};
pub use config::RateLimitConfig;
pub use database::DieselRateLimitBackend;
pub use limiter::{hash_key, BoxedRateLimitBackend, RateLimiter};
pub use memory::InMemoryRateLimitBackend;

#[cfg(feature = "redis-backend")]
pub use redis::RedisRateLimitBackend;

/// Exponential backoff delay for a zero-based retry attempt.
pub fn backoff_delay(attempt: u32, base: std::time::Duration) -> std::time::Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_backoff_delay_doubles() {
        let base = Duration::from_millis(1000);
        assert_eq!(backoff_delay(0, base), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1, base), Duration::from_millis(2000));
        assert_eq!(backoff_delay(3, base), Duration::from_millis(8000));
        // Saturates instead of overflowing
        assert_eq!(
            backoff_delay(64, base),
            Duration::from_secs(u64::from(u32::MAX))
        );
    }
}
