//! Pluggable backend trait for rate limit storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Result type for rate limit operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    /// The window stayed full for every re-check.
    #[error("Rate limit for key {key_hash} still exhausted after {checks} waits")]
    WaitExceeded { key_hash: String, checks: u32 },
}

impl From<diesel::result::Error> for RateLimitError {
    fn from(e: diesel::result::Error) -> Self {
        RateLimitError::Database(e.to_string())
    }
}

/// Storage for per-key request timestamps.
///
/// Keys are always SHA-256 hex digests; raw API keys never reach a backend.
/// Implementations must be safe to share between tasks.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Append one request record.
    async fn record_request(&self, key_hash: &str, at: DateTime<Utc>) -> RateLimitResult<()>;

    /// Number of records at or after `since`.
    async fn count_since(&self, key_hash: &str, since: DateTime<Utc>) -> RateLimitResult<u64>;

    /// Oldest record at or after `since`, if any.
    async fn oldest_since(
        &self,
        key_hash: &str,
        since: DateTime<Utc>,
    ) -> RateLimitResult<Option<DateTime<Utc>>>;

    /// Delete records older than `cutoff` for all keys. Returns the number removed.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> RateLimitResult<u64>;
}
