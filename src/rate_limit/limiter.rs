//! Sliding-window rate limiter keyed by API key.
//!
//! Wraps a `RateLimitBackend` and implements the gate every outgoing Torn
//! request passes through:
//! - `wait_if_needed` sleeps until the key has room in its window
//! - `record_request` logs a request after it succeeded
//! - `request_count` / `is_rate_limited` expose the current window

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::backend::{RateLimitBackend, RateLimitError, RateLimitResult};
use super::config::RateLimitConfig;

/// Type alias for a shared rate limit backend.
pub type BoxedRateLimitBackend = Arc<dyn RateLimitBackend>;

/// SHA-256 hex digest used as the storage key for an API key.
pub fn hash_key(api_key: &str) -> String {
    hex::encode(Sha256::digest(api_key.as_bytes()))
}

#[derive(Clone)]
pub struct RateLimiter {
    backend: BoxedRateLimitBackend,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(backend: BoxedRateLimitBackend) -> Self {
        Self::with_config(backend, RateLimitConfig::default())
    }

    pub fn with_config(backend: BoxedRateLimitBackend, config: RateLimitConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn max_requests(&self) -> u64 {
        self.config.max_requests
    }

    fn window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.window).unwrap_or(chrono::Duration::MAX)
    }

    /// Wait until a request with `api_key` fits in the window.
    ///
    /// Store errors let the request through. Returns
    /// [`RateLimitError::WaitExceeded`] when the window is still full after
    /// `max_wait_checks` waits.
    pub async fn wait_if_needed(&self, api_key: &str) -> RateLimitResult<()> {
        let key_hash = hash_key(api_key);
        let window = self.window();

        for waits in 0..=self.config.max_wait_checks {
            let now = Utc::now();
            let window_start = now - window;
            self.spawn_purge(window_start);

            let count = match self.backend.count_since(&key_hash, window_start).await {
                Ok(count) => count,
                Err(e) => {
                    warn!("Rate limit count failed, allowing request: {}", e);
                    return Ok(());
                }
            };

            if count < self.config.max_requests {
                return Ok(());
            }

            if waits == self.config.max_wait_checks {
                break;
            }

            let wait = match self.backend.oldest_since(&key_hash, window_start).await {
                Ok(Some(oldest)) => {
                    let remaining = (window - (now - oldest)).to_std().unwrap_or(Duration::ZERO);
                    remaining + self.config.safety_buffer
                }
                // Oldest record left the window between the two reads
                Ok(None) => self.config.safety_buffer,
                Err(e) => {
                    warn!("Rate limit lookup failed, allowing request: {}", e);
                    return Ok(());
                }
            };

            debug!(
                "Rate limit reached for key {} ({}/{}), waiting {:?}",
                &key_hash[..8],
                count,
                self.config.max_requests,
                wait
            );
            tokio::time::sleep(wait).await;
        }

        Err(RateLimitError::WaitExceeded {
            key_hash,
            checks: self.config.max_wait_checks,
        })
    }

    /// Record a completed request. Store errors are logged, never returned.
    pub async fn record_request(&self, api_key: &str) {
        let key_hash = hash_key(api_key);
        if let Err(e) = self.backend.record_request(&key_hash, Utc::now()).await {
            warn!("Failed to record request for key {}: {}", &key_hash[..8], e);
        }
    }

    /// Number of requests made with `api_key` inside the current window.
    pub async fn request_count(&self, api_key: &str) -> RateLimitResult<u64> {
        let since = Utc::now() - self.window();
        self.backend.count_since(&hash_key(api_key), since).await
    }

    /// Whether the key's window is full. Store errors read as not limited.
    pub async fn is_rate_limited(&self, api_key: &str) -> bool {
        match self.request_count(api_key).await {
            Ok(count) => count >= self.config.max_requests,
            Err(e) => {
                warn!("Rate limit count failed: {}", e);
                false
            }
        }
    }

    /// Delete records that have left the window. Returns the number removed.
    pub async fn purge_expired(&self) -> RateLimitResult<u64> {
        self.backend.purge_before(Utc::now() - self.window()).await
    }

    fn spawn_purge(&self, cutoff: chrono::DateTime<Utc>) {
        let backend = self.backend.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.purge_before(cutoff).await {
                debug!("Rate limit purge failed: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::InMemoryRateLimitBackend;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::time::Instant;

    fn limiter(window_ms: u64, max_requests: u64) -> RateLimiter {
        RateLimiter::with_config(
            Arc::new(InMemoryRateLimitBackend::new()),
            RateLimitConfig {
                window: Duration::from_millis(window_ms),
                max_requests,
                safety_buffer: Duration::from_millis(20),
                max_wait_checks: 10,
            },
        )
    }

    /// Backend whose every call fails.
    struct BrokenBackend;

    #[async_trait]
    impl RateLimitBackend for BrokenBackend {
        async fn record_request(&self, _: &str, _: DateTime<Utc>) -> RateLimitResult<()> {
            Err(RateLimitError::Unavailable("down".into()))
        }
        async fn count_since(&self, _: &str, _: DateTime<Utc>) -> RateLimitResult<u64> {
            Err(RateLimitError::Unavailable("down".into()))
        }
        async fn oldest_since(
            &self,
            _: &str,
            _: DateTime<Utc>,
        ) -> RateLimitResult<Option<DateTime<Utc>>> {
            Err(RateLimitError::Unavailable("down".into()))
        }
        async fn purge_before(&self, _: DateTime<Utc>) -> RateLimitResult<u64> {
            Err(RateLimitError::Unavailable("down".into()))
        }
    }

    #[test]
    fn test_hash_key_is_sha256_hex() {
        let hash = hash_key("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash_key("abc"), hash_key("abd"));
    }

    #[tokio::test]
    async fn test_count_and_limited() {
        let limiter = limiter(60_000, 3);
        assert!(!limiter.is_rate_limited("key-a").await);

        for _ in 0..3 {
            limiter.record_request("key-a").await;
        }
        assert_eq!(limiter.request_count("key-a").await.unwrap(), 3);
        assert!(limiter.is_rate_limited("key-a").await);

        // Other keys are independent
        assert_eq!(limiter.request_count("key-b").await.unwrap(), 0);
        assert!(!limiter.is_rate_limited("key-b").await);
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_under_limit() {
        let limiter = limiter(60_000, 3);
        limiter.record_request("key-a").await;

        let start = Instant::now();
        limiter.wait_if_needed("key-a").await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_wait_sleeps_until_oldest_leaves_window() {
        let limiter = limiter(300, 2);
        limiter.record_request("key-a").await;
        limiter.record_request("key-a").await;

        let start = Instant::now();
        limiter.wait_if_needed("key-a").await.unwrap();
        let waited = start.elapsed();

        // window - age(oldest) + buffer, and the key has room afterwards
        assert!(waited >= Duration::from_millis(250), "waited {:?}", waited);
        assert!(waited < Duration::from_secs(2), "waited {:?}", waited);
        assert!(!limiter.is_rate_limited("key-a").await);
    }

    #[tokio::test]
    async fn test_wait_exceeded_when_window_never_frees() {
        let backend = Arc::new(InMemoryRateLimitBackend::new());
        let limiter = RateLimiter::with_config(
            backend.clone(),
            RateLimitConfig {
                window: Duration::from_millis(200),
                max_requests: 1,
                safety_buffer: Duration::from_millis(10),
                max_wait_checks: 2,
            },
        );

        // Keep refilling the window faster than it drains
        let key_hash = hash_key("key-a");
        let filler = {
            let backend = backend.clone();
            tokio::spawn(async move {
                loop {
                    backend.record_request(&key_hash, Utc::now()).await.unwrap();
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        let result = limiter.wait_if_needed("key-a").await;
        filler.abort();

        match result {
            Err(RateLimitError::WaitExceeded { checks, key_hash }) => {
                assert_eq!(checks, 2);
                assert_eq!(key_hash, hash_key("key-a"));
            }
            other => panic!("expected WaitExceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_errors_fail_open() {
        let limiter = RateLimiter::new(Arc::new(BrokenBackend));

        limiter.wait_if_needed("key-a").await.unwrap();
        limiter.record_request("key-a").await;
        assert!(!limiter.is_rate_limited("key-a").await);
        assert!(limiter.request_count("key-a").await.is_err());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let limiter = limiter(50, 10);
        limiter.record_request("key-a").await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        // The spawned purge in wait_if_needed may already have run
        let _ = limiter.purge_expired().await.unwrap();
        assert_eq!(limiter.request_count("key-a").await.unwrap(), 0);
    }
}
