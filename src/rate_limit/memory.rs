//! In-memory rate limit backend for single-process operation.
//!
//! State is not persisted across restarts.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::backend::{RateLimitBackend, RateLimitResult};

/// Request timestamps per key hash, oldest first.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitBackend {
    requests: RwLock<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl InMemoryRateLimitBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimitBackend {
    async fn record_request(&self, key_hash: &str, at: DateTime<Utc>) -> RateLimitResult<()> {
        let mut requests = self.requests.write().await;
        let entries = requests.entry(key_hash.to_string()).or_default();
        // Keep sorted even if callers record slightly out of order
        let pos = entries.partition_point(|t| *t <= at);
        entries.insert(pos, at);
        Ok(())
    }

    async fn count_since(&self, key_hash: &str, since: DateTime<Utc>) -> RateLimitResult<u64> {
        let requests = self.requests.read().await;
        Ok(requests
            .get(key_hash)
            .map_or(0, |entries| entries.iter().filter(|t| **t >= since).count() as u64))
    }

    async fn oldest_since(
        &self,
        key_hash: &str,
        since: DateTime<Utc>,
    ) -> RateLimitResult<Option<DateTime<Utc>>> {
        let requests = self.requests.read().await;
        Ok(requests
            .get(key_hash)
            .and_then(|entries| entries.iter().find(|t| **t >= since).copied()))
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> RateLimitResult<u64> {
        let mut requests = self.requests.write().await;
        let mut removed = 0u64;
        for entries in requests.values_mut() {
            while entries.front().is_some_and(|t| *t < cutoff) {
                entries.pop_front();
                removed += 1;
            }
        }
        requests.retain(|_, entries| !entries.is_empty());
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_count_and_oldest_within_window() {
        let backend = InMemoryRateLimitBackend::new();
        let now = Utc::now();
        backend
            .record_request("abc", now - Duration::seconds(90))
            .await
            .unwrap();
        backend
            .record_request("abc", now - Duration::seconds(30))
            .await
            .unwrap();
        backend.record_request("abc", now).await.unwrap();
        backend.record_request("other", now).await.unwrap();

        let since = now - Duration::seconds(60);
        assert_eq!(backend.count_since("abc", since).await.unwrap(), 2);
        assert_eq!(
            backend.oldest_since("abc", since).await.unwrap(),
            Some(now - Duration::seconds(30))
        );
        assert_eq!(backend.count_since("missing", since).await.unwrap(), 0);
        assert_eq!(backend.oldest_since("missing", since).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_before() {
        let backend = InMemoryRateLimitBackend::new();
        let now = Utc::now();
        backend
            .record_request("abc", now - Duration::seconds(120))
            .await
            .unwrap();
        backend
            .record_request("def", now - Duration::seconds(90))
            .await
            .unwrap();
        backend.record_request("abc", now).await.unwrap();

        let removed = backend
            .purge_before(now - Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            backend.count_since("abc", now - Duration::days(1)).await.unwrap(),
            1
        );
        assert_eq!(
            backend.count_since("def", now - Duration::days(1)).await.unwrap(),
            0
        );
    }
}
