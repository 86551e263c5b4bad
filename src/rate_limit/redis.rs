//! Redis-backed rate limit storage for distributed coordination.
//!
//! Each key hash owns a sorted set of request timestamps (score = epoch
//! milliseconds). Entries older than the retention period are trimmed on
//! every write and the whole set expires once a key goes quiet.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::backend::{RateLimitBackend, RateLimitError, RateLimitResult};

/// Key prefix for rate limit data in Redis.
const KEY_PREFIX: &str = "tornsync:ratelimit:";

/// Keys requested per SCAN round trip during a purge.
const SCAN_BATCH: usize = 100;

fn redis_error(e: redis::RedisError) -> RateLimitError {
    RateLimitError::Database(e.to_string())
}

/// Redis-backed rate limit storage.
#[derive(Clone)]
pub struct RedisRateLimitBackend {
    conn: ConnectionManager,
    retention: Duration,
}

impl RedisRateLimitBackend {
    /// Connect to Redis.
    ///
    /// `retention` should be at least the rate limit window.
    pub async fn new(redis_url: &str, retention: Duration) -> RateLimitResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| RateLimitError::Unavailable(format!("Redis connection error: {}", e)))?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            RateLimitError::Unavailable(format!("Redis connection manager error: {}", e))
        })?;

        Ok(Self { conn, retention })
    }

    fn requests_key(&self, key_hash: &str) -> String {
        format!("{}{}", KEY_PREFIX, key_hash)
    }
}

#[async_trait]
impl RateLimitBackend for RedisRateLimitBackend {
    async fn record_request(&self, key_hash: &str, at: DateTime<Utc>) -> RateLimitResult<()> {
        let mut conn = self.conn.clone();
        let key = self.requests_key(key_hash);
        let at_ms = at.timestamp_millis();
        let retention_ms = self.retention.as_millis() as i64;
        // Unique member so two requests in the same millisecond both count
        let member = format!("{}:{}", at_ms, uuid::Uuid::new_v4());

        redis::pipe()
            .zadd(&key, member, at_ms as f64)
            .ignore()
            .zrembyscore(&key, "-inf", (at_ms - retention_ms) as f64)
            .ignore()
            .pexpire(&key, retention_ms)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_error)
    }

    async fn count_since(&self, key_hash: &str, since: DateTime<Utc>) -> RateLimitResult<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = conn
            .zcount(
                self.requests_key(key_hash),
                since.timestamp_millis() as f64,
                "+inf",
            )
            .await
            .map_err(redis_error)?;
        Ok(count)
    }

    async fn oldest_since(
        &self,
        key_hash: &str,
        since: DateTime<Utc>,
    ) -> RateLimitResult<Option<DateTime<Utc>>> {
        let mut conn = self.conn.clone();
        let entries: Vec<(String, f64)> = conn
            .zrangebyscore_limit_withscores(
                self.requests_key(key_hash),
                since.timestamp_millis() as f64,
                "+inf",
                0,
                1,
            )
            .await
            .map_err(redis_error)?;

        Ok(entries
            .first()
            .and_then(|(_, score)| Utc.timestamp_millis_opt(*score as i64).single()))
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> RateLimitResult<u64> {
        // Sets are trimmed on write and expire on their own; this only
        // catches keys that went quiet before their TTL ran out. SCAN walks
        // the keyspace in batches so the server is never blocked.
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", KEY_PREFIX);
        let max_score = format!("({}", cutoff.timestamp_millis());

        let mut cursor: u64 = 0;
        let mut total_removed = 0u64;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(redis_error)?;

            for key in keys {
                let removed: i64 = conn
                    .zrembyscore(&key, "-inf", &max_score)
                    .await
                    .map_err(redis_error)?;
                total_removed += removed.max(0) as u64;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(total_removed)
    }
}
