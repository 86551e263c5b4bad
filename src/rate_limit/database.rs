//! Diesel-backed rate limit storage for multi-process coordination.
//!
//! Every worker process sharing the database sees the same request log,
//! so a key's window is enforced across the whole deployment.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::backend::{RateLimitBackend, RateLimitResult};
use crate::repository::models::NewRateLimitRequest;
use crate::repository::pool::DbPool;
use crate::repository::util::{format_timestamp, parse_datetime};
use crate::schema::rate_limit_requests;
use crate::with_conn;

/// Diesel-backed rate limit storage (SQLite/PostgreSQL).
#[derive(Clone)]
pub struct DieselRateLimitBackend {
    pool: DbPool,
}

impl DieselRateLimitBackend {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn from_sqlite_path(path: &std::path::Path) -> Self {
        Self {
            pool: DbPool::sqlite_from_path(path),
        }
    }
}

#[async_trait]
impl RateLimitBackend for DieselRateLimitBackend {
    async fn record_request(&self, key_hash: &str, at: DateTime<Utc>) -> RateLimitResult<()> {
        let requested_at = format_timestamp(at);
        with_conn!(self.pool, conn => {
            diesel::insert_into(rate_limit_requests::table)
                .values(NewRateLimitRequest {
                    key_hash,
                    requested_at: &requested_at,
                })
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    async fn count_since(&self, key_hash: &str, since: DateTime<Utc>) -> RateLimitResult<u64> {
        let since = format_timestamp(since);
        with_conn!(self.pool, conn => {
            let count: i64 = rate_limit_requests::table
                .filter(rate_limit_requests::key_hash.eq(key_hash))
                .filter(rate_limit_requests::requested_at.ge(&since))
                .count()
                .get_result(&mut conn)
                .await?;
            Ok(count.max(0) as u64)
        })
    }

    async fn oldest_since(
        &self,
        key_hash: &str,
        since: DateTime<Utc>,
    ) -> RateLimitResult<Option<DateTime<Utc>>> {
        let since = format_timestamp(since);
        with_conn!(self.pool, conn => {
            let oldest: Option<String> = rate_limit_requests::table
                .filter(rate_limit_requests::key_hash.eq(key_hash))
                .filter(rate_limit_requests::requested_at.ge(&since))
                .order(rate_limit_requests::requested_at.asc())
                .select(rate_limit_requests::requested_at)
                .first(&mut conn)
                .await
                .optional()?;
            Ok(oldest.as_deref().map(parse_datetime))
        })
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> RateLimitResult<u64> {
        let cutoff = format_timestamp(cutoff);
        with_conn!(self.pool, conn => {
            let rows = diesel::delete(
                rate_limit_requests::table.filter(rate_limit_requests::requested_at.lt(&cutoff)),
            )
            .execute(&mut conn)
            .await?;
            Ok(rows as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::migrations;
    use chrono::Duration;
    use tempfile::tempdir;

    async fn setup_backend() -> (DieselRateLimitBackend, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        migrations::run_migrations(&format!("sqlite:{}", db_path.display()))
            .await
            .unwrap();
        (DieselRateLimitBackend::from_sqlite_path(&db_path), dir)
    }

    #[tokio::test]
    async fn test_window_counting() {
        let (backend, _dir) = setup_backend().await;
        let now = Utc::now();
        backend
            .record_request("abc", now - Duration::seconds(75))
            .await
            .unwrap();
        backend
            .record_request("abc", now - Duration::seconds(20))
            .await
            .unwrap();
        backend.record_request("abc", now).await.unwrap();
        backend.record_request("def", now).await.unwrap();

        let since = now - Duration::seconds(60);
        assert_eq!(backend.count_since("abc", since).await.unwrap(), 2);
        assert_eq!(backend.count_since("def", since).await.unwrap(), 1);

        let oldest = backend.oldest_since("abc", since).await.unwrap().unwrap();
        assert_eq!(
            oldest.timestamp_millis(),
            (now - Duration::seconds(20)).timestamp_millis()
        );
        assert!(backend.oldest_since("zzz", since).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_before() {
        let (backend, _dir) = setup_backend().await;
        let now = Utc::now();
        backend
            .record_request("abc", now - Duration::seconds(120))
            .await
            .unwrap();
        backend.record_request("abc", now).await.unwrap();

        let removed = backend
            .purge_before(now - Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            backend
                .count_since("abc", now - Duration::days(1))
                .await
                .unwrap(),
            1
        );
    }
}
