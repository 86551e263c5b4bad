//! Shared helpers for CLI commands.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use tornsync::api::TornClient;
use tornsync::config::Settings;
use tornsync::keys::mask_key;
use tornsync::rate_limit::{DieselRateLimitBackend, InMemoryRateLimitBackend, RateLimiter};
use tornsync::repository::DbContext;

use super::RateLimitBackendType;

/// Pick the backend from the flag, else from settings, else the database.
pub fn resolve_backend(
    settings: &Settings,
    flag: Option<RateLimitBackendType>,
) -> RateLimitBackendType {
    if let Some(backend) = flag {
        return backend;
    }
    match settings.rate_limit_backend.as_deref() {
        Some("memory") => RateLimitBackendType::Memory,
        #[cfg(feature = "redis-backend")]
        Some(url) if url.starts_with("redis://") || url.starts_with("rediss://") => {
            RateLimitBackendType::Redis
        }
        Some("database") | Some("sqlite") | None => RateLimitBackendType::Database,
        Some(other) => {
            warn!("Unknown rate limit backend '{}', using database", other);
            RateLimitBackendType::Database
        }
    }
}

/// Create a rate limiter with the selected backend.
pub async fn create_rate_limiter(
    settings: &Settings,
    ctx: &DbContext,
    flag: Option<RateLimitBackendType>,
) -> anyhow::Result<RateLimiter> {
    let config = settings.rate_limit.clone();
    let limiter = match resolve_backend(settings, flag) {
        RateLimitBackendType::Memory => {
            tracing::debug!("Using in-memory rate limit backend");
            RateLimiter::with_config(Arc::new(InMemoryRateLimitBackend::new()), config)
        }
        RateLimitBackendType::Database => {
            tracing::debug!("Using database rate limit backend");
            RateLimiter::with_config(
                Arc::new(DieselRateLimitBackend::new(ctx.pool().clone())),
                config,
            )
        }
        #[cfg(feature = "redis-backend")]
        RateLimitBackendType::Redis => {
            tracing::debug!("Using Redis rate limit backend");
            let redis_url = settings
                .rate_limit_backend
                .clone()
                .filter(|u| u.starts_with("redis"))
                .or_else(|| std::env::var("REDIS_URL").ok())
                .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());
            let backend = tornsync::rate_limit::RedisRateLimitBackend::new(
                &redis_url,
                settings.rate_limit.window,
            )
            .await?;
            RateLimiter::with_config(Arc::new(backend), config)
        }
    };
    Ok(limiter)
}

pub fn create_client(settings: &Settings, limiter: RateLimiter) -> anyhow::Result<TornClient> {
    let client = TornClient::builder(&settings.api_base_url, settings.request_timeout())
        .user_agent(&settings.user_agent)
        .rate_limiter(limiter)
        .invalid_key_codes(settings.invalid_key_codes.clone())
        .on_invalid_key(Arc::new(|key, code| {
            warn!(
                "API key {} was rejected by Torn (code {}); remove it from the pool",
                mask_key(key),
                code
            );
        }))
        .build()?;
    Ok(client)
}

pub fn format_time(dt: Option<DateTime<Utc>>) -> String {
    dt.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
