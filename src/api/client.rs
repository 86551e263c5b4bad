//! HTTP client for the Torn API.
//!
//! Every request passes through the shared [`RateLimiter`] before it is
//! sent and is recorded against its key once it succeeds. The key travels
//! as the `key` query parameter and is never logged.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use super::error::{ApiError, ApiResponse, TornErrorPayload};
use crate::rate_limit::{InMemoryRateLimitBackend, RateLimiter};

pub const DEFAULT_BASE_URL: &str = "https://api.torn.com";

/// Torn error codes meaning the key itself is unusable
/// (incorrect key, inactive, access level, paused owner).
pub const DEFAULT_INVALID_KEY_CODES: &[i64] = &[2, 10, 13, 18];

/// Invoked with `(api_key, error_code)` when Torn rejects a key.
pub type InvalidKeyCallback = Arc<dyn Fn(&str, i64) + Send + Sync>;

/// Per-request parameters.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub api_key: String,
    /// Values for `{name}` placeholders in the path.
    pub path_params: Vec<(String, String)>,
    pub query_params: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.path_params.push((name.into(), value.to_string()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query_params.push((name.into(), value.to_string()));
        self
    }
}

/// Builder for [`TornClient`].
pub struct TornClientBuilder {
    base_url: String,
    timeout: Duration,
    user_agent: Option<String>,
    rate_limiter: Option<RateLimiter>,
    invalid_key_codes: Option<Vec<i64>>,
    on_invalid_key: Option<InvalidKeyCallback>,
}

impl TornClientBuilder {
    pub fn user_agent(mut self, ua: &str) -> Self {
        self.user_agent = Some(ua.to_string());
        self
    }

    /// Set a shared rate limiter.
    /// Without this, the client gets its own in-memory limiter.
    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn invalid_key_codes(mut self, codes: Vec<i64>) -> Self {
        self.invalid_key_codes = Some(codes);
        self
    }

    pub fn on_invalid_key(mut self, callback: InvalidKeyCallback) -> Self {
        self.on_invalid_key = Some(callback);
        self
    }

    pub fn build(self) -> Result<TornClient, ApiError> {
        let base_url = Url::parse(&self.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("tornsync/{}", env!("CARGO_PKG_VERSION")));

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(self.timeout)
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;

        let rate_limiter = self
            .rate_limiter
            .unwrap_or_else(|| RateLimiter::new(Arc::new(InMemoryRateLimitBackend::new())));

        let invalid_key_codes = self
            .invalid_key_codes
            .unwrap_or_else(|| DEFAULT_INVALID_KEY_CODES.to_vec())
            .into_iter()
            .collect();

        Ok(TornClient {
            client,
            base_url,
            rate_limiter,
            invalid_key_codes: Arc::new(invalid_key_codes),
            on_invalid_key: self.on_invalid_key,
        })
    }
}

#[derive(Clone)]
pub struct TornClient {
    client: Client,
    base_url: Url,
    rate_limiter: RateLimiter,
    invalid_key_codes: Arc<HashSet<i64>>,
    on_invalid_key: Option<InvalidKeyCallback>,
}

impl TornClient {
    pub fn builder(base_url: &str, timeout: Duration) -> TornClientBuilder {
        TornClientBuilder {
            base_url: base_url.to_string(),
            timeout,
            user_agent: None,
            rate_limiter: None,
            invalid_key_codes: None,
            on_invalid_key: None,
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Resolve `path` against the base URL with placeholders, query
    /// parameters and the key filled in.
    pub fn build_url(&self, path: &str, options: &RequestOptions) -> Result<Url, ApiError> {
        let path = substitute_path(path, &options.path_params)?;
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut url = Url::parse(&joined).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;

        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &options.query_params {
                pairs.append_pair(name, value);
            }
            pairs.append_pair("key", &options.api_key);
        }

        Ok(url)
    }

    /// GET `path` and decode the body as `T`.
    ///
    /// Network failures, timeouts and non-2xx statuses are `Err`. A 2xx body
    /// carrying Torn's error envelope is `Ok(ApiResponse::Error)`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<ApiResponse<T>, ApiError> {
        let url = self.build_url(path, options)?;

        self.rate_limiter.wait_if_needed(&options.api_key).await?;

        debug!("GET {}", path);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response.json().await?;

        if let Some(payload) = error_envelope(&body) {
            warn!("Torn API error {} on {}: {}", payload.code, path, payload.error);
            if self.invalid_key_codes.contains(&payload.code) {
                if let Some(callback) = &self.on_invalid_key {
                    callback(&options.api_key, payload.code);
                }
            }
            return Ok(ApiResponse::Error(payload));
        }

        let value = serde_json::from_value(body).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.rate_limiter.record_request(&options.api_key).await;
        Ok(ApiResponse::Success(value))
    }
}

/// Extract Torn's error envelope, if the body is one.
fn error_envelope(body: &serde_json::Value) -> Option<TornErrorPayload> {
    let error = body.get("error")?;
    if !error.is_object() {
        return None;
    }
    serde_json::from_value(error.clone()).ok()
}

/// Replace `{name}` placeholders with URL-encoded values.
fn substitute_path(template: &str, params: &[(String, String)]) -> Result<String, ApiError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + len];
        let value = params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| ApiError::MissingPathParam(name.to_string()))?;

        out.push_str(&rest[..start]);
        out.push_str(&urlencoding::encode(value));
        rest = &rest[start + len + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
