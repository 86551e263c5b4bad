//! API client errors and response envelopes.

use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimitError;

/// Transport-level failures. Torn application errors are not errors here;
/// they come back as [`ApiResponse::Error`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing path parameter '{0}'")]
    MissingPathParam(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to decode response: {0}")]
    Decode(String),
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        // The request URL carries the API key as a query parameter
        let e = e.without_url();
        if e.is_timeout() {
            ApiError::Timeout(e.to_string())
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

/// Body of Torn's `{"error": {"code": .., "error": ".."}}` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TornErrorPayload {
    pub code: i64,
    pub error: String,
}

/// A 2xx response: either the decoded payload or Torn's error envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse<T> {
    Success(T),
    Error(TornErrorPayload),
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success(_))
    }

    /// The payload, or `None` for an error envelope.
    pub fn ok(self) -> Option<T> {
        match self {
            ApiResponse::Success(value) => Some(value),
            ApiResponse::Error(_) => None,
        }
    }
}
