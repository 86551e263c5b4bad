//! Torn API client.

mod client;
mod error;

pub use client::{
    InvalidKeyCallback, RequestOptions, TornClient, TornClientBuilder, DEFAULT_BASE_URL,
    DEFAULT_INVALID_KEY_CODES,
};
pub use error::{ApiError, ApiResponse, TornErrorPayload};
