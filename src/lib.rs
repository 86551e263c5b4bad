//! tornsync - rate-limited Torn API access and a distributed job scheduler.
//!
//! The pieces, bottom up:
//! - [`rate_limit`]: sliding-window request counting per API key
//! - [`keys`]: key rotation and capacity-aware batch distribution
//! - [`api`]: the Torn HTTP client, gated by the rate limiter
//! - [`scheduler`]: database-backed job claiming, backoff and poll loops
//! - [`jobs`]: built-in job handlers

pub mod api;
pub mod config;
pub mod jobs;
pub mod keys;
pub mod migrations;
pub mod models;
pub mod rate_limit;
pub mod repository;
pub mod scheduler;
pub mod schema;
