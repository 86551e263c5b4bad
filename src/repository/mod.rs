//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM with compile-time query checking.
//! Supports both SQLite and PostgreSQL backends.

pub mod context;
pub mod job_log;
pub mod job_schedule;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod util;

pub use context::DbContext;
pub use job_log::DieselJobLogRepository;
pub use job_schedule::DieselJobScheduleRepository;
pub use migrations::run_migrations;
pub use pool::{DbPool, DieselError};
