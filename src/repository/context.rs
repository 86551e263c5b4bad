//! Database context for managing connections and repository access.

use std::path::Path;

use super::job_log::DieselJobLogRepository;
use super::job_schedule::DieselJobScheduleRepository;
use super::pool::{DbPool, DieselError};

/// Holds the connection pool and hands out repositories.
///
/// # Example
/// ```ignore
/// let ctx = DbContext::from_url("sqlite:tornsync.db")?;
/// let jobs = ctx.job_schedules().get_all().await?;
/// ```
#[derive(Clone)]
pub struct DbContext {
    pool: DbPool,
}

impl DbContext {
    /// Create a context from a database URL.
    ///
    /// Supports:
    /// - SQLite: file paths or `sqlite:` URLs
    /// - PostgreSQL: `postgres://` or `postgresql://` URLs
    pub fn from_url(url: &str) -> Result<Self, DieselError> {
        Ok(Self {
            pool: DbPool::from_url(url)?,
        })
    }

    pub fn from_sqlite_path(path: &Path) -> Self {
        Self {
            pool: DbPool::sqlite_from_path(path),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn job_schedules(&self) -> DieselJobScheduleRepository {
        DieselJobScheduleRepository::new(self.pool.clone())
    }

    pub fn job_logs(&self) -> DieselJobLogRepository {
        DieselJobLogRepository::new(self.pool.clone())
    }
}
