//! The contract between the scheduler and the work it runs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::ApiError;
use crate::keys::{BatchError, KeyPoolError};
use crate::rate_limit::RateLimitError;
use crate::repository::DieselError;

/// How a successful handler run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Work was done; logged with its duration.
    Completed,
    /// Nothing to do this time; rescheduled without a log entry.
    Skipped,
}

/// A handler failure. Any error puts the job into backoff.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error(transparent)]
    KeyPool(#[from] KeyPoolError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("Database error: {0}")]
    Database(#[from] DieselError),

    #[error("{0}")]
    Failed(String),
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        JobError::Failed(message.into())
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self) -> Result<JobOutcome, JobError>;
}

pub type BoxedJobHandler = Arc<dyn JobHandler>;

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<JobOutcome, JobError>> + Send,
{
    async fn run(&self) -> Result<JobOutcome, JobError> {
        (self.0)().await
    }
}

/// Wrap an async closure as a job handler.
pub fn handler_fn<F, Fut>(f: F) -> BoxedJobHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<JobOutcome, JobError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A job as registered with the scheduler.
#[derive(Clone)]
pub struct JobDefinition {
    pub name: String,
    /// Cadence for a newly created row. Existing rows keep theirs.
    pub cadence: Duration,
    /// How long a local run may hold the sync guard before it is force-unlocked.
    pub sync_timeout: Duration,
    pub handler: BoxedJobHandler,
}

impl JobDefinition {
    pub fn new(name: impl Into<String>, cadence: Duration, handler: BoxedJobHandler) -> Self {
        Self {
            name: name.into(),
            cadence,
            sync_timeout: Duration::from_secs(300),
            handler,
        }
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for JobDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDefinition")
            .field("name", &self.name)
            .field("cadence", &self.cadence)
            .field("sync_timeout", &self.sync_timeout)
            .finish_non_exhaustive()
    }
}
