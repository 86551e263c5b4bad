use crate::repository::DieselError;

use super::job::JobError;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Database error: {0}")]
    Database(#[from] DieselError),

    #[error("Unknown job '{0}'")]
    UnknownJob(String),

    #[error("Job '{0}' is already registered")]
    DuplicateJob(String),

    #[error("Job '{name}' failed: {source}")]
    Job {
        name: String,
        #[source]
        source: JobError,
    },
}
