//! Persistence seam between the scheduler and the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{JobLogOutcome, JobSchedule};
use crate::repository::{
    DbContext, DieselError, DieselJobLogRepository, DieselJobScheduleRepository,
};

/// Schedule rows and run logs, as the scheduler needs them.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert-if-absent. Returns true if the row was created.
    async fn ensure(
        &self,
        job_name: &str,
        cadence_seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, DieselError>;

    async fn get(&self, job_name: &str) -> Result<Option<JobSchedule>, DieselError>;

    /// Conditional claim. True only for the caller whose update hit the row.
    async fn try_claim(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
        stale_before: Option<DateTime<Utc>>,
    ) -> Result<bool, DieselError>;

    async fn mark_completed(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), DieselError>;

    async fn mark_failed(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
        attempts: i32,
        backoff_until: DateTime<Utc>,
        error: &str,
    ) -> Result<(), DieselError>;

    async fn log_run(
        &self,
        job_name: &str,
        outcome: JobLogOutcome,
        duration_ms: Option<i64>,
        message: Option<&str>,
    ) -> Result<(), DieselError>;
}

/// [`JobStore`] over the `job_schedules` and `job_logs` tables.
#[derive(Clone)]
pub struct DieselJobStore {
    schedules: DieselJobScheduleRepository,
    logs: DieselJobLogRepository,
}

impl DieselJobStore {
    pub fn new(ctx: &DbContext) -> Self {
        Self {
            schedules: ctx.job_schedules(),
            logs: ctx.job_logs(),
        }
    }
}

#[async_trait]
impl JobStore for DieselJobStore {
    async fn ensure(
        &self,
        job_name: &str,
        cadence_seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, DieselError> {
        self.schedules.ensure(job_name, cadence_seconds, now).await
    }

    async fn get(&self, job_name: &str) -> Result<Option<JobSchedule>, DieselError> {
        self.schedules.get(job_name).await
    }

    async fn try_claim(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
        stale_before: Option<DateTime<Utc>>,
    ) -> Result<bool, DieselError> {
        self.schedules.try_claim(job_name, now, stale_before).await
    }

    async fn mark_completed(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), DieselError> {
        self.schedules.mark_completed(job_name, now, next_run_at).await
    }

    async fn mark_failed(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
        attempts: i32,
        backoff_until: DateTime<Utc>,
        error: &str,
    ) -> Result<(), DieselError> {
        self.schedules
            .mark_failed(job_name, now, attempts, backoff_until, error)
            .await
    }

    async fn log_run(
        &self,
        job_name: &str,
        outcome: JobLogOutcome,
        duration_ms: Option<i64>,
        message: Option<&str>,
    ) -> Result<(), DieselError> {
        self.logs.insert(job_name, outcome, duration_ms, message).await
    }
}
