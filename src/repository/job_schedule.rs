//! Diesel-based job schedule repository.
//!
//! Every state change the scheduler makes is a single UPDATE so that
//! concurrent workers on other hosts only ever race on the claim.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{JobScheduleRecord, NewJobSchedule};
use super::pool::{DbPool, DieselError};
use super::util::{format_timestamp, parse_datetime, parse_datetime_opt};
use crate::models::{JobSchedule, JobStatus};
use crate::schema::job_schedules;
use crate::{with_conn, with_conn_split};

impl TryFrom<JobScheduleRecord> for JobSchedule {
    type Error = diesel::result::Error;

    fn try_from(record: JobScheduleRecord) -> Result<Self, Self::Error> {
        let status = match record.status.as_deref() {
            None => None,
            Some(s) => Some(JobStatus::from_str(s).ok_or_else(|| {
                diesel::result::Error::DeserializationError(
                    format!("Invalid job status: '{}'", s).into(),
                )
            })?),
        };

        Ok(JobSchedule {
            job_name: record.job_name,
            enabled: record.enabled != 0,
            force_run: record.force_run != 0,
            cadence_seconds: record.cadence_seconds,
            next_run_at: parse_datetime(&record.next_run_at),
            last_run_at: parse_datetime_opt(record.last_run_at),
            status,
            attempts: record.attempts,
            backoff_until: parse_datetime_opt(record.backoff_until),
            locked_at: parse_datetime_opt(record.locked_at),
            error_message: record.error_message,
            updated_at: parse_datetime(&record.updated_at),
        })
    }
}

/// Diesel-based job schedule repository.
#[derive(Clone)]
pub struct DieselJobScheduleRepository {
    pool: DbPool,
}

impl DieselJobScheduleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get all job schedules ordered by name.
    pub async fn get_all(&self) -> Result<Vec<JobSchedule>, DieselError> {
        with_conn!(self.pool, conn => {
            job_schedules::table
                .order(job_schedules::job_name.asc())
                .load::<JobScheduleRecord>(&mut conn)
                .await
                .and_then(|records| records.into_iter().map(JobSchedule::try_from).collect())
        })
    }

    pub async fn get(&self, job_name: &str) -> Result<Option<JobSchedule>, DieselError> {
        with_conn!(self.pool, conn => {
            job_schedules::table
                .find(job_name)
                .first::<JobScheduleRecord>(&mut conn)
                .await
                .optional()
                .and_then(|opt| opt.map(JobSchedule::try_from).transpose())
        })
    }

    /// Insert a schedule row unless one already exists.
    ///
    /// Existing rows keep their cadence and state. Returns true if a row was created.
    pub async fn ensure(
        &self,
        job_name: &str,
        cadence_seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, DieselError> {
        let now_str = format_timestamp(now);
        let new = NewJobSchedule {
            job_name,
            enabled: 1,
            force_run: 0,
            cadence_seconds,
            next_run_at: &now_str,
            attempts: 0,
            updated_at: &now_str,
        };

        with_conn_split!(self.pool,
            sqlite: conn => {
                let rows = diesel::insert_or_ignore_into(job_schedules::table)
                    .values(&new)
                    .execute(&mut conn)
                    .await?;
                Ok(rows > 0)
            },
            postgres: conn => {
                let rows = diesel::insert_into(job_schedules::table)
                    .values(&new)
                    .on_conflict_do_nothing()
                    .execute(&mut conn)
                    .await?;
                Ok(rows > 0)
            }
        )
    }

    /// Atomically claim a due job.
    ///
    /// The WHERE clause repeats the due check so that of several workers
    /// racing on the same row exactly one sees an affected row. With
    /// `stale_before` set, a `running` claim locked before that instant
    /// counts as abandoned and may be taken over.
    pub async fn try_claim(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
        stale_before: Option<DateTime<Utc>>,
    ) -> Result<bool, DieselError> {
        let now_str = format_timestamp(now);
        // NULL when reclaim is disabled, so the comparison never matches.
        let stale_cutoff = stale_before.map(format_timestamp);

        with_conn!(self.pool, conn => {
            let rows = diesel::update(
                job_schedules::table
                    .filter(job_schedules::job_name.eq(job_name))
                    .filter(job_schedules::enabled.eq(1))
                    .filter(
                        job_schedules::force_run
                            .eq(1)
                            .or(job_schedules::next_run_at.le(&now_str)),
                    )
                    .filter(
                        job_schedules::backoff_until
                            .is_null()
                            .or(job_schedules::backoff_until.le(now_str.as_str())),
                    )
                    .filter(
                        job_schedules::status
                            .is_null()
                            .or(job_schedules::status.ne(JobStatus::Running.as_str()))
                            .or(job_schedules::locked_at.lt(stale_cutoff.as_deref())),
                    ),
            )
            .set((
                job_schedules::status.eq(JobStatus::Running.as_str()),
                job_schedules::locked_at.eq(now_str.as_str()),
                job_schedules::updated_at.eq(&now_str),
            ))
            .execute(&mut conn)
            .await?;
            Ok(rows > 0)
        })
    }

    /// Record a successful (or skipped) run and schedule the next one.
    pub async fn mark_completed(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), DieselError> {
        let now_str = format_timestamp(now);
        let next_str = format_timestamp(next_run_at);

        with_conn!(self.pool, conn => {
            diesel::update(job_schedules::table.find(job_name))
                .set((
                    job_schedules::last_run_at.eq(now_str.as_str()),
                    job_schedules::next_run_at.eq(&next_str),
                    job_schedules::force_run.eq(0),
                    job_schedules::status.eq(None::<&str>),
                    job_schedules::error_message.eq(None::<&str>),
                    job_schedules::locked_at.eq(None::<&str>),
                    job_schedules::backoff_until.eq(None::<&str>),
                    job_schedules::attempts.eq(0),
                    job_schedules::updated_at.eq(&now_str),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Record a failed run and push eligibility out to `backoff_until`.
    pub async fn mark_failed(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
        attempts: i32,
        backoff_until: DateTime<Utc>,
        error: &str,
    ) -> Result<(), DieselError> {
        let now_str = format_timestamp(now);
        let backoff_str = format_timestamp(backoff_until);

        with_conn!(self.pool, conn => {
            diesel::update(job_schedules::table.find(job_name))
                .set((
                    job_schedules::attempts.eq(attempts),
                    job_schedules::backoff_until.eq(backoff_str.as_str()),
                    job_schedules::status.eq(JobStatus::Error.as_str()),
                    job_schedules::error_message.eq(error),
                    job_schedules::locked_at.eq(None::<&str>),
                    job_schedules::updated_at.eq(&now_str),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Set or clear the manual trigger. Returns false if the job is unknown.
    pub async fn set_force_run(&self, job_name: &str, force: bool) -> Result<bool, DieselError> {
        let now_str = format_timestamp(Utc::now());
        with_conn!(self.pool, conn => {
            let rows = diesel::update(job_schedules::table.find(job_name))
                .set((
                    job_schedules::force_run.eq(i32::from(force)),
                    job_schedules::updated_at.eq(&now_str),
                ))
                .execute(&mut conn)
                .await?;
            Ok(rows > 0)
        })
    }

    pub async fn set_enabled(&self, job_name: &str, enabled: bool) -> Result<bool, DieselError> {
        let now_str = format_timestamp(Utc::now());
        with_conn!(self.pool, conn => {
            let rows = diesel::update(job_schedules::table.find(job_name))
                .set((
                    job_schedules::enabled.eq(i32::from(enabled)),
                    job_schedules::updated_at.eq(&now_str),
                ))
                .execute(&mut conn)
                .await?;
            Ok(rows > 0)
        })
    }

    /// Clear a stuck claim and any failure backoff.
    pub async fn reset(&self, job_name: &str) -> Result<bool, DieselError> {
        let now_str = format_timestamp(Utc::now());
        with_conn!(self.pool, conn => {
            let rows = diesel::update(job_schedules::table.find(job_name))
                .set((
                    job_schedules::status.eq(None::<&str>),
                    job_schedules::locked_at.eq(None::<&str>),
                    job_schedules::backoff_until.eq(None::<&str>),
                    job_schedules::error_message.eq(None::<&str>),
                    job_schedules::attempts.eq(0),
                    job_schedules::updated_at.eq(&now_str),
                ))
                .execute(&mut conn)
                .await?;
            Ok(rows > 0)
        })
    }
}
