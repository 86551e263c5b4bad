//! Diesel-based job log repository.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{JobLogRecord, NewJobLog};
use super::pool::{DbPool, DieselError};
use super::util::{format_timestamp, parse_datetime};
use crate::models::{JobLogEntry, JobLogOutcome};
use crate::schema::job_logs;
use crate::with_conn;

impl TryFrom<JobLogRecord> for JobLogEntry {
    type Error = diesel::result::Error;

    fn try_from(record: JobLogRecord) -> Result<Self, Self::Error> {
        Ok(JobLogEntry {
            id: record.id,
            outcome: JobLogOutcome::from_str(&record.outcome).ok_or_else(|| {
                diesel::result::Error::DeserializationError(
                    format!("Invalid job log outcome: '{}'", record.outcome).into(),
                )
            })?,
            job_name: record.job_name,
            duration_ms: record.duration_ms,
            message: record.message,
            host: record.host,
            created_at: parse_datetime(&record.created_at),
        })
    }
}

#[derive(Clone)]
pub struct DieselJobLogRepository {
    pool: DbPool,
}

impl DieselJobLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        job_name: &str,
        outcome: JobLogOutcome,
        duration_ms: Option<i64>,
        message: Option<&str>,
    ) -> Result<(), DieselError> {
        let created_at = format_timestamp(Utc::now());
        let host = hostname::get().ok().and_then(|h| h.into_string().ok());

        with_conn!(self.pool, conn => {
            diesel::insert_into(job_logs::table)
                .values(NewJobLog {
                    job_name,
                    outcome: outcome.as_str(),
                    duration_ms,
                    message,
                    host: host.as_deref(),
                    created_at: &created_at,
                })
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Most recent entries for a job, newest first.
    pub async fn recent(&self, job_name: &str, limit: i64) -> Result<Vec<JobLogEntry>, DieselError> {
        with_conn!(self.pool, conn => {
            job_logs::table
                .filter(job_logs::job_name.eq(job_name))
                .order((job_logs::created_at.desc(), job_logs::id.desc()))
                .limit(limit)
                .load::<JobLogRecord>(&mut conn)
                .await
                .and_then(|records| records.into_iter().map(JobLogEntry::try_from).collect())
        })
    }

    /// Delete entries created before `cutoff`. Returns the number removed.
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DieselError> {
        let cutoff = format_timestamp(cutoff);
        with_conn!(self.pool, conn => {
            let rows = diesel::delete(job_logs::table.filter(job_logs::created_at.lt(&cutoff)))
                .execute(&mut conn)
                .await?;
            Ok(rows)
        })
    }
}
