//! Diesel ORM models for database tables.

use diesel::prelude::*;

use crate::schema;

/// Job schedule record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::job_schedules)]
#[diesel(primary_key(job_name))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JobScheduleRecord {
    pub job_name: String,
    pub enabled: i32,
    pub force_run: i32,
    pub cadence_seconds: i64,
    pub next_run_at: String,
    pub last_run_at: Option<String>,
    pub status: Option<String>,
    pub attempts: i32,
    pub backoff_until: Option<String>,
    pub locked_at: Option<String>,
    pub error_message: Option<String>,
    pub updated_at: String,
}

/// New job schedule for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::job_schedules)]
pub struct NewJobSchedule<'a> {
    pub job_name: &'a str,
    pub enabled: i32,
    pub force_run: i32,
    pub cadence_seconds: i64,
    pub next_run_at: &'a str,
    pub attempts: i32,
    pub updated_at: &'a str,
}

/// Job log record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::job_logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JobLogRecord {
    pub id: i32,
    pub job_name: String,
    pub outcome: String,
    pub duration_ms: Option<i64>,
    pub message: Option<String>,
    pub host: Option<String>,
    pub created_at: String,
}

/// New job log entry for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::job_logs)]
pub struct NewJobLog<'a> {
    pub job_name: &'a str,
    pub outcome: &'a str,
    pub duration_ms: Option<i64>,
    pub message: Option<&'a str>,
    pub host: Option<&'a str>,
    pub created_at: &'a str,
}

/// One request recorded against an API key hash.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::rate_limit_requests)]
pub struct NewRateLimitRequest<'a> {
    pub key_hash: &'a str,
    pub requested_at: &'a str,
}
