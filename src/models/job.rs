//! Job schedule and job log models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Run state of a scheduled job. `None` on the schedule means idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Persisted schedule row for one named job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSchedule {
    pub job_name: String,
    pub enabled: bool,
    /// Manual trigger; cleared when the next run completes.
    pub force_run: bool,
    pub cadence_seconds: i64,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub status: Option<JobStatus>,
    /// Consecutive failures, reset on success.
    pub attempts: i32,
    pub backoff_until: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobSchedule {
    /// A fresh, enabled schedule that is due immediately.
    pub fn new(job_name: impl Into<String>, cadence_seconds: i64, now: DateTime<Utc>) -> Self {
        Self {
            job_name: job_name.into(),
            enabled: true,
            force_run: false,
            cadence_seconds,
            next_run_at: now,
            last_run_at: None,
            status: None,
            attempts: 0,
            backoff_until: None,
            locked_at: None,
            error_message: None,
            updated_at: now,
        }
    }

    /// Whether the job may be claimed at `now`, ignoring the claim status.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled
            && (self.force_run || self.next_run_at <= now)
            && self.backoff_until.map_or(true, |until| until <= now)
    }

    /// Whether a claim is currently held on this row.
    pub fn is_running(&self) -> bool {
        self.status == Some(JobStatus::Running)
    }

    /// Whether a running claim is older than `max_age` and may be reclaimed.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.is_running() && self.locked_at.is_some_and(|locked| now - locked > max_age)
    }

    pub fn cadence(&self) -> Duration {
        Duration::seconds(self.cadence_seconds)
    }
}

/// Outcome recorded in the job log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobLogOutcome {
    Success,
    Error,
}

impl JobLogOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One completed or failed job run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub id: i32,
    pub job_name: String,
    pub outcome: JobLogOutcome,
    pub duration_ms: Option<i64>,
    pub message: Option<String>,
    pub host: Option<String>,
    pub created_at: DateTime<Utc>,
}
