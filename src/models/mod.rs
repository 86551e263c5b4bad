//! Data models for tornsync.

mod job;

pub use job::{JobLogEntry, JobLogOutcome, JobSchedule, JobStatus};
