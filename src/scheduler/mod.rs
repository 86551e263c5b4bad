//! Distributed, database-backed polling job scheduler.
//!
//! Each registered job owns one row in `job_schedules`. Every worker process
//! polls the rows of the jobs it knows about and races to claim due ones with
//! a single conditional UPDATE; whoever affects the row runs the handler.
//! Outcomes are written back to the row (next run, or failure backoff) and
//! to `job_logs`.

mod error;
mod job;
#[allow(clippy::module_inception)]
mod scheduler;
mod store;
mod sync_guard;

pub use error::SchedulerError;
pub use job::{handler_fn, BoxedJobHandler, JobDefinition, JobError, JobHandler, JobOutcome};
pub use scheduler::{failure_backoff, JobScheduler, SchedulerConfig, TickOutcome};
pub use store::{DieselJobStore, JobStore};
pub use sync_guard::SyncGuard;
