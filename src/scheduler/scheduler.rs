//! Poll loops, claiming and outcome bookkeeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::error::SchedulerError;
use super::job::{BoxedJobHandler, JobDefinition, JobOutcome};
use super::store::JobStore;
use super::sync_guard::SyncGuard;
use crate::models::{JobLogOutcome, JobSchedule};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often each job's row is polled.
    pub poll_interval: Duration,
    /// Age after which a `running` claim may be taken over. `None` disables reclaim.
    pub stale_claim: Option<Duration>,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            stale_claim: None,
            backoff_base: Duration::from_secs(60),
            backoff_max: Duration::from_secs(3600),
        }
    }
}

/// Backoff after the `attempts`-th consecutive failure: `base * 2^attempts`, capped at `max`.
pub fn failure_backoff(attempts: i32, base: Duration, max: Duration) -> Duration {
    let exponent = u32::try_from(attempts).unwrap_or(0);
    base.saturating_mul(2u32.saturating_pow(exponent)).min(max)
}

/// What one poll tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    NotDue,
    /// The row was due but another worker claimed it first.
    ClaimLost,
    Completed,
    Skipped,
    Failed,
}

struct RegisteredJob {
    name: String,
    sync_timeout: Duration,
    handler: BoxedJobHandler,
}

/// Runs registered jobs against shared schedule rows.
///
/// Clones share the store, the sync guard and the job list.
#[derive(Clone)]
pub struct JobScheduler {
    store: Arc<dyn JobStore>,
    guard: Arc<SyncGuard>,
    config: SchedulerConfig,
    jobs: Vec<Arc<RegisteredJob>>,
}

impl JobScheduler {
    pub fn new(store: Arc<dyn JobStore>, config: SchedulerConfig) -> Self {
        Self {
            store,
            guard: Arc::new(SyncGuard::new()),
            config,
            jobs: Vec::new(),
        }
    }

    /// Share a sync guard with other schedulers in this process.
    pub fn with_sync_guard(mut self, guard: Arc<SyncGuard>) -> Self {
        self.guard = guard;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.name.as_str()).collect()
    }

    /// Register a job and make sure its schedule row exists.
    ///
    /// Returns true if the row was newly created.
    pub async fn register(&mut self, definition: JobDefinition) -> Result<bool, SchedulerError> {
        if self.jobs.iter().any(|job| job.name == definition.name) {
            return Err(SchedulerError::DuplicateJob(definition.name));
        }

        let cadence_seconds = i64::try_from(definition.cadence.as_secs()).unwrap_or(i64::MAX);
        let created = self
            .store
            .ensure(&definition.name, cadence_seconds, Utc::now())
            .await?;
        if created {
            info!(
                "Created schedule for '{}' (every {}s)",
                definition.name, cadence_seconds
            );
        }

        self.jobs.push(Arc::new(RegisteredJob {
            name: definition.name,
            sync_timeout: definition.sync_timeout,
            handler: definition.handler,
        }));
        Ok(created)
    }

    fn find(&self, job_name: &str) -> Result<&Arc<RegisteredJob>, SchedulerError> {
        self.jobs
            .iter()
            .find(|job| job.name == job_name)
            .ok_or_else(|| SchedulerError::UnknownJob(job_name.to_string()))
    }

    /// Poll one job once: claim it if due and run it.
    pub async fn tick(&self, job_name: &str) -> Result<TickOutcome, SchedulerError> {
        let job = self.find(job_name)?;
        self.tick_job(job).await
    }

    async fn tick_job(&self, job: &RegisteredJob) -> Result<TickOutcome, SchedulerError> {
        let now = Utc::now();
        let schedule = self
            .store
            .get(&job.name)
            .await?
            .ok_or_else(|| SchedulerError::UnknownJob(job.name.clone()))?;

        let stale_age = self
            .config
            .stale_claim
            .and_then(|age| chrono::Duration::from_std(age).ok());
        let stale = stale_age.is_some_and(|age| schedule.is_stale(now, age));

        if !schedule.is_due(now) || (schedule.is_running() && !stale) {
            return Ok(TickOutcome::NotDue);
        }

        let stale_before = stale_age.map(|age| now - age);
        if !self.store.try_claim(&job.name, now, stale_before).await? {
            debug!("'{}' was claimed by another worker", job.name);
            return Ok(TickOutcome::ClaimLost);
        }
        if stale {
            warn!(
                "Reclaimed '{}' from a claim held since {:?}",
                job.name, schedule.locked_at
            );
        }

        self.execute_claimed(job, &schedule).await
    }

    async fn execute_claimed(
        &self,
        job: &RegisteredJob,
        schedule: &JobSchedule,
    ) -> Result<TickOutcome, SchedulerError> {
        let started = Instant::now();
        let handler = job.handler.clone();
        let result = self
            .guard
            .execute(&job.name, job.sync_timeout, || async move {
                handler.run().await
            })
            .await;
        let finished = Utc::now();
        let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        match result {
            Ok(Some(JobOutcome::Completed)) => {
                self.store
                    .mark_completed(&job.name, finished, finished + schedule.cadence())
                    .await?;
                info!("Job '{}' completed in {}ms", job.name, duration_ms);
                if let Err(e) = self
                    .store
                    .log_run(&job.name, JobLogOutcome::Success, Some(duration_ms), None)
                    .await
                {
                    warn!("Failed to write job log for '{}': {}", job.name, e);
                }
                Ok(TickOutcome::Completed)
            }
            Ok(Some(JobOutcome::Skipped)) | Ok(None) => {
                self.store
                    .mark_completed(&job.name, finished, finished + schedule.cadence())
                    .await?;
                debug!("Job '{}' skipped", job.name);
                Ok(TickOutcome::Skipped)
            }
            Err(e) => {
                let attempts = schedule.attempts.saturating_add(1);
                let backoff =
                    failure_backoff(attempts, self.config.backoff_base, self.config.backoff_max);
                let backoff_until = finished
                    + chrono::Duration::from_std(backoff)
                        .unwrap_or_else(|_| chrono::Duration::seconds(3600));
                let message = e.to_string();

                error!(
                    "Job '{}' failed (attempt {}), retrying in {}s: {}",
                    job.name,
                    attempts,
                    backoff.as_secs(),
                    message
                );
                self.store
                    .mark_failed(&job.name, finished, attempts, backoff_until, &message)
                    .await?;
                if let Err(e) = self
                    .store
                    .log_run(
                        &job.name,
                        JobLogOutcome::Error,
                        Some(duration_ms),
                        Some(&message),
                    )
                    .await
                {
                    warn!("Failed to write job log for '{}': {}", job.name, e);
                }
                Ok(TickOutcome::Failed)
            }
        }
    }

    /// Run a job's handler here and now, through the sync guard but without
    /// touching its schedule row.
    ///
    /// Returns `Ok(None)` if the job is already running in this process.
    pub async fn run_now(&self, job_name: &str) -> Result<Option<JobOutcome>, SchedulerError> {
        let job = self.find(job_name)?;
        let handler = job.handler.clone();
        self.guard
            .execute(&job.name, job.sync_timeout, || async move {
                handler.run().await
            })
            .await
            .map_err(|source| SchedulerError::Job {
                name: job.name.clone(),
                source,
            })
    }

    /// Poll every registered job until `shutdown` turns true or its sender
    /// is dropped. A run in progress is finished before its loop exits.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let mut loops = JoinSet::new();
        for job in &self.jobs {
            let scheduler = self.clone();
            let job = job.clone();
            let shutdown = shutdown.clone();
            loops.spawn(async move { scheduler.poll_loop(&job, shutdown).await });
        }

        info!(
            "Scheduler started with {} job(s), polling every {:?}",
            self.jobs.len(),
            self.config.poll_interval
        );

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                error!("Job loop terminated abnormally: {}", e);
            }
        }

        info!("Scheduler stopped");
    }

    async fn poll_loop(&self, job: &RegisteredJob, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            match self.tick_job(job).await {
                Ok(outcome) => debug!("Tick '{}': {:?}", job.name, outcome),
                Err(e) => warn!("Tick for '{}' failed: {}", job.name, e),
            }
        }

        debug!("Poll loop for '{}' stopped", job.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::DateTime;
    use tempfile::tempdir;

    use crate::repository::{run_migrations, DbContext, DieselError};
    use crate::scheduler::{handler_fn, DieselJobStore, JobError};

    async fn setup_test_db() -> (DbContext, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        run_migrations(&format!("sqlite:{}", db_path.display()))
            .await
            .unwrap();
        (DbContext::from_sqlite_path(&db_path), dir)
    }

    fn scheduler(ctx: &DbContext, config: SchedulerConfig) -> JobScheduler {
        JobScheduler::new(Arc::new(DieselJobStore::new(ctx)), config)
    }

    fn counting_job(
        name: &str,
        counter: Arc<AtomicUsize>,
        outcome: Result<JobOutcome, &'static str>,
    ) -> JobDefinition {
        JobDefinition::new(
            name,
            Duration::from_secs(60),
            handler_fn(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    outcome.map_err(JobError::failed)
                }
            }),
        )
    }

    #[test]
    fn test_failure_backoff() {
        let base = Duration::from_secs(60);
        let max = Duration::from_secs(3600);
        assert_eq!(failure_backoff(1, base, max), Duration::from_secs(120));
        assert_eq!(failure_backoff(3, base, max), Duration::from_secs(480));
        assert_eq!(failure_backoff(5, base, max), Duration::from_secs(1920));
        assert_eq!(failure_backoff(6, base, max), max);
        assert_eq!(failure_backoff(40, base, max), max);
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let (ctx, _dir) = setup_test_db().await;
        let counter = Arc::new(AtomicUsize::new(0));

        let mut first = scheduler(&ctx, SchedulerConfig::default());
        assert!(first
            .register(counting_job("faction_sync", counter.clone(), Ok(JobOutcome::Completed)))
            .await
            .unwrap());

        let mut second = scheduler(&ctx, SchedulerConfig::default());
        assert!(!second
            .register(counting_job("faction_sync", counter.clone(), Ok(JobOutcome::Completed)))
            .await
            .unwrap());

        let duplicate = first
            .register(counting_job("faction_sync", counter, Ok(JobOutcome::Completed)))
            .await;
        assert!(matches!(duplicate, Err(SchedulerError::DuplicateJob(_))));
        assert_eq!(first.job_names(), vec!["faction_sync"]);
    }

    #[tokio::test]
    async fn test_due_job_runs_then_not_due() {
        let (ctx, _dir) = setup_test_db().await;
        let counter = Arc::new(AtomicUsize::new(0));
        let mut sched = scheduler(&ctx, SchedulerConfig::default());
        sched
            .register(counting_job("faction_sync", counter.clone(), Ok(JobOutcome::Completed)))
            .await
            .unwrap();

        let before = Utc::now();
        assert_eq!(sched.tick("faction_sync").await.unwrap(), TickOutcome::Completed);
        assert_eq!(sched.tick("faction_sync").await.unwrap(), TickOutcome::NotDue);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let row = ctx.job_schedules().get("faction_sync").await.unwrap().unwrap();
        assert_eq!(row.status, None);
        assert_eq!(row.attempts, 0);
        assert!(row.last_run_at.is_some());
        assert!(row.next_run_at >= before + chrono::Duration::seconds(60));

        let logs = ctx.job_logs().recent("faction_sync", 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].outcome, JobLogOutcome::Success);
        assert!(logs[0].duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_force_run_bypasses_next_run_at() {
        let (ctx, _dir) = setup_test_db().await;
        let counter = Arc::new(AtomicUsize::new(0));
        let mut sched = scheduler(&ctx, SchedulerConfig::default());
        sched
            .register(counting_job("faction_sync", counter.clone(), Ok(JobOutcome::Completed)))
            .await
            .unwrap();

        sched.tick("faction_sync").await.unwrap();
        assert!(ctx
            .job_schedules()
            .set_force_run("faction_sync", true)
            .await
            .unwrap());

        assert_eq!(sched.tick("faction_sync").await.unwrap(), TickOutcome::Completed);
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        let row = ctx.job_schedules().get("faction_sync").await.unwrap().unwrap();
        assert!(!row.force_run);
    }

    #[tokio::test]
    async fn test_disabled_job_is_not_due() {
        let (ctx, _dir) = setup_test_db().await;
        let counter = Arc::new(AtomicUsize::new(0));
        let mut sched = scheduler(&ctx, SchedulerConfig::default());
        sched
            .register(counting_job("faction_sync", counter.clone(), Ok(JobOutcome::Completed)))
            .await
            .unwrap();
        ctx.job_schedules()
            .set_enabled("faction_sync", false)
            .await
            .unwrap();

        assert_eq!(sched.tick("faction_sync").await.unwrap(), TickOutcome::NotDue);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_sets_backoff() {
        let (ctx, _dir) = setup_test_db().await;
        let counter = Arc::new(AtomicUsize::new(0));
        let mut sched = scheduler(&ctx, SchedulerConfig::default());
        sched
            .register(counting_job("faction_sync", counter.clone(), Err("torn is down")))
            .await
            .unwrap();

        // Two earlier failures whose backoff has already elapsed
        let past = Utc::now() - chrono::Duration::seconds(10);
        ctx.job_schedules()
            .mark_failed("faction_sync", past, 2, past, "earlier")
            .await
            .unwrap();

        let before = Utc::now();
        assert_eq!(sched.tick("faction_sync").await.unwrap(), TickOutcome::Failed);
        let after = Utc::now();

        let row = ctx.job_schedules().get("faction_sync").await.unwrap().unwrap();
        assert_eq!(row.attempts, 3);
        assert_eq!(row.status, Some(crate::models::JobStatus::Error));
        assert_eq!(row.error_message.as_deref(), Some("torn is down"));
        assert_eq!(row.locked_at, None);

        let until = row.backoff_until.unwrap();
        assert!(until >= before + chrono::Duration::seconds(480) - chrono::Duration::seconds(1));
        assert!(until <= after + chrono::Duration::seconds(480) + chrono::Duration::seconds(1));

        // Still in backoff
        assert_eq!(sched.tick("faction_sync").await.unwrap(), TickOutcome::NotDue);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let logs = ctx.job_logs().recent("faction_sync", 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].outcome, JobLogOutcome::Error);
        assert_eq!(logs[0].message.as_deref(), Some("torn is down"));
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let (ctx, _dir) = setup_test_db().await;
        let counter = Arc::new(AtomicUsize::new(0));
        let mut sched = scheduler(&ctx, SchedulerConfig::default());
        sched
            .register(counting_job("faction_sync", counter, Ok(JobOutcome::Completed)))
            .await
            .unwrap();

        let past = Utc::now() - chrono::Duration::seconds(10);
        ctx.job_schedules()
            .mark_failed("faction_sync", past, 4, past, "earlier")
            .await
            .unwrap();

        assert_eq!(sched.tick("faction_sync").await.unwrap(), TickOutcome::Completed);
        let row = ctx.job_schedules().get("faction_sync").await.unwrap().unwrap();
        assert_eq!(row.attempts, 0);
        assert_eq!(row.status, None);
        assert_eq!(row.error_message, None);
        assert_eq!(row.backoff_until, None);
    }

    #[tokio::test]
    async fn test_skipped_reschedules_without_log() {
        let (ctx, _dir) = setup_test_db().await;
        let counter = Arc::new(AtomicUsize::new(0));
        let mut sched = scheduler(&ctx, SchedulerConfig::default());
        sched
            .register(counting_job("war_sync", counter, Ok(JobOutcome::Skipped)))
            .await
            .unwrap();

        assert_eq!(sched.tick("war_sync").await.unwrap(), TickOutcome::Skipped);
        assert_eq!(sched.tick("war_sync").await.unwrap(), TickOutcome::NotDue);
        assert!(ctx.job_logs().recent("war_sync", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shared_guard_skips_overlapping_run() {
        let (ctx, _dir) = setup_test_db().await;
        let guard = Arc::new(SyncGuard::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut sched = scheduler(&ctx, SchedulerConfig::default()).with_sync_guard(guard.clone());
        sched
            .register(counting_job("faction_sync", counter.clone(), Ok(JobOutcome::Completed)))
            .await
            .unwrap();

        // Another scheduler in this process is mid-run
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let holder = {
            let guard = guard.clone();
            tokio::spawn(async move {
                guard
                    .execute("faction_sync", Duration::from_secs(300), || async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok::<_, JobError>(())
                    })
                    .await
            })
        };
        started_rx.await.unwrap();

        assert_eq!(sched.tick("faction_sync").await.unwrap(), TickOutcome::Skipped);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(ctx.job_logs().recent("faction_sync", 10).await.unwrap().is_empty());
        let row = ctx.job_schedules().get("faction_sync").await.unwrap().unwrap();
        assert_eq!(row.status, None);

        release_tx.send(()).unwrap();
        assert_eq!(holder.await.unwrap().unwrap(), Some(()));
        assert!(!guard.is_running("faction_sync"));

        ctx.job_schedules()
            .set_force_run("faction_sync", true)
            .await
            .unwrap();
        assert_eq!(sched.tick("faction_sync").await.unwrap(), TickOutcome::Completed);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_running_claim_blocks_until_stale() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.job_schedules();
        let now = Utc::now();
        repo.ensure("faction_sync", 60, now - chrono::Duration::hours(3))
            .await
            .unwrap();
        // A worker claimed it two hours ago and never came back
        assert!(repo
            .try_claim("faction_sync", now - chrono::Duration::hours(2), None)
            .await
            .unwrap());

        let counter = Arc::new(AtomicUsize::new(0));
        let mut plain = scheduler(&ctx, SchedulerConfig::default());
        plain
            .register(counting_job("faction_sync", counter.clone(), Ok(JobOutcome::Completed)))
            .await
            .unwrap();
        assert_eq!(plain.tick("faction_sync").await.unwrap(), TickOutcome::NotDue);

        let mut reclaiming = scheduler(
            &ctx,
            SchedulerConfig {
                stale_claim: Some(Duration::from_secs(3600)),
                ..SchedulerConfig::default()
            },
        );
        reclaiming
            .register(counting_job("faction_sync", counter.clone(), Ok(JobOutcome::Completed)))
            .await
            .unwrap();
        assert_eq!(
            reclaiming.tick("faction_sync").await.unwrap(),
            TickOutcome::Completed
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_now_skips_schedule_row() {
        let (ctx, _dir) = setup_test_db().await;
        let counter = Arc::new(AtomicUsize::new(0));
        let mut sched = scheduler(&ctx, SchedulerConfig::default());
        sched
            .register(counting_job("faction_sync", counter.clone(), Ok(JobOutcome::Completed)))
            .await
            .unwrap();

        assert_eq!(
            sched.run_now("faction_sync").await.unwrap(),
            Some(JobOutcome::Completed)
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let row = ctx.job_schedules().get("faction_sync").await.unwrap().unwrap();
        assert_eq!(row.last_run_at, None);

        assert!(matches!(
            sched.run_now("missing").await,
            Err(SchedulerError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn test_run_loop_until_shutdown() {
        let (ctx, _dir) = setup_test_db().await;
        let counter = Arc::new(AtomicUsize::new(0));
        let mut sched = scheduler(
            &ctx,
            SchedulerConfig {
                poll_interval: Duration::from_millis(20),
                ..SchedulerConfig::default()
            },
        );
        sched
            .register(counting_job("faction_sync", counter.clone(), Ok(JobOutcome::Completed)))
            .await
            .unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { sched.run(rx).await });

        for _ in 0..100 {
            if counter.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        // Cadence is a minute, so the job ran exactly once
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    struct BrokenStore;

    #[async_trait]
    impl JobStore for BrokenStore {
        async fn ensure(
            &self,
            _job_name: &str,
            _cadence_seconds: i64,
            _now: DateTime<Utc>,
        ) -> Result<bool, DieselError> {
            Ok(true)
        }

        async fn get(&self, _job_name: &str) -> Result<Option<JobSchedule>, DieselError> {
            Err(DieselError::NotFound)
        }

        async fn try_claim(
            &self,
            _job_name: &str,
            _now: DateTime<Utc>,
            _stale_before: Option<DateTime<Utc>>,
        ) -> Result<bool, DieselError> {
            Err(DieselError::NotFound)
        }

        async fn mark_completed(
            &self,
            _job_name: &str,
            _now: DateTime<Utc>,
            _next_run_at: DateTime<Utc>,
        ) -> Result<(), DieselError> {
            Err(DieselError::NotFound)
        }

        async fn mark_failed(
            &self,
            _job_name: &str,
            _now: DateTime<Utc>,
            _attempts: i32,
            _backoff_until: DateTime<Utc>,
            _error: &str,
        ) -> Result<(), DieselError> {
            Err(DieselError::NotFound)
        }

        async fn log_run(
            &self,
            _job_name: &str,
            _outcome: JobLogOutcome,
            _duration_ms: Option<i64>,
            _message: Option<&str>,
        ) -> Result<(), DieselError> {
            Err(DieselError::NotFound)
        }
    }

    #[tokio::test]
    async fn test_store_errors_do_not_stop_the_loop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut sched = JobScheduler::new(
            Arc::new(BrokenStore),
            SchedulerConfig {
                poll_interval: Duration::from_millis(10),
                ..SchedulerConfig::default()
            },
        );
        sched
            .register(counting_job("faction_sync", counter.clone(), Ok(JobOutcome::Completed)))
            .await
            .unwrap();

        assert!(matches!(
            sched.tick("faction_sync").await,
            Err(SchedulerError::Database(_))
        ));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { sched.run(rx).await });
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!handle.is_finished());

        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
