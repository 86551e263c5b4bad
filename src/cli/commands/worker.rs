//! Worker command: run the scheduler against the configured jobs.

use std::sync::Arc;

use anyhow::Context;
use console::style;
use tokio::sync::watch;
use tracing::info;

use tornsync::config::Settings;
use tornsync::jobs::EndpointPollJob;
use tornsync::keys::ApiKeyRotator;
use tornsync::repository::{run_migrations, DbContext};
use tornsync::scheduler::{DieselJobStore, JobDefinition, JobScheduler};

use super::helpers::{create_client, create_rate_limiter};
use super::RateLimitBackendType;

/// Build a scheduler with every enabled, configured job registered.
async fn build_scheduler(
    settings: &Settings,
    ctx: &DbContext,
    backend: Option<RateLimitBackendType>,
) -> anyhow::Result<JobScheduler> {
    let limiter = create_rate_limiter(settings, ctx, backend).await?;
    let client = create_client(settings, limiter)?;
    let rotator = Arc::new(
        ApiKeyRotator::new(settings.api_keys.clone())
            .context("Set TORN_API_KEYS or api_keys in tornsync.toml")?,
    );

    let mut scheduler = JobScheduler::new(
        Arc::new(DieselJobStore::new(ctx)),
        settings.scheduler.clone(),
    );

    for (name, job) in &settings.jobs {
        if !job.enabled {
            println!("  {} {} (disabled in config)", style("-").dim(), name);
            continue;
        }
        let Some(ref path) = job.path else {
            println!("  {} {} has no path, skipping", style("!").yellow(), name);
            continue;
        };

        let handler = EndpointPollJob::new(name.clone(), client.clone(), rotator.clone(), path)
            .path_params(job.path_params.clone())
            .query_params(job.query_params.clone())
            .on_payload(Arc::new(|job_name, payload| {
                let fields = payload.as_object().map_or(0, |o| o.len());
                info!("'{}' received payload with {} field(s)", job_name, fields);
            }));

        let created = scheduler
            .register(
                JobDefinition::new(name.clone(), job.cadence, Arc::new(handler))
                    .with_sync_timeout(job.sync_timeout),
            )
            .await?;
        println!(
            "  {} {} every {}s{}",
            style("✓").green(),
            name,
            job.cadence.as_secs(),
            if created { " (new)" } else { "" }
        );
    }

    Ok(scheduler)
}

pub async fn cmd_worker(
    settings: &Settings,
    backend: Option<RateLimitBackendType>,
) -> anyhow::Result<()> {
    run_migrations(&settings.database_url()).await?;
    let ctx = settings.create_db_context()?;

    println!("{} Registering jobs", style("→").cyan());
    let scheduler = build_scheduler(settings, &ctx, backend).await?;

    if scheduler.job_names().is_empty() {
        println!("{} No jobs to run", style("!").yellow());
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    println!(
        "{} Worker running {} job(s). Press Ctrl-C to stop.",
        style("✓").green(),
        scheduler.job_names().len()
    );

    tokio::signal::ctrl_c().await?;
    println!(
        "{} Shutting down after in-flight runs finish...",
        style("↻").cyan()
    );
    let _ = shutdown_tx.send(true);
    runner.await?;

    println!("{} Worker stopped", style("✓").green());
    Ok(())
}

/// Run one configured job here, without claiming its schedule row.
pub async fn cmd_run_once(settings: &Settings, name: &str) -> anyhow::Result<()> {
    let ctx = settings.create_db_context()?;
    let scheduler = build_scheduler(settings, &ctx, None).await?;

    match scheduler.run_now(name).await? {
        Some(outcome) => println!("{} {}: {:?}", style("✓").green(), name, outcome),
        None => println!("{} {} is already running", style("!").yellow(), name),
    }
    Ok(())
}
