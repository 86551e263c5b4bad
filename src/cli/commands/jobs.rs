//! Job schedule inspection and control.

use chrono::Utc;
use console::style;

use tornsync::config::Settings;
use tornsync::models::{JobLogOutcome, JobStatus};

use super::helpers::format_time;

pub async fn cmd_jobs_list(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let ctx = settings.create_db_context()?;
    let schedules = ctx.job_schedules().get_all().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&schedules)?);
        return Ok(());
    }

    if schedules.is_empty() {
        println!("{} No jobs registered yet", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:<24} {:<8} {:<8} {:>8} {:<20} {:<20} {:>4}",
        "JOB", "ENABLED", "STATUS", "CADENCE", "LAST RUN", "NEXT RUN", "FAIL"
    );
    let now = Utc::now();
    for job in &schedules {
        let status = match job.status {
            Some(JobStatus::Running) => style("running").cyan().to_string(),
            Some(JobStatus::Error) => style("error").red().to_string(),
            None if job.is_due(now) => style("due").green().to_string(),
            None => "idle".to_string(),
        };
        let next_run = if job.force_run {
            "forced".to_string()
        } else {
            format_time(job.backoff_until.or(Some(job.next_run_at)))
        };
        println!(
            "{:<24} {:<8} {:<8} {:>7}s {:<20} {:<20} {:>4}",
            job.job_name,
            if job.enabled { "yes" } else { "no" },
            status,
            job.cadence_seconds,
            format_time(job.last_run_at),
            next_run,
            job.attempts
        );
        if let Some(ref error) = job.error_message {
            println!("  {} {}", style("└").dim(), style(error).red());
        }
    }

    Ok(())
}

fn report(changed: bool, name: &str, done: &str) {
    if changed {
        println!("{} {} {}", style("✓").green(), name, done);
    } else {
        println!("{} Unknown job: {}", style("✗").red(), name);
    }
}

pub async fn cmd_jobs_trigger(settings: &Settings, name: &str) -> anyhow::Result<()> {
    let ctx = settings.create_db_context()?;
    let changed = ctx.job_schedules().set_force_run(name, true).await?;
    report(changed, name, "will run on the next poll");
    Ok(())
}

pub async fn cmd_jobs_set_enabled(
    settings: &Settings,
    name: &str,
    enabled: bool,
) -> anyhow::Result<()> {
    let ctx = settings.create_db_context()?;
    let changed = ctx.job_schedules().set_enabled(name, enabled).await?;
    report(changed, name, if enabled { "enabled" } else { "disabled" });
    Ok(())
}

pub async fn cmd_jobs_reset(settings: &Settings, name: &str) -> anyhow::Result<()> {
    let ctx = settings.create_db_context()?;
    let changed = ctx.job_schedules().reset(name).await?;
    report(changed, name, "reset");
    Ok(())
}

pub async fn cmd_jobs_history(settings: &Settings, name: &str, limit: i64) -> anyhow::Result<()> {
    let ctx = settings.create_db_context()?;
    let entries = ctx.job_logs().recent(name, limit).await?;

    if entries.is_empty() {
        println!("No runs recorded for {}", name);
        return Ok(());
    }

    for entry in entries {
        let outcome = match entry.outcome {
            JobLogOutcome::Success => style("✓").green(),
            JobLogOutcome::Error => style("✗").red(),
        };
        let duration = entry
            .duration_ms
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {} {:>8} {} {}",
            outcome,
            format_time(Some(entry.created_at)),
            duration,
            entry.host.as_deref().unwrap_or("-"),
            entry.message.as_deref().unwrap_or("")
        );
    }

    Ok(())
}

pub async fn cmd_jobs_prune_logs(settings: &Settings, older_than_days: u32) -> anyhow::Result<()> {
    let ctx = settings.create_db_context()?;
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(older_than_days));
    let removed = ctx.job_logs().prune_before(cutoff).await?;
    println!(
        "{} Removed {} log entr{} older than {} day(s)",
        style("✓").green(),
        removed,
        if removed == 1 { "y" } else { "ies" },
        older_than_days
    );
    Ok(())
}
