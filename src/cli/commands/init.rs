//! Initialize command.

use console::style;

use tornsync::config::Settings;
use tornsync::repository::run_migrations;
use tornsync::repository::util::redact_url_password;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.is_postgres() {
        settings.ensure_directories()?;
    }

    let database_url = settings.database_url();
    run_migrations(&database_url).await?;

    if settings.jobs.is_empty() {
        println!(
            "{} No jobs configured in tornsync.toml",
            style("!").yellow()
        );
    }
    if settings.api_keys.is_empty() {
        println!(
            "{} No API keys configured (set TORN_API_KEYS or api_keys)",
            style("!").yellow()
        );
    }

    println!(
        "{} Initialized database at {}",
        style("✓").green(),
        redact_url_password(&database_url)
    );

    Ok(())
}
