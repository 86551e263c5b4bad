//! API key usage commands.

use console::style;

use tornsync::config::Settings;
use tornsync::keys::{mask_key, BatchHandler, KeyCapacity};

use super::helpers::create_rate_limiter;
use super::RateLimitBackendType;

pub async fn cmd_keys_capacity(
    settings: &Settings,
    backend: Option<RateLimitBackendType>,
    json: bool,
) -> anyhow::Result<()> {
    if settings.api_keys.is_empty() {
        println!(
            "{} No API keys configured (set TORN_API_KEYS or api_keys)",
            style("!").yellow()
        );
        return Ok(());
    }

    let ctx = settings.create_db_context()?;
    let limiter = create_rate_limiter(settings, &ctx, backend).await?;
    let max = limiter.max_requests();
    let capacities = BatchHandler::new(limiter)
        .analyze_key_capacity(&settings.api_keys)
        .await;

    let masked: Vec<KeyCapacity> = capacities
        .into_iter()
        .map(|c| KeyCapacity {
            key: mask_key(&c.key),
            ..c
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&masked)?);
        return Ok(());
    }

    let window = settings.rate_limit.window.as_secs();
    println!("{:<12} {:>6} {:>10}", "KEY", "USED", "REMAINING");
    for capacity in &masked {
        let remaining = if capacity.remaining == 0 {
            style(capacity.remaining.to_string()).red()
        } else {
            style(capacity.remaining.to_string()).green()
        };
        println!(
            "{:<12} {:>6} {:>10}",
            capacity.key, capacity.used, remaining
        );
    }
    let total: u64 = masked.iter().map(|c| c.remaining).sum();
    println!(
        "\n{} of {} requests available in the current {}s window",
        total,
        max * masked.len() as u64,
        window
    );

    Ok(())
}

pub async fn cmd_keys_purge(
    settings: &Settings,
    backend: Option<RateLimitBackendType>,
) -> anyhow::Result<()> {
    let ctx = settings.create_db_context()?;
    let limiter = create_rate_limiter(settings, &ctx, backend).await?;
    let removed = limiter.purge_expired().await?;
    println!(
        "{} Purged {} expired rate limit record(s)",
        style("✓").green(),
        removed
    );
    Ok(())
}
