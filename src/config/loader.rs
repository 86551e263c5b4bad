//! Configuration loading and environment overrides.

use std::path::PathBuf;

use crate::repository::util::{redact_url_password, validate_database_url};

use super::{Config, Settings};

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
}

async fn load_file_config(options: &LoadOptions) -> Result<Config, String> {
    match options.config_path {
        Some(ref path) => Config::load_from_path(path).await,
        None => Ok(Config::load().await),
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Split a comma-separated key list, dropping blanks.
pub(crate) fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Apply environment variable overrides. Environment wins over the config file.
fn apply_env_overrides(settings: &mut Settings) -> Result<(), String> {
    if let Some(database_url) = env_var("DATABASE_URL") {
        validate_database_url(&database_url)?;
        tracing::debug!(
            "Using DATABASE_URL from environment: {}",
            redact_url_password(&database_url)
        );
        settings.database_url = Some(database_url);
    }

    if let Some(backend) = env_var("RATE_LIMIT_BACKEND") {
        tracing::debug!(
            "Using RATE_LIMIT_BACKEND from environment: {}",
            redact_url_password(&backend)
        );
        settings.rate_limit_backend = Some(backend);
    }

    if let Some(keys) = env_var("TORN_API_KEYS") {
        let keys = parse_key_list(&keys);
        tracing::debug!("Using {} API key(s) from TORN_API_KEYS", keys.len());
        settings.api_keys = keys;
    }

    if let Some(base_url) = env_var("TORN_API_BASE_URL") {
        settings.api_base_url = base_url;
    }

    Ok(())
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(
    options: LoadOptions,
) -> Result<(Settings, Config), String> {
    let config = load_file_config(&options).await?;

    let mut settings = Settings::default();

    let base_dir = if options.use_cwd {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        config
            .base_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    };

    config.apply_to_settings(&mut settings, &base_dir);
    apply_env_overrides(&mut settings)?;

    Ok((settings, config))
}
