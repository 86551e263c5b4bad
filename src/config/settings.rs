//! Application settings.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::{DEFAULT_BASE_URL, DEFAULT_INVALID_KEY_CODES};
use crate::rate_limit::RateLimitConfig;
use crate::repository::util::is_postgres_url;
use crate::repository::{DbContext, DieselError};
use crate::scheduler::SchedulerConfig;

use super::DEFAULT_DATABASE_FILENAME;

/// Resolved settings for one configured job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSettings {
    pub cadence: Duration,
    pub enabled: bool,
    pub sync_timeout: Duration,
    pub path: Option<String>,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            cadence: Duration::from_secs(60),
            enabled: true,
            sync_timeout: Duration::from_secs(300),
            path: None,
            path_params: HashMap::new(),
            query_params: HashMap::new(),
        }
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    /// Set via DATABASE_URL env var or the `database` field in config files.
    pub database_url: Option<String>,
    /// Rate limit backend (None = database, "memory", "database", "redis://...").
    pub rate_limit_backend: Option<String>,
    pub rate_limit: RateLimitConfig,
    pub scheduler: SchedulerConfig,
    pub jobs: BTreeMap<String, JobSettings>,
    pub api_base_url: String,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    pub user_agent: String,
    pub invalid_key_codes: Vec<i64>,
    pub api_keys: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tornsync");

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            rate_limit_backend: None,
            rate_limit: RateLimitConfig::default(),
            scheduler: SchedulerConfig::default(),
            jobs: BTreeMap::new(),
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: 30,
            user_agent: format!("tornsync/{}", env!("CARGO_PKG_VERSION")),
            invalid_key_codes: DEFAULT_INVALID_KEY_CODES.to_vec(),
            api_keys: Vec::new(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    pub fn is_postgres(&self) -> bool {
        self.database_url
            .as_ref()
            .is_some_and(|url| is_postgres_url(url))
    }

    /// Full path to the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })
    }

    pub fn create_db_context(&self) -> Result<DbContext, DieselError> {
        DbContext::from_url(&self.database_url())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}
