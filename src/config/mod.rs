//! Configuration management using the prefer crate.

mod loader;
mod settings;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::repository::util::validate_database_url;

pub use loader::{load_settings_with_options, LoadOptions};
pub use settings::{JobSettings, Settings};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "tornsync.db";

/// `[rate_limit]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, prefer::FromValue)]
pub struct RateLimitSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_requests: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_buffer_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wait_checks: Option<u32>,
}

impl RateLimitSection {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, prefer::FromValue)]
pub struct SchedulerSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    /// Reclaim `running` rows locked longer than this. Unset disables reclaim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_claim_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_base_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_max_secs: Option<u64>,
}

impl SchedulerSection {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// One entry under `[jobs]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, prefer::FromValue)]
pub struct JobSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cadence_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_timeout_secs: Option<u64>,
    /// API path the worker polls for this job, e.g. `/v2/faction/{id}/members`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    #[prefer(default)]
    pub path_params: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    #[prefer(default)]
    pub query_params: HashMap<String, String>,
}

/// `[api]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, prefer::FromValue)]
pub struct ApiSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[prefer(default)]
    pub invalid_key_codes: Option<Vec<i64>>,
}

impl ApiSection {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, prefer::FromValue)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename or URL.
    /// A plain filename is joined with data_dir; anything containing `://`
    /// is used as a database URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Rate limit backend: `memory`, `database` or a `redis://` URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_backend: Option<String>,
    #[serde(default, skip_serializing_if = "RateLimitSection::is_default")]
    #[prefer(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default, skip_serializing_if = "SchedulerSection::is_default")]
    #[prefer(default)]
    pub scheduler: SchedulerSection,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    #[prefer(default)]
    pub jobs: HashMap<String, JobSection>,
    #[serde(default, skip_serializing_if = "ApiSection::is_default")]
    #[prefer(default)]
    pub api: ApiSection,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[prefer(default)]
    pub api_keys: Vec<String>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    #[prefer(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer for discovery of `tornsync.*` files.
    /// Falls back to defaults when no file is found or it fails to parse.
    pub async fn load() -> Self {
        match prefer::load("tornsync").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("{}", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// The format follows the file extension: TOML, YAML, otherwise JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory of the config file, for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    /// `base_dir` is used to resolve relative paths.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            if database.contains("://") {
                if let Err(e) = validate_database_url(database) {
                    tracing::error!("Invalid database URL in config: {}", e);
                } else {
                    settings.database_url = Some(database.clone());
                }
            } else {
                settings.database_filename = database.clone();
            }
        }
        if let Some(ref backend) = self.rate_limit_backend {
            settings.rate_limit_backend = Some(backend.clone());
        }

        let rl = &self.rate_limit;
        if let Some(ms) = rl.window_ms {
            settings.rate_limit.window = Duration::from_millis(ms);
        }
        if let Some(max) = rl.max_requests {
            settings.rate_limit.max_requests = max;
        }
        if let Some(ms) = rl.safety_buffer_ms {
            settings.rate_limit.safety_buffer = Duration::from_millis(ms);
        }
        if let Some(checks) = rl.max_wait_checks {
            settings.rate_limit.max_wait_checks = checks;
        }

        let sched = &self.scheduler;
        if let Some(ms) = sched.poll_interval_ms {
            settings.scheduler.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(secs) = sched.stale_claim_secs {
            settings.scheduler.stale_claim = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = sched.backoff_base_secs {
            settings.scheduler.backoff_base = Duration::from_secs(secs);
        }
        if let Some(secs) = sched.backoff_max_secs {
            settings.scheduler.backoff_max = Duration::from_secs(secs);
        }

        for (name, section) in &self.jobs {
            let job = settings.jobs.entry(name.clone()).or_default();
            if let Some(secs) = section.cadence_seconds {
                job.cadence = Duration::from_secs(secs);
            }
            if let Some(enabled) = section.enabled {
                job.enabled = enabled;
            }
            if let Some(secs) = section.sync_timeout_secs {
                job.sync_timeout = Duration::from_secs(secs);
            }
            if section.path.is_some() {
                job.path = section.path.clone();
            }
            job.path_params.extend(section.path_params.clone());
            job.query_params.extend(section.query_params.clone());
        }

        if let Some(ref url) = self.api.base_url {
            settings.api_base_url = url.clone();
        }
        if let Some(timeout) = self.api.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(ref ua) = self.api.user_agent {
            settings.user_agent = ua.clone();
        }
        if let Some(ref codes) = self.api.invalid_key_codes {
            settings.invalid_key_codes = codes.clone();
        }

        if !self.api_keys.is_empty() {
            settings.api_keys = self.api_keys.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_settings() -> Settings {
        Settings::with_data_dir(PathBuf::from("/tmp/test"))
    }

    #[test]
    fn apply_database_filename_sets_database_filename() {
        let config = Config {
            database: Some("custom.db".to_string()),
            ..Config::default()
        };
        let mut settings = default_settings();
        config.apply_to_settings(&mut settings, Path::new("/tmp"));

        assert_eq!(settings.database_filename, "custom.db");
        assert!(settings.database_url.is_none());
        assert_eq!(settings.database_url(), "sqlite:/tmp/test/custom.db");
    }

    #[test]
    fn apply_sqlite_url_sets_database_url() {
        let config = Config {
            database: Some("sqlite:///tmp/torn.db".to_string()),
            ..Config::default()
        };
        let mut settings = default_settings();
        config.apply_to_settings(&mut settings, Path::new("/tmp"));

        assert_eq!(
            settings.database_url,
            Some("sqlite:///tmp/torn.db".to_string())
        );
        assert_eq!(settings.database_filename, DEFAULT_DATABASE_FILENAME);
    }

    #[test]
    fn apply_relative_data_dir_uses_base_dir() {
        let config = Config {
            data_dir: Some("data".to_string()),
            ..Config::default()
        };
        let mut settings = default_settings();
        config.apply_to_settings(&mut settings, Path::new("/srv/tornsync"));
        assert_eq!(settings.data_dir, PathBuf::from("/srv/tornsync/data"));
    }

    #[test]
    fn apply_sections() {
        let mut jobs = HashMap::new();
        jobs.insert(
            "faction_members".to_string(),
            JobSection {
                cadence_seconds: Some(300),
                enabled: Some(false),
                path: Some("/v2/faction/{id}/members".to_string()),
                ..JobSection::default()
            },
        );
        let config = Config {
            rate_limit: RateLimitSection {
                max_requests: Some(90),
                window_ms: Some(30_000),
                ..RateLimitSection::default()
            },
            scheduler: SchedulerSection {
                stale_claim_secs: Some(900),
                ..SchedulerSection::default()
            },
            jobs,
            api: ApiSection {
                invalid_key_codes: Some(vec![2]),
                ..ApiSection::default()
            },
            api_keys: vec!["a".to_string(), "b".to_string()],
            ..Config::default()
        };
        let mut settings = default_settings();
        config.apply_to_settings(&mut settings, Path::new("/tmp"));

        assert_eq!(settings.rate_limit.max_requests, 90);
        assert_eq!(settings.rate_limit.window, Duration::from_secs(30));
        assert_eq!(
            settings.rate_limit.safety_buffer,
            Duration::from_millis(100)
        );
        assert_eq!(settings.scheduler.stale_claim, Some(Duration::from_secs(900)));
        assert_eq!(settings.scheduler.poll_interval, Duration::from_secs(5));

        let job = &settings.jobs["faction_members"];
        assert_eq!(job.cadence, Duration::from_secs(300));
        assert!(!job.enabled);
        assert_eq!(job.path.as_deref(), Some("/v2/faction/{id}/members"));

        assert_eq!(settings.invalid_key_codes, vec![2]);
        assert_eq!(settings.api_keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tornsync.toml");
        std::fs::write(
            &path,
            r#"
database = "bot.db"
api_keys = ["key-one"]

[rate_limit]
max_requests = 20

[jobs.faction_members]
cadence_seconds = 120
path = "/v2/faction/{id}/members"

[jobs.faction_members.path_params]
id = "1234"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.database.as_deref(), Some("bot.db"));
        assert_eq!(config.rate_limit.max_requests, Some(20));
        assert_eq!(config.jobs["faction_members"].cadence_seconds, Some(120));
        assert_eq!(
            config.jobs["faction_members"].path_params["id"],
            "1234"
        );
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));
    }

    #[tokio::test]
    async fn load_from_yaml_and_json_files() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("tornsync.yaml");
        std::fs::write(&yaml, "api:\n  base_url: http://localhost:9000\n").unwrap();
        let config = Config::load_from_path(&yaml).await.unwrap();
        assert_eq!(config.api.base_url.as_deref(), Some("http://localhost:9000"));

        let json = dir.path().join("tornsync.json");
        std::fs::write(&json, r#"{"scheduler": {"poll_interval_ms": 250}}"#).unwrap();
        let config = Config::load_from_path(&json).await.unwrap();
        assert_eq!(config.scheduler.poll_interval_ms, Some(250));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{").unwrap();
        assert!(Config::load_from_path(&broken).await.is_err());
    }
}
