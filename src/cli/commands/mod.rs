//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod helpers;
mod init;
mod jobs;
mod keys;
mod worker;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use tornsync::config::{load_settings_with_options, LoadOptions};

/// Backend type for rate limiting storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RateLimitBackendType {
    /// In-memory (single process, not persisted)
    Memory,
    /// Database via Diesel (SQLite or PostgreSQL, persisted, multi-process)
    #[default]
    Database,
    /// Redis (distributed, requires redis-backend feature)
    #[cfg(feature = "redis-backend")]
    Redis,
}

#[derive(Parser)]
#[command(name = "tornsync")]
#[command(about = "Rate-limited Torn API polling with a distributed job scheduler")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Register configured jobs and run the scheduler until Ctrl-C
    Worker {
        /// Rate limit backend (default: from config, else database)
        #[arg(long, value_enum)]
        rate_limit_backend: Option<RateLimitBackendType>,
    },

    /// Inspect and control job schedules
    Jobs {
        #[command(subcommand)]
        command: JobsCommands,
    },

    /// Inspect API key usage
    Keys {
        #[command(subcommand)]
        command: KeysCommands,
    },
}

#[derive(Subcommand)]
enum JobsCommands {
    /// List all job schedules
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a job on the next poll regardless of its schedule
    Trigger { name: String },
    /// Enable a job
    Enable { name: String },
    /// Disable a job
    Disable { name: String },
    /// Clear a stuck claim and any failure backoff
    Reset { name: String },
    /// Show recent runs of a job
    History {
        name: String,
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// Delete job log entries older than N days
    PruneLogs {
        #[arg(long)]
        older_than_days: u32,
    },
    /// Run a configured job once in this process, bypassing the schedule
    Run { name: String },
}

#[derive(Subcommand)]
enum KeysCommands {
    /// Show requests used and remaining per key in the current window
    Capacity {
        /// Rate limit backend (default: from config, else database)
        #[arg(long, value_enum)]
        rate_limit_backend: Option<RateLimitBackendType>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete rate limit records outside the window
    Purge {
        #[arg(long, value_enum)]
        rate_limit_backend: Option<RateLimitBackendType>,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
    };
    let (settings, _config) = load_settings_with_options(options)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Worker { rate_limit_backend } => {
            worker::cmd_worker(&settings, rate_limit_backend).await
        }
        Commands::Jobs { command } => match command {
            JobsCommands::List { json } => jobs::cmd_jobs_list(&settings, json).await,
            JobsCommands::Trigger { name } => jobs::cmd_jobs_trigger(&settings, &name).await,
            JobsCommands::Enable { name } => {
                jobs::cmd_jobs_set_enabled(&settings, &name, true).await
            }
            JobsCommands::Disable { name } => {
                jobs::cmd_jobs_set_enabled(&settings, &name, false).await
            }
            JobsCommands::Reset { name } => jobs::cmd_jobs_reset(&settings, &name).await,
            JobsCommands::History { name, limit } => {
                jobs::cmd_jobs_history(&settings, &name, limit).await
            }
            JobsCommands::PruneLogs { older_than_days } => {
                jobs::cmd_jobs_prune_logs(&settings, older_than_days).await
            }
            JobsCommands::Run { name } => worker::cmd_run_once(&settings, &name).await,
        },
        Commands::Keys { command } => match command {
            KeysCommands::Capacity {
                rate_limit_backend,
                json,
            } => keys::cmd_keys_capacity(&settings, rate_limit_backend, json).await,
            KeysCommands::Purge { rate_limit_backend } => {
                keys::cmd_keys_purge(&settings, rate_limit_backend).await
            }
        },
    }
}
