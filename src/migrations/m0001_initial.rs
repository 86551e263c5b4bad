use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0001_initial_schema")
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE job_schedules (
    job_name TEXT PRIMARY KEY NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    force_run INTEGER NOT NULL DEFAULT 0,
    cadence_seconds INTEGER NOT NULL,
    next_run_at TEXT NOT NULL,
    last_run_at TEXT,
    status TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    backoff_until TEXT,
    locked_at TEXT,
    error_message TEXT,
    updated_at TEXT NOT NULL
)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE TABLE IF NOT EXISTS job_schedules (
    job_name TEXT PRIMARY KEY NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    force_run INTEGER NOT NULL DEFAULT 0,
    cadence_seconds BIGINT NOT NULL,
    next_run_at TEXT NOT NULL,
    last_run_at TEXT,
    status TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    backoff_until TEXT,
    locked_at TEXT,
    error_message TEXT,
    updated_at TEXT NOT NULL
)"#,
                ),
        )
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE rate_limit_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key_hash TEXT NOT NULL,
    requested_at TEXT NOT NULL
)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE TABLE IF NOT EXISTS rate_limit_requests (
    id SERIAL PRIMARY KEY,
    key_hash TEXT NOT NULL,
    requested_at TEXT NOT NULL
)"#,
                ),
        )
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    "CREATE INDEX idx_rate_limit_key_time ON rate_limit_requests(key_hash, requested_at)",
                )
                .for_backend(
                    "postgres",
                    "CREATE INDEX idx_rate_limit_key_time ON rate_limit_requests(key_hash, requested_at)",
                ),
        )
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    "CREATE INDEX idx_rate_limit_time ON rate_limit_requests(requested_at)",
                )
                .for_backend(
                    "postgres",
                    "CREATE INDEX idx_rate_limit_time ON rate_limit_requests(requested_at)",
                ),
        )
}
