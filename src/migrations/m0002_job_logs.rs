use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0002_job_logs")
        .depends_on(&["0001_initial_schema"])
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE job_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_name TEXT NOT NULL,
    outcome TEXT NOT NULL,
    duration_ms INTEGER,
    message TEXT,
    host TEXT,
    created_at TEXT NOT NULL
)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE TABLE IF NOT EXISTS job_logs (
    id SERIAL PRIMARY KEY,
    job_name TEXT NOT NULL,
    outcome TEXT NOT NULL,
    duration_ms BIGINT,
    message TEXT,
    host TEXT,
    created_at TEXT NOT NULL
)"#,
                ),
        )
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    "CREATE INDEX idx_job_logs_job_time ON job_logs(job_name, created_at)",
                )
                .for_backend(
                    "postgres",
                    "CREATE INDEX idx_job_logs_job_time ON job_logs(job_name, created_at)",
                ),
        )
}
