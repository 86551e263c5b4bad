//! Connections for the scheduler and rate-limit tables.
//!
//! SQLite (a file shared by every worker on the host) or PostgreSQL
//! (shared by workers anywhere), picked from the database URL.

use std::path::Path;

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};

#[cfg(feature = "postgres")]
use diesel_async::pooled_connection::deadpool::Pool as DeadPool;
#[cfg(feature = "postgres")]
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
#[cfg(feature = "postgres")]
use diesel_async::AsyncPgConnection;

use super::util::to_diesel_error;

pub type DieselError = diesel::result::Error;

pub type SqliteConn = SyncConnectionWrapper<SqliteConnection>;

#[cfg(feature = "postgres")]
pub type PgConn = deadpool::managed::Object<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// How long a SQLite connection waits on another worker's write lock.
const SQLITE_BUSY_TIMEOUT_MS: u32 = 5000;

/// Upper bound on pooled PostgreSQL connections per process.
#[cfg(feature = "postgres")]
const PG_MAX_CONNECTIONS: usize = 10;

/// Opens a fresh SQLite connection per operation. Claims are short
/// conditional updates, so queueing on the file lock is cheap.
#[derive(Clone)]
pub struct SqlitePool {
    path: String,
}

impl SqlitePool {
    pub fn new(database_url: &str) -> Self {
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
        Self {
            path: path.to_string(),
        }
    }

    pub async fn get(&self) -> Result<SqliteConn, DieselError> {
        let mut conn = SqliteConn::establish(&self.path)
            .await
            .map_err(to_diesel_error)?;
        // Concurrent claimers queue on the write lock instead of SQLITE_BUSY
        conn.batch_execute(&format!("PRAGMA busy_timeout = {};", SQLITE_BUSY_TIMEOUT_MS))
            .await?;
        Ok(conn)
    }
}

#[cfg(feature = "postgres")]
#[derive(Clone)]
pub struct PgPool {
    pool: DeadPool<AsyncPgConnection>,
}

#[cfg(feature = "postgres")]
impl PgPool {
    pub fn new(database_url: &str) -> Result<Self, DieselError> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = DeadPool::builder(manager)
            .max_size(PG_MAX_CONNECTIONS)
            .build()
            .map_err(to_diesel_error)?;
        Ok(Self { pool })
    }

    pub async fn get(&self) -> Result<PgConn, DieselError> {
        self.pool.get().await.map_err(to_diesel_error)
    }
}

#[derive(Clone)]
pub enum DbPool {
    Sqlite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

impl DbPool {
    /// `postgres://` and `postgresql://` URLs go to PostgreSQL, anything
    /// else is treated as a SQLite path.
    pub fn from_url(url: &str) -> Result<Self, DieselError> {
        #[cfg(feature = "postgres")]
        if super::util::is_postgres_url(url) {
            return Ok(DbPool::Postgres(PgPool::new(url)?));
        }

        super::util::validate_database_url(url).map_err(to_diesel_error)?;
        Ok(DbPool::Sqlite(SqlitePool::new(url)))
    }

    pub fn sqlite_from_path(path: &Path) -> Self {
        DbPool::Sqlite(SqlitePool::new(&path.display().to_string()))
    }

    pub fn is_sqlite(&self) -> bool {
        matches!(self, DbPool::Sqlite(_))
    }
}

/// Run the same Diesel DSL body against whichever backend the pool holds.
///
/// ```ignore
/// with_conn!(self.pool, conn => {
///     job_schedules::table.load::<JobScheduleRecord>(&mut conn).await
/// })
/// ```
#[macro_export]
macro_rules! with_conn {
    ($pool:expr, $conn:ident => $body:expr) => {{
        match &$pool {
            $crate::repository::pool::DbPool::Sqlite(pool) => {
                let mut $conn = pool.get().await?;
                $body
            }
            #[cfg(feature = "postgres")]
            $crate::repository::pool::DbPool::Postgres(pool) => {
                let mut $conn = pool.get().await?;
                $body
            }
        }
    }};
}

/// Like [`with_conn!`] but with a separate body per backend, for statements
/// whose syntax differs between SQLite and PostgreSQL.
#[macro_export]
macro_rules! with_conn_split {
    ($pool:expr, sqlite: $sqlite_conn:ident => $sqlite_body:expr, postgres: $pg_conn:ident => $pg_body:expr) => {{
        match &$pool {
            $crate::repository::pool::DbPool::Sqlite(pool) => {
                let mut $sqlite_conn = pool.get().await?;
                $sqlite_body
            }
            #[cfg(feature = "postgres")]
            $crate::repository::pool::DbPool::Postgres(pool) => {
                let mut $pg_conn = pool.get().await?;
                $pg_body
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::sql_types::BigInt;
    use diesel::QueryableByName;
    use diesel_async::RunQueryDsl;

    #[derive(QueryableByName)]
    struct BusyTimeout {
        #[diesel(sql_type = BigInt)]
        timeout: i64,
    }

    #[test]
    fn test_pool_detection() {
        assert!(DbPool::from_url("/path/to/tornsync.db").unwrap().is_sqlite());
        assert!(DbPool::from_url("sqlite:/path/to/db").unwrap().is_sqlite());

        #[cfg(feature = "postgres")]
        assert!(!DbPool::from_url("postgres://localhost/torn")
            .unwrap()
            .is_sqlite());
        #[cfg(not(feature = "postgres"))]
        assert!(DbPool::from_url("postgres://localhost/torn").is_err());
    }

    #[tokio::test]
    async fn test_sqlite_connections_wait_on_locks() {
        let dir = tempfile::tempdir().unwrap();
        let pool = SqlitePool::new(&format!("sqlite:{}", dir.path().join("t.db").display()));

        let mut conn = pool.get().await.unwrap();
        let row: BusyTimeout = diesel::sql_query("PRAGMA busy_timeout")
            .get_result(&mut conn)
            .await
            .unwrap();
        assert_eq!(row.timeout, SQLITE_BUSY_TIMEOUT_MS as i64);
    }
}
