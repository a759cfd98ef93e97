// crates/db/src/lib.rs
// SQLite persistence for verbal-assess session reconciliation.

pub mod migrator;
mod migrations;
mod queries;
pub mod store;

pub use migrator::MigrationReport;
pub use queries::items::OpenItemGroup;
pub use store::{SchemaVersion, Store};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backing store unavailable")]
    Unavailable,

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("Failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),
}

impl DbError {
    /// True for SQLITE_BUSY / SQLITE_LOCKED write contention, the one
    /// failure class the merge path retries.
    pub fn is_busy(&self) -> bool {
        match self {
            DbError::Sqlx(sqlx::Error::Database(e)) => {
                let msg = e.message();
                msg.contains("locked") || msg.contains("busy")
            }
            _ => false,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Main database handle wrapping a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn new(path: &Path) -> DbResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            db_path: path.to_owned(),
        };
        db.run_migrations().await?;

        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    ///
    /// Uses `shared_cache(true)` so all pool connections share the same
    /// in-memory database; without it each connection would get its own.
    /// `min_connections(1)` keeps at least one connection open at all
    /// times: SQLite destroys a shared-cache in-memory database the moment
    /// its open-connection count reaches zero.
    pub async fn new_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .shared_cache(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await?;
        let db = Self {
            pool,
            db_path: PathBuf::new(),
        };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Open the database at the default location:
    /// `~/.cache/verbal-assess/verbal-assess.db`
    pub async fn open_default() -> DbResult<Self> {
        let path = default_db_path()?;
        Self::new(&path).await
    }

    /// Run all inline migrations.
    ///
    /// Uses a `_migrations` table to track which migrations have already
    /// been applied, so non-idempotent statements only execute once.
    async fn run_migrations(&self) -> DbResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _migrations")
            .fetch_one(&self.pool)
            .await?;
        let current_version = row.0 as usize;

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = i + 1; // 1-based
            if version > current_version {
                sqlx::query(migration).execute(&self.pool).await?;
                sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
                    .bind(version as i64)
                    .execute(&self.pool)
                    .await?;
            }
        }

        Ok(())
    }

    /// Start a write transaction that takes the database lock up front.
    ///
    /// The locate→read→merge→write sequence must not interleave with another
    /// writer, or two racing submissions can both see "no open session" (or
    /// both read the same pre-merge result map). `BEGIN IMMEDIATE` acquires
    /// the write lock before the first read. The connection stays pooled;
    /// dropping the transaction without committing rolls it back.
    pub(crate) async fn begin_immediate(&self) -> DbResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get the path to the database file.
    /// Returns an empty path for in-memory databases.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

/// Returns the default database path: `~/.cache/verbal-assess/verbal-assess.db`
pub fn default_db_path() -> DbResult<PathBuf> {
    verbal_assess_core::paths::db_path().ok_or(DbError::NoCacheDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_database() {
        let db = Database::new_in_memory()
            .await
            .expect("should create in-memory database");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM assessments")
            .fetch_one(db.pool())
            .await
            .expect("assessments table should exist");
        assert_eq!(count.0, 0);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM assessment_items")
            .fetch_one(db.pool())
            .await
            .expect("assessment_items table should exist");
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let db = Database::new_in_memory()
            .await
            .expect("first open should succeed");

        db.run_migrations()
            .await
            .expect("second migration run should succeed");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM assessment_results")
            .fetch_one(db.pool())
            .await
            .expect("assessment_results table should still exist");
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_file_based_database() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        let db_path = tmp.path().join("test.db");

        let db = Database::new(&db_path)
            .await
            .expect("should create file-based database");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM assessments")
            .fetch_one(db.pool())
            .await
            .expect("assessments table should exist");
        assert_eq!(count.0, 0);

        assert!(db_path.exists(), "database file should be created on disk");
    }

    #[tokio::test]
    async fn test_schema_survives_write_transaction_churn() {
        // A shared-cache in-memory database is destroyed the moment its
        // open-connection count hits zero. Cycling more write transactions
        // than the pool holds must leave the schema (and rows) intact.
        let db = Database::new_in_memory()
            .await
            .expect("should create in-memory database");

        for i in 0..10 {
            let mut tx = db.begin_immediate().await.expect("begin should succeed");
            sqlx::query(
                "INSERT INTO assessments (id, user_id, created_at, last_updated) \
                 VALUES (?1, 'u1', ?2, ?2)",
            )
            .bind(format!("s{i}"))
            .bind(i as i64)
            .execute(&mut *tx)
            .await
            .expect("insert should succeed");
            tx.commit().await.expect("commit should succeed");
        }

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM assessments")
            .fetch_one(db.pool())
            .await
            .expect("table should still exist after transaction churn");
        assert_eq!(count.0, 10);
    }

    #[tokio::test]
    async fn test_default_db_path() {
        let path = default_db_path().expect("should resolve default path");
        assert!(path.to_string_lossy().contains("verbal-assess"));
        assert!(path.to_string_lossy().ends_with("verbal-assess.db"));
    }
}
