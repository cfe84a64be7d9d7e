//! Database connection pool management
//!
//! Provides a wrapper around SQLx's SqlitePool with:
//! - Automatic directory creation for database files
//! - WAL journal mode for concurrent reads
//! - Versioned schema migrations tracked by `PRAGMA user_version`
//! - In-memory mode for testing

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::CacheError;

/// Ordered schema migrations; the index + 1 is the schema version
const MIGRATIONS: &[(&str, &str)] = &[
    ("form_records", include_str!("migrations/001_form_records.sql")),
    ("sync_metadata", include_str!("migrations/002_sync_metadata.sql")),
    ("spb_documents", include_str!("migrations/003_spb_documents.sql")),
];

/// Latest schema version known to this build
pub const SCHEMA_VERSION: i64 = MIGRATIONS.len() as i64;

/// Manages a pool of SQLite connections for form record persistence
///
/// The pool is configured with:
/// - WAL journal mode for concurrent read access
/// - 5 max connections for file-based databases
/// - 1 connection for in-memory databases (required for data persistence)
/// - 5-second busy timeout to handle write contention
#[derive(Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Creates a new database pool connected to the specified file
    ///
    /// This will:
    /// 1. Create parent directories if they don't exist
    /// 2. Create the database file if it doesn't exist
    /// 3. Enable WAL journal mode
    /// 4. Run pending schema migrations
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the connection cannot be established,
    /// or `CacheError::MigrationFailed` if schema migrations fail.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to connect to database at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        run_migrations(&pool).await?;

        tracing::info!(
            path = %db_path.display(),
            schema_version = SCHEMA_VERSION,
            "Database pool initialized"
        );

        Ok(Self { pool })
    }

    /// Creates an in-memory database pool for testing
    ///
    /// Uses a single connection to ensure data persistence across queries
    /// (SQLite in-memory databases are per-connection).
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = Self::in_memory_unmigrated().await?;
        run_migrations(&pool.pool).await?;

        tracing::debug!("In-memory database pool initialized");

        Ok(pool)
    }

    /// Creates an in-memory pool without applying any migration
    ///
    /// Lets callers exercise the migration path explicitly.
    pub async fn in_memory_unmigrated() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Failed to create in-memory database: {}", e))
            })?;

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Current schema version of the database
    pub async fn schema_version(&self) -> Result<i64, CacheError> {
        schema_version(&self.pool).await
    }
}

async fn schema_version(pool: &SqlitePool) -> Result<i64, CacheError> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;
    Ok(version)
}

/// Applies every migration newer than the stored schema version
///
/// Each step runs in its own transaction together with the version bump,
/// so a failed step leaves the database at the previous version. Steps run
/// statement by statement through prepared queries so the returned future
/// stays `Send` inside `async_trait` repository methods.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), CacheError> {
    let current = schema_version(pool).await?;

    for (index, (name, sql)) in MIGRATIONS.iter().enumerate() {
        let version = index as i64 + 1;
        if version <= current {
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in split_statements(sql) {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    CacheError::MigrationFailed(format!("Migration {version} ({name}) failed: {e}"))
                })?;
        }
        // PRAGMA does not accept bound parameters
        let bump = format!("PRAGMA user_version = {version}");
        sqlx::query(&bump).execute(&mut *tx).await.map_err(|e| {
            CacheError::MigrationFailed(format!("Failed to record schema version {version}: {e}"))
        })?;
        tx.commit().await?;

        tracing::debug!(version, name, "Applied schema migration");
    }

    Ok(())
}

/// Splits a migration script into its statements, dropping `--` comment
/// lines and empty chunks
///
/// The scripts contain no string literals with `;`.
fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(|chunk| {
            chunk
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .map(|statement| statement.trim().to_string())
        .filter(|statement| !statement.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_is_fully_migrated() {
        let pool = DatabasePool::in_memory().await.unwrap();
        assert_eq!(pool.schema_version().await.unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = DatabasePool::in_memory().await.unwrap();
        run_migrations(pool.pool()).await.unwrap();
        run_migrations(pool.pool()).await.unwrap();
        assert_eq!(pool.schema_version().await.unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_split_statements_drops_comments_and_blanks() {
        let statements = split_statements(
            "-- header\nCREATE TABLE t (a INTEGER);\n\n-- index\nCREATE INDEX i ON t(a);\n",
        );
        assert_eq!(
            statements,
            vec!["CREATE TABLE t (a INTEGER)", "CREATE INDEX i ON t(a)"]
        );
    }

    #[test]
    fn test_every_migration_splits_into_statements() {
        let counts: Vec<usize> = MIGRATIONS
            .iter()
            .map(|(_, sql)| split_statements(sql).len())
            .collect();
        assert_eq!(counts, vec![5, 5, 1]);
    }

    /// `ensure_schema` runs inside `async_trait` futures, which must be `Send`
    #[tokio::test]
    async fn test_run_migrations_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let pool = SqlitePoolOptions::new().connect_lazy("sqlite::memory:").unwrap();
        let future = run_migrations(&pool);
        assert_send(&future);
    }

    #[tokio::test]
    async fn test_alter_step_backfills_updated_at() {
        let pool = DatabasePool::in_memory_unmigrated().await.unwrap();
        for statement in split_statements(MIGRATIONS[0].1) {
            sqlx::query(&statement).execute(pool.pool()).await.unwrap();
        }
        sqlx::query("PRAGMA user_version = 1")
            .execute(pool.pool())
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO form_records \
             (record_key, status, created_by, latitude, longitude, timestamp, created_at) \
             VALUES ('SPB-OLD', 'ACCEPTED', 'u1', '1', '2', 100, 100)",
        )
        .execute(pool.pool())
        .await
        .unwrap();

        run_migrations(pool.pool()).await.unwrap();

        let (retry, updated): (i64, i64) = sqlx::query_as(
            "SELECT retry_count, updated_at FROM form_records WHERE record_key = 'SPB-OLD'",
        )
        .fetch_one(pool.pool())
        .await
        .unwrap();
        assert_eq!(retry, 0);
        assert_eq!(updated, 100);
        assert_eq!(pool.schema_version().await.unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("forms.db");
        let pool = DatabasePool::new(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(pool.schema_version().await.unwrap(), SCHEMA_VERSION);
    }
}
