//! SPB Sync Cache - Local state persistence
//!
//! Storage adapters for:
//! - Form records in SQLite (current generation)
//! - Form records in a flat key-value store (legacy generation)
//! - The locally cached SPB document list
//! - A JSON-file key-value store
//!
//! ## Architecture
//!
//! This crate implements the `IFormRepository`, `IKeyValueStore` and
//! `ISpbCache` ports from `spbsync-core`. It is a driven (secondary)
//! adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with versioned migrations
//! - [`SqliteFormRepository`] - `IFormRepository` over SQLite
//! - [`KvFormRepository`] - `IFormRepository` over any `IKeyValueStore`
//! - [`SqliteSpbCache`] - `ISpbCache` over SQLite
//! - [`JsonKvStore`] - `IKeyValueStore`, in memory or backed by a JSON file
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use spbsync_cache::{DatabasePool, SqliteFormRepository};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/spbsync/forms.db")).await?;
//! let repo = SqliteFormRepository::new(pool.pool().clone());
//! // Use repo as IFormRepository...
//! # Ok(())
//! # }
//! ```

pub mod kv;
pub mod legacy;
pub mod pool;
pub mod repository;
pub mod spb_cache;

pub use kv::JsonKvStore;
pub use legacy::KvFormRepository;
pub use pool::DatabasePool;
pub use repository::SqliteFormRepository;
pub use spb_cache::SqliteSpbCache;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Reading or writing a store file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
