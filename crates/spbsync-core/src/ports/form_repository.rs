//! Form repository port (driven/secondary port)
//!
//! This module defines the interface for persisting and querying form
//! records. Two storage generations implement it: the relational store
//! (current) and the flat key-value layout (legacy).
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, key-value file) and don't need domain-level classification.
//! - Every mutating operation takes `now` (epoch seconds) so the caller
//!   controls timestamps.
//! - The engine and the migration service are the only writers.

use crate::domain::{FormDraft, FormRecord, RecordKey, SyncStats};

/// Port trait for durable form record storage
///
/// ## Implementation Notes
///
/// - `save_draft` must be atomic: read the existing record (if any), apply
///   the draft, write it back. Concurrent saves of the same key must not
///   lose the retry counter.
/// - Queue queries return records ordered by `created_at`, oldest first.
/// - `retry_count` is only ever decreased by `mark_synced`, `reset_retry`
///   and `reset_all_failed`.
#[async_trait::async_trait]
pub trait IFormRepository: Send + Sync {
    /// Creates the backing schema if it does not exist yet
    ///
    /// Idempotent; safe to call on every startup.
    async fn ensure_schema(&self) -> anyhow::Result<()>;

    // --- Writes ---

    /// Persists a validated draft
    ///
    /// A new record starts unsynced with `retry_count = 0`. An existing
    /// record keeps its `retry_count`, `last_error` and `created_at` and
    /// becomes unsynced again.
    async fn save_draft(&self, draft: FormDraft, now: i64) -> anyhow::Result<FormRecord>;

    /// Inserts a full record unless its key is already stored
    ///
    /// Used by the migration service; all columns are written as given.
    /// An existing row is left untouched so engine writes made since the
    /// first copy survive a re-run. Returns `true` if the record was
    /// inserted.
    async fn insert_if_absent(&self, record: &FormRecord) -> anyhow::Result<bool>;

    /// Marks a record synced, resetting `retry_count` and `last_error`
    ///
    /// Returns `false` if the record does not exist.
    async fn mark_synced(&self, key: &RecordKey, now: i64) -> anyhow::Result<bool>;

    /// Increments `retry_count` and stores `message` as `last_error`
    ///
    /// Returns the new retry count, or `None` if the record does not exist.
    async fn record_failure(
        &self,
        key: &RecordKey,
        message: &str,
        now: i64,
    ) -> anyhow::Result<Option<u32>>;

    /// Stores `message` as `last_error` and raises `retry_count` to at
    /// least `max_retry_attempts`, moving the record to the failed set
    ///
    /// Returns `false` if the record does not exist.
    async fn mark_exhausted(
        &self,
        key: &RecordKey,
        message: &str,
        max_retry_attempts: u32,
        now: i64,
    ) -> anyhow::Result<bool>;

    /// Resets `retry_count` to 0 and clears `last_error`
    ///
    /// Returns `false` if the record does not exist.
    async fn reset_retry(&self, key: &RecordKey, now: i64) -> anyhow::Result<bool>;

    /// Resets every unsynced record whose budget is exhausted
    ///
    /// Returns the number of records reset.
    async fn reset_all_failed(&self, max_retry_attempts: u32, now: i64) -> anyhow::Result<u64>;

    /// Deletes every record; returns the number deleted
    async fn delete_all(&self) -> anyhow::Result<u64>;

    // --- Reads ---

    /// Retrieves a record by its key
    async fn get(&self, key: &RecordKey) -> anyhow::Result<Option<FormRecord>>;

    /// Retrieves every record, oldest first
    async fn list_all(&self) -> anyhow::Result<Vec<FormRecord>>;

    /// Unsynced records still under the retry budget, oldest first
    async fn query_pending(&self, max_retry_attempts: u32) -> anyhow::Result<Vec<FormRecord>>;

    /// Unsynced records whose retry budget is exhausted, oldest first
    async fn query_failed(&self, max_retry_attempts: u32) -> anyhow::Result<Vec<FormRecord>>;

    /// Aggregated queue statistics
    async fn stats(&self, max_retry_attempts: u32) -> anyhow::Result<SyncStats>;

    /// Total number of records
    async fn count(&self) -> anyhow::Result<u64>;
}
