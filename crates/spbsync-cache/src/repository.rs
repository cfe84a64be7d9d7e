//! SQLite implementation of IFormRepository
//!
//! This module provides the concrete SQLite-based implementation of the
//! form repository port defined in spbsync-core.
//!
//! ## Type Mapping
//!
//! | Domain Type   | SQL Type | Strategy |
//! |---------------|----------|----------|
//! | RecordKey     | TEXT     | `.as_str()` / `RecordKey::new()` |
//! | FormStatus    | TEXT     | `.as_code()` / `FromStr` |
//! | bool          | INTEGER  | 0 / 1 |
//! | epoch seconds | INTEGER  | stored as-is |
//! | retry_count   | INTEGER  | `u32`, clamped at 0 on read |

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use spbsync_core::domain::{
    FormDraft, FormRecord, FormRecordParts, FormStatus, RecordKey, SyncStats,
};
use spbsync_core::ports::IFormRepository;

use crate::CacheError;

/// SQLite-based implementation of the form repository port
#[derive(Clone)]
pub struct SqliteFormRepository {
    pool: SqlitePool,
}

impl SqliteFormRepository {
    /// Creates a new repository instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Row mapping
// ============================================================================

/// Reconstruct a FormRecord from a `form_records` row
fn form_record_from_row(row: &SqliteRow) -> Result<FormRecord, CacheError> {
    let key_str: String = row.get("record_key");
    let status_str: String = row.get("status");

    let record_key = RecordKey::new(key_str).map_err(|e| {
        CacheError::SerializationError(format!("Invalid record key in row: {}", e))
    })?;
    let status: FormStatus = status_str.parse().map_err(|e| {
        CacheError::SerializationError(format!("Invalid status for {}: {}", record_key, e))
    })?;
    let retry_count: i64 = row.get("retry_count");

    Ok(FormRecord::from_parts(FormRecordParts {
        record_key,
        status,
        created_by: row.get("created_by"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        reason: row.get("reason"),
        resource_changed: row.get::<i64, _>("resource_changed") != 0,
        timestamp: row.get("timestamp"),
        is_synced: row.get::<i64, _>("is_synced") != 0,
        retry_count: u32::try_from(retry_count.max(0)).unwrap_or(u32::MAX),
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }))
}

fn rows_to_records(rows: &[SqliteRow]) -> Result<Vec<FormRecord>, CacheError> {
    rows.iter().map(form_record_from_row).collect()
}

async fn fetch_record(
    conn: &mut SqliteConnection,
    key: &str,
) -> Result<Option<FormRecord>, CacheError> {
    let row = sqlx::query("SELECT * FROM form_records WHERE record_key = ?")
        .bind(key)
        .fetch_optional(conn)
        .await?;
    row.as_ref().map(form_record_from_row).transpose()
}

impl SqliteFormRepository {
    /// Runs a `SELECT COUNT(*)` with an optional WHERE clause
    async fn count_where(&self, clause: &str, max_retry_attempts: Option<u32>) -> anyhow::Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM form_records {clause}");
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(max) = max_retry_attempts {
            query = query.bind(i64::from(max));
        }
        let count = query.fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }
}

// ============================================================================
// IFormRepository implementation
// ============================================================================

#[async_trait::async_trait]
impl IFormRepository for SqliteFormRepository {
    async fn ensure_schema(&self) -> anyhow::Result<()> {
        crate::pool::run_migrations(&self.pool).await?;
        Ok(())
    }

    // --- Writes ---

    async fn save_draft(&self, draft: FormDraft, now: i64) -> anyhow::Result<FormRecord> {
        let explicit_timestamp = draft.timestamp();
        let fresh = FormRecord::from_draft(draft, now);
        let key = fresh.record_key().as_str().to_string();

        // The write comes first so the transaction holds the write lock for
        // the read that follows.
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO form_records \
             (record_key, status, created_by, latitude, longitude, reason, \
              resource_changed, timestamp, is_synced, retry_count, last_error, \
              created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0, NULL, ?, ?) \
             ON CONFLICT(record_key) DO UPDATE SET \
              status = excluded.status, \
              created_by = excluded.created_by, \
              latitude = excluded.latitude, \
              longitude = excluded.longitude, \
              reason = excluded.reason, \
              resource_changed = excluded.resource_changed, \
              timestamp = COALESCE(?, form_records.timestamp), \
              is_synced = 0, \
              updated_at = excluded.updated_at",
        )
        .bind(&key)
        .bind(fresh.status().as_code())
        .bind(fresh.created_by())
        .bind(fresh.latitude())
        .bind(fresh.longitude())
        .bind(fresh.reason())
        .bind(i64::from(fresh.resource_changed()))
        .bind(fresh.timestamp())
        .bind(fresh.created_at())
        .bind(fresh.updated_at())
        .bind(explicit_timestamp)
        .execute(&mut *tx)
        .await?;

        let saved = fetch_record(&mut tx, &key)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Record {} vanished after save", key))?;
        tx.commit().await?;

        tracing::trace!(record_key = %key, retry_count = saved.retry_count(), "Saved form draft");
        Ok(saved)
    }

    async fn insert_if_absent(&self, record: &FormRecord) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO form_records \
             (record_key, status, created_by, latitude, longitude, reason, \
              resource_changed, timestamp, is_synced, retry_count, last_error, \
              created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(record_key) DO NOTHING",
        )
        .bind(record.record_key().as_str())
        .bind(record.status().as_code())
        .bind(record.created_by())
        .bind(record.latitude())
        .bind(record.longitude())
        .bind(record.reason())
        .bind(i64::from(record.resource_changed()))
        .bind(record.timestamp())
        .bind(i64::from(record.is_synced()))
        .bind(i64::from(record.retry_count()))
        .bind(record.last_error())
        .bind(record.created_at())
        .bind(record.updated_at())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        tracing::trace!(record_key = %record.record_key(), inserted, "Inserted form record");
        Ok(inserted)
    }

    async fn mark_synced(&self, key: &RecordKey, now: i64) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE form_records \
             SET is_synced = 1, retry_count = 0, last_error = NULL, updated_at = ? \
             WHERE record_key = ?",
        )
        .bind(now)
        .bind(key.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_failure(
        &self,
        key: &RecordKey,
        message: &str,
        now: i64,
    ) -> anyhow::Result<Option<u32>> {
        let count: Option<i64> = sqlx::query_scalar(
            "UPDATE form_records \
             SET retry_count = retry_count + 1, last_error = ?, updated_at = ? \
             WHERE record_key = ? \
             RETURNING retry_count",
        )
        .bind(message)
        .bind(now)
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.map(|c| u32::try_from(c.max(0)).unwrap_or(u32::MAX)))
    }

    async fn mark_exhausted(
        &self,
        key: &RecordKey,
        message: &str,
        max_retry_attempts: u32,
        now: i64,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE form_records \
             SET retry_count = MAX(retry_count, ?), last_error = ?, updated_at = ? \
             WHERE record_key = ?",
        )
        .bind(i64::from(max_retry_attempts))
        .bind(message)
        .bind(now)
        .bind(key.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reset_retry(&self, key: &RecordKey, now: i64) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE form_records SET retry_count = 0, last_error = NULL, updated_at = ? \
             WHERE record_key = ?",
        )
        .bind(now)
        .bind(key.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reset_all_failed(&self, max_retry_attempts: u32, now: i64) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE form_records SET retry_count = 0, last_error = NULL, updated_at = ? \
             WHERE is_synced = 0 AND retry_count >= ?",
        )
        .bind(now)
        .bind(i64::from(max_retry_attempts))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_all(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM form_records")
            .execute(&self.pool)
            .await?;
        tracing::debug!(deleted = result.rows_affected(), "Cleared form records");
        Ok(result.rows_affected())
    }

    // --- Reads ---

    async fn get(&self, key: &RecordKey) -> anyhow::Result<Option<FormRecord>> {
        let mut conn = self.pool.acquire().await?;
        Ok(fetch_record(&mut conn, key.as_str()).await?)
    }

    async fn list_all(&self) -> anyhow::Result<Vec<FormRecord>> {
        let rows = sqlx::query("SELECT * FROM form_records ORDER BY created_at ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows_to_records(&rows)?)
    }

    async fn query_pending(&self, max_retry_attempts: u32) -> anyhow::Result<Vec<FormRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM form_records WHERE is_synced = 0 AND retry_count < ? \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(i64::from(max_retry_attempts))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows_to_records(&rows)?)
    }

    async fn query_failed(&self, max_retry_attempts: u32) -> anyhow::Result<Vec<FormRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM form_records WHERE is_synced = 0 AND retry_count >= ? \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(i64::from(max_retry_attempts))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows_to_records(&rows)?)
    }

    async fn stats(&self, max_retry_attempts: u32) -> anyhow::Result<SyncStats> {
        let total = self.count_where("", None).await?;
        let synced = self.count_where("WHERE is_synced = 1", None).await?;
        let pending = self
            .count_where(
                "WHERE is_synced = 0 AND retry_count < ?",
                Some(max_retry_attempts),
            )
            .await?;
        let failed = self
            .count_where(
                "WHERE is_synced = 0 AND retry_count >= ?",
                Some(max_retry_attempts),
            )
            .await?;

        Ok(SyncStats::new(total, synced, pending, failed))
    }

    async fn count(&self) -> anyhow::Result<u64> {
        self.count_where("", None).await
    }
}
