//! SQLite implementation of ISpbCache
//!
//! Keeps the last fetched SPB list per scope so the list view can render
//! offline. Row order is preserved through a `position` column.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use spbsync_core::domain::{FetchScope, SpbDocument};
use spbsync_core::ports::ISpbCache;

/// SQLite-backed SPB document cache
#[derive(Clone)]
pub struct SqliteSpbCache {
    pool: SqlitePool,
}

impl SqliteSpbCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn spb_document_from_row(row: &SqliteRow) -> SpbDocument {
    SpbDocument {
        spb_number: row.get("spb_number"),
        vendor_code: row.get("vendor_code"),
        driver_name: row.get("driver_name"),
        vehicle_number: row.get("vehicle_number"),
        destination: row.get("destination"),
        status: row.get("status"),
        issued_at: row.get("issued_at"),
    }
}

#[async_trait::async_trait]
impl ISpbCache for SqliteSpbCache {
    async fn load(&self, scope: &FetchScope) -> anyhow::Result<Vec<SpbDocument>> {
        let rows = sqlx::query(
            "SELECT * FROM spb_documents WHERE scope_user = ? AND scope_vendor = ? \
             ORDER BY position ASC",
        )
        .bind(&scope.user_id)
        .bind(&scope.vendor_code)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(spb_document_from_row).collect())
    }

    async fn replace(&self, scope: &FetchScope, documents: &[SpbDocument]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM spb_documents WHERE scope_user = ? AND scope_vendor = ?")
            .bind(&scope.user_id)
            .bind(&scope.vendor_code)
            .execute(&mut *tx)
            .await?;

        for (position, doc) in documents.iter().enumerate() {
            sqlx::query(
                "INSERT OR REPLACE INTO spb_documents \
                 (scope_user, scope_vendor, spb_number, vendor_code, driver_name, \
                  vehicle_number, destination, status, issued_at, position) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&scope.user_id)
            .bind(&scope.vendor_code)
            .bind(&doc.spb_number)
            .bind(&doc.vendor_code)
            .bind(&doc.driver_name)
            .bind(&doc.vehicle_number)
            .bind(&doc.destination)
            .bind(&doc.status)
            .bind(doc.issued_at)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            user = %scope.user_id,
            vendor = %scope.vendor_code,
            count = documents.len(),
            "Replaced cached SPB documents"
        );
        Ok(())
    }
}
