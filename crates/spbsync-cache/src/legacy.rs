//! Key-value implementation of IFormRepository (legacy generation)
//!
//! Stores each form record in the first-generation layout (a JSON payload
//! plus sibling keys, see `spbsync_core::domain::legacy`) on top of any
//! [`IKeyValueStore`]. The store has no transactions, so every
//! read-modify-write runs under one async mutex.

use std::sync::Arc;

use tokio::sync::Mutex;

use spbsync_core::domain::{FormDraft, FormRecord, LegacyEntry, RecordKey, SyncStats};
use spbsync_core::ports::legacy_layout;
use spbsync_core::ports::{IFormRepository, IKeyValueStore};

/// Form repository over the legacy key-value layout
pub struct KvFormRepository {
    store: Arc<dyn IKeyValueStore>,
    write_lock: Mutex<()>,
}

impl KvFormRepository {
    pub fn new(store: Arc<dyn IKeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Loads a record, skipping entries that cannot be decoded
    async fn load(&self, key: &RecordKey) -> anyhow::Result<Option<FormRecord>> {
        match legacy_layout::read_entry(self.store.as_ref(), key).await? {
            None => Ok(None),
            Some(Ok(entry)) => match entry.into_record(spbsync_core::domain::epoch_now()) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    tracing::warn!(record_key = %key, error = %e, "Skipping undecodable legacy record");
                    Ok(None)
                }
            },
            Some(Err(e)) => {
                tracing::warn!(record_key = %key, error = %e, "Skipping malformed legacy record");
                Ok(None)
            }
        }
    }

    async fn write(&self, record: &FormRecord) -> anyhow::Result<()> {
        legacy_layout::write_entry(self.store.as_ref(), &LegacyEntry::from_record(record)).await
    }

    /// Every decodable record, oldest first
    async fn load_all(&self) -> anyhow::Result<Vec<FormRecord>> {
        let mut records = Vec::new();
        for key in legacy_layout::scan_record_keys(self.store.as_ref()).await? {
            let Ok(key) = key else { continue };
            if let Some(record) = self.load(&key).await? {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.created_at());
        Ok(records)
    }

    /// Applies `f` to an existing record and writes it back
    async fn update<R: Send>(
        &self,
        key: &RecordKey,
        f: impl FnOnce(&mut FormRecord) -> R + Send,
    ) -> anyhow::Result<Option<R>> {
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = self.load(key).await? else {
            return Ok(None);
        };
        let result = f(&mut record);
        self.write(&record).await?;
        Ok(Some(result))
    }
}

#[async_trait::async_trait]
impl IFormRepository for KvFormRepository {
    async fn ensure_schema(&self) -> anyhow::Result<()> {
        Ok(())
    }

    // --- Writes ---

    async fn save_draft(&self, draft: FormDraft, now: i64) -> anyhow::Result<FormRecord> {
        let _guard = self.write_lock.lock().await;
        let record = match self.load(draft.record_key()).await? {
            Some(mut existing) => {
                existing.apply_draft(draft, now);
                existing
            }
            None => FormRecord::from_draft(draft, now),
        };
        self.write(&record).await?;
        Ok(record)
    }

    async fn insert_if_absent(&self, record: &FormRecord) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;
        let existing = legacy_layout::read_entry(self.store.as_ref(), record.record_key()).await?;
        if existing.is_some() {
            return Ok(false);
        }
        self.write(record).await?;
        Ok(true)
    }

    async fn mark_synced(&self, key: &RecordKey, now: i64) -> anyhow::Result<bool> {
        Ok(self.update(key, |r| r.mark_synced(now)).await?.is_some())
    }

    async fn record_failure(
        &self,
        key: &RecordKey,
        message: &str,
        now: i64,
    ) -> anyhow::Result<Option<u32>> {
        self.update(key, |r| r.record_failure(message, now)).await
    }

    async fn mark_exhausted(
        &self,
        key: &RecordKey,
        message: &str,
        max_retry_attempts: u32,
        now: i64,
    ) -> anyhow::Result<bool> {
        Ok(self
            .update(key, |r| r.exhaust_retries(message, max_retry_attempts, now))
            .await?
            .is_some())
    }

    async fn reset_retry(&self, key: &RecordKey, now: i64) -> anyhow::Result<bool> {
        Ok(self.update(key, |r| r.reset_retry(now)).await?.is_some())
    }

    async fn reset_all_failed(&self, max_retry_attempts: u32, now: i64) -> anyhow::Result<u64> {
        let failed = self.query_failed(max_retry_attempts).await?;
        let mut reset = 0;
        for record in failed {
            if self.reset_retry(record.record_key(), now).await? {
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn delete_all(&self) -> anyhow::Result<u64> {
        let _guard = self.write_lock.lock().await;
        let mut deleted = 0;
        for key in legacy_layout::scan_record_keys(self.store.as_ref()).await? {
            let Ok(key) = key else { continue };
            if legacy_layout::remove_entry(self.store.as_ref(), &key).await? > 0 {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    // --- Reads ---

    async fn get(&self, key: &RecordKey) -> anyhow::Result<Option<FormRecord>> {
        self.load(key).await
    }

    async fn list_all(&self) -> anyhow::Result<Vec<FormRecord>> {
        self.load_all().await
    }

    async fn query_pending(&self, max_retry_attempts: u32) -> anyhow::Result<Vec<FormRecord>> {
        let mut records = self.load_all().await?;
        records.retain(|r| r.is_retry_eligible(max_retry_attempts));
        Ok(records)
    }

    async fn query_failed(&self, max_retry_attempts: u32) -> anyhow::Result<Vec<FormRecord>> {
        let mut records = self.load_all().await?;
        records.retain(|r| r.is_failed(max_retry_attempts));
        Ok(records)
    }

    async fn stats(&self, max_retry_attempts: u32) -> anyhow::Result<SyncStats> {
        let records = self.load_all().await?;
        Ok(SyncStats::from_records(&records, max_retry_attempts))
    }

    async fn count(&self) -> anyhow::Result<u64> {
        Ok(self.load_all().await?.len() as u64)
    }
}
