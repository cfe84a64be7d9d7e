//! Reading and writing legacy form entries through [`IKeyValueStore`]
//!
//! Shared by the key-value form repository and the migration service so
//! both agree on how the sibling keys of a record are gathered.

use crate::domain::legacy::{record_key_from_data_key, FORM_DATA_PREFIX, PENDING_INDEX_KEY};
use crate::domain::{DomainError, LegacyEntry, LegacyFormData, LegacyKeys, RecordKey};

use super::key_value_store::IKeyValueStore;

/// Record keys of every `form_data_<key>` entry, sorted
///
/// Entries whose suffix is not a valid record key are returned as
/// errors so callers can count them as skipped.
pub async fn scan_record_keys(
    store: &dyn IKeyValueStore,
) -> anyhow::Result<Vec<Result<RecordKey, DomainError>>> {
    let keys = store.keys_with_prefix(FORM_DATA_PREFIX).await?;
    Ok(keys
        .iter()
        .map(|kv_key| {
            record_key_from_data_key(kv_key)
                .ok_or_else(|| DomainError::InvalidRecordKey(kv_key.clone()))
                .and_then(RecordKey::new)
        })
        .collect())
}

/// Reads one legacy record with its sibling keys
///
/// Returns `Ok(None)` when no `form_data_<key>` entry exists and
/// `Ok(Some(Err(..)))` when the JSON payload cannot be decoded.
pub async fn read_entry(
    store: &dyn IKeyValueStore,
    record_key: &RecordKey,
) -> anyhow::Result<Option<Result<LegacyEntry, DomainError>>> {
    let keys = LegacyKeys::for_record(record_key);
    let Some(json) = store.get_string(&keys.form_data).await? else {
        return Ok(None);
    };

    let data = match LegacyFormData::decode(&keys.form_data, &json) {
        Ok(data) => data,
        Err(e) => return Ok(Some(Err(e))),
    };

    Ok(Some(Ok(LegacyEntry {
        record_key: record_key.clone(),
        data,
        resource_changed: store.get_bool(&keys.driver_changed).await?,
        reason: store.get_string(&keys.reason).await?,
        is_synced: store.get_bool(&keys.synced).await?.unwrap_or(false),
        retry_count: store.get_int(&keys.retry_count).await?.unwrap_or(0),
    })))
}

/// Writes a legacy record and keeps the pending index in step
pub async fn write_entry(store: &dyn IKeyValueStore, entry: &LegacyEntry) -> anyhow::Result<()> {
    let keys = LegacyKeys::for_record(&entry.record_key);

    let json = entry.data.encode()?;
    store.set_string(&keys.form_data, &json).await?;

    match entry.resource_changed {
        Some(flag) => store.set_bool(&keys.driver_changed, flag).await?,
        None => {
            store.remove(&keys.driver_changed).await?;
        }
    }
    match entry.reason.as_deref() {
        Some(reason) => store.set_string(&keys.reason, reason).await?,
        None => {
            store.remove(&keys.reason).await?;
        }
    }
    store.set_bool(&keys.synced, entry.is_synced).await?;
    store.set_int(&keys.retry_count, entry.retry_count).await?;

    set_pending(store, &entry.record_key, !entry.is_synced).await
}

/// Deletes every key of a legacy record; returns how many were present
pub async fn remove_entry(store: &dyn IKeyValueStore, record_key: &RecordKey) -> anyhow::Result<usize> {
    let keys = LegacyKeys::for_record(record_key);
    let mut removed = 0;
    for key in keys.all() {
        if store.remove(key).await? {
            removed += 1;
        }
    }
    set_pending(store, record_key, false).await?;
    Ok(removed)
}

/// Adds or removes a key from the `pending_forms` index
pub async fn set_pending(
    store: &dyn IKeyValueStore,
    record_key: &RecordKey,
    pending: bool,
) -> anyhow::Result<()> {
    let mut index = store
        .get_string_list(PENDING_INDEX_KEY)
        .await?
        .unwrap_or_default();
    let present = index.iter().any(|k| k == record_key.as_str());

    match (pending, present) {
        (true, false) => index.push(record_key.to_string()),
        (false, true) => index.retain(|k| k != record_key.as_str()),
        _ => return Ok(()),
    }
    store.set_string_list(PENDING_INDEX_KEY, &index).await
}
