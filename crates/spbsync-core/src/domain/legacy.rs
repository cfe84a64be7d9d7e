//! Legacy (first-generation) key-value layout for form records
//!
//! The first storage generation kept each form as a JSON blob plus a set of
//! sibling keys in a flat string-keyed store:
//!
//! | Key | Value |
//! |---|---|
//! | `form_data_<key>` | JSON payload ([`LegacyFormData`]) |
//! | `is_driver_changed_<key>` | bool |
//! | `kendala_text_<key>` | string |
//! | `is_synced_<key>` | bool |
//! | `retry_count_<key>` | int |
//! | `pending_forms` | string list of unsynced keys |
//!
//! The migration service reads this layout; the KV-backed repository both
//! reads and writes it.

use serde::{Deserialize, Deserializer, Serialize};

use super::errors::DomainError;
use super::form_record::{FormRecord, FormRecordParts, FormStatus};
use super::newtypes::RecordKey;

pub const FORM_DATA_PREFIX: &str = "form_data_";
pub const DRIVER_CHANGED_PREFIX: &str = "is_driver_changed_";
pub const REASON_PREFIX: &str = "kendala_text_";
pub const SYNCED_PREFIX: &str = "is_synced_";
pub const RETRY_COUNT_PREFIX: &str = "retry_count_";
pub const PENDING_INDEX_KEY: &str = "pending_forms";

/// Written after a verified migration to the relational generation
pub const MIGRATION_MARKER_KEY: &str = "migration_completed_v2";

/// Extracts the record key from a `form_data_<key>` entry name
pub fn record_key_from_data_key(kv_key: &str) -> Option<&str> {
    kv_key
        .strip_prefix(FORM_DATA_PREFIX)
        .filter(|rest| !rest.trim().is_empty())
}

/// The full set of KV keys belonging to one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyKeys {
    pub form_data: String,
    pub driver_changed: String,
    pub reason: String,
    pub synced: String,
    pub retry_count: String,
}

impl LegacyKeys {
    pub fn for_record(key: &RecordKey) -> Self {
        let k = key.as_str();
        Self {
            form_data: format!("{FORM_DATA_PREFIX}{k}"),
            driver_changed: format!("{DRIVER_CHANGED_PREFIX}{k}"),
            reason: format!("{REASON_PREFIX}{k}"),
            synced: format!("{SYNCED_PREFIX}{k}"),
            retry_count: format!("{RETRY_COUNT_PREFIX}{k}"),
        }
    }

    pub fn all(&self) -> [&str; 5] {
        [
            &self.form_data,
            &self.driver_changed,
            &self.reason,
            &self.synced,
            &self.retry_count,
        ]
    }
}

/// JSON payload stored under `form_data_<key>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyFormData {
    pub status: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(deserialize_with = "string_or_number")]
    pub latitude: String,
    #[serde(deserialize_with = "string_or_number")]
    pub longitude: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl LegacyFormData {
    /// Parses the JSON blob stored for `kv_key`
    pub fn decode(kv_key: &str, json: &str) -> Result<Self, DomainError> {
        serde_json::from_str(json).map_err(|e| DomainError::MalformedLegacyEntry {
            key: kv_key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Serializes back to the stored JSON form
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Older builds wrote coordinates as JSON numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

/// One legacy record with its sibling values gathered
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyEntry {
    pub record_key: RecordKey,
    pub data: LegacyFormData,
    pub resource_changed: Option<bool>,
    pub reason: Option<String>,
    pub is_synced: bool,
    pub retry_count: i64,
}

impl LegacyEntry {
    /// Converts the legacy entry into a current-generation record
    ///
    /// Missing timestamps fall back to `now`; a negative retry count is
    /// clamped to zero. The payload is not re-validated here.
    pub fn into_record(self, now: i64) -> Result<FormRecord, DomainError> {
        let status: FormStatus = self.data.status.parse()?;
        let created_at = self.data.created_at.or(self.data.timestamp).unwrap_or(now);
        let retry_count = u32::try_from(self.retry_count.max(0)).unwrap_or(u32::MAX);

        Ok(FormRecord::from_parts(FormRecordParts {
            record_key: self.record_key,
            status,
            created_by: self.data.created_by,
            latitude: self.data.latitude,
            longitude: self.data.longitude,
            reason: self.reason.filter(|r| !r.trim().is_empty()),
            resource_changed: self.resource_changed.unwrap_or(false),
            timestamp: self.data.timestamp.unwrap_or(created_at),
            is_synced: self.is_synced,
            retry_count,
            last_error: self.data.last_error,
            created_at,
            updated_at: self.data.updated_at.unwrap_or(created_at),
        }))
    }

    /// Splits a current-generation record into the legacy layout
    pub fn from_record(record: &FormRecord) -> Self {
        Self {
            record_key: record.record_key().clone(),
            data: LegacyFormData {
                status: record.status().as_code().to_string(),
                created_by: record.created_by().to_string(),
                latitude: record.latitude().to_string(),
                longitude: record.longitude().to_string(),
                timestamp: Some(record.timestamp()),
                created_at: Some(record.created_at()),
                updated_at: Some(record.updated_at()),
                last_error: record.last_error().map(str::to_string),
            },
            resource_changed: Some(record.resource_changed()),
            reason: record.reason().map(str::to_string),
            is_synced: record.is_synced(),
            retry_count: i64::from(record.retry_count()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_from_data_key() {
        assert_eq!(record_key_from_data_key("form_data_SPB-1"), Some("SPB-1"));
        assert_eq!(record_key_from_data_key("form_data_"), None);
        assert_eq!(record_key_from_data_key("is_synced_SPB-1"), None);
    }

    #[test]
    fn test_keys_for_record() {
        let keys = LegacyKeys::for_record(&RecordKey::new("SPB-1").unwrap());
        assert_eq!(keys.form_data, "form_data_SPB-1");
        assert_eq!(keys.driver_changed, "is_driver_changed_SPB-1");
        assert_eq!(keys.reason, "kendala_text_SPB-1");
        assert_eq!(keys.synced, "is_synced_SPB-1");
        assert_eq!(keys.retry_count, "retry_count_SPB-1");
    }

    #[test]
    fn test_decode_accepts_numeric_coordinates() {
        let json = r#"{"status":"KENDALA","createdBy":"u1","latitude":-6.5,"longitude":"106.8","timestamp":1700000000}"#;
        let data = LegacyFormData::decode("form_data_SPB-1", json).unwrap();
        assert_eq!(data.latitude, "-6.5");
        assert_eq!(data.longitude, "106.8");
        assert_eq!(data.timestamp, Some(1_700_000_000));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = LegacyFormData::decode("form_data_X", "{not json").unwrap_err();
        assert!(matches!(err, DomainError::MalformedLegacyEntry { .. }));
    }

    #[test]
    fn test_entry_into_record() {
        let json = r#"{"status":"KENDALA","createdBy":"u1","latitude":"-6.5","longitude":"106.8","timestamp":1700000000}"#;
        let entry = LegacyEntry {
            record_key: RecordKey::new("SPB-1").unwrap(),
            data: LegacyFormData::decode("form_data_SPB-1", json).unwrap(),
            resource_changed: Some(true),
            reason: Some("engine trouble".into()),
            is_synced: false,
            retry_count: -2,
        };

        let record = entry.into_record(5).unwrap();
        assert_eq!(record.status(), FormStatus::Issue);
        assert_eq!(record.reason(), Some("engine trouble"));
        assert!(record.resource_changed());
        assert_eq!(record.retry_count(), 0);
        assert_eq!(record.created_at(), 1_700_000_000);
    }

    #[test]
    fn test_from_record_roundtrip() {
        let json = r#"{"status":"ACCEPTED","createdBy":"u1","latitude":"1","longitude":"2","createdAt":10,"updatedAt":20}"#;
        let entry = LegacyEntry {
            record_key: RecordKey::new("SPB-2").unwrap(),
            data: LegacyFormData::decode("form_data_SPB-2", json).unwrap(),
            resource_changed: None,
            reason: None,
            is_synced: true,
            retry_count: 1,
        };
        let record = entry.into_record(0).unwrap();
        let back = LegacyEntry::from_record(&record);
        assert_eq!(back.into_record(0).unwrap(), record);
    }
}
