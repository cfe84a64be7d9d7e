//! FormRecord domain entity
//!
//! A FormRecord is a locally-originated status transition for an SPB
//! document (acceptance, "kendala" issue report, cancellation) that is
//! awaiting or has completed submission to the remote service.
//!
//! ## Lifecycle
//!
//! ```text
//!   save_form ──► [unsynced, retry 0] ──submit ok──► [synced]
//!                      │      ▲
//!               submit │      │ reset_retry
//!               failed ▼      │
//!                [unsynced, retry n] ── n >= max ──► failed (manual retry only)
//! ```
//!
//! Raw input arrives as a [`FormPayload`]; it is validated once into a
//! [`FormDraft`] and only drafts can be persisted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{Coordinate, RecordKey};

/// Current wall-clock time in epoch seconds
pub fn epoch_now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ============================================================================
// FormStatus
// ============================================================================

/// Status code carried by a form record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormStatus {
    /// Freshly created, not yet acted upon
    New,
    /// The SPB was accepted by the field user
    Accepted,
    /// An obstacle ("kendala") was reported
    #[serde(alias = "KENDALA")]
    Issue,
    /// The SPB was cancelled
    Cancelled,
    /// Recorded by the legacy generation when a submission gave up
    FailedSync,
}

impl FormStatus {
    /// Wire and storage code for this status
    pub fn as_code(&self) -> &'static str {
        match self {
            FormStatus::New => "NEW",
            FormStatus::Accepted => "ACCEPTED",
            FormStatus::Issue => "ISSUE",
            FormStatus::Cancelled => "CANCELLED",
            FormStatus::FailedSync => "FAILED_SYNC",
        }
    }

    /// Returns true if the status requires a reason and resource flag
    pub fn requires_reason(&self) -> bool {
        matches!(self, FormStatus::Issue)
    }
}

impl fmt::Display for FormStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

impl FromStr for FormStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(FormStatus::New),
            "ACCEPTED" => Ok(FormStatus::Accepted),
            "ISSUE" | "KENDALA" => Ok(FormStatus::Issue),
            "CANCELLED" => Ok(FormStatus::Cancelled),
            "FAILED_SYNC" => Ok(FormStatus::FailedSync),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

// ============================================================================
// FormPayload / FormDraft
// ============================================================================

/// Unvalidated form input as captured by the field UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormPayload {
    pub status: FormStatus,
    pub created_by: String,
    pub latitude: String,
    pub longitude: String,
    pub reason: Option<String>,
    pub resource_changed: Option<bool>,
    /// Epoch seconds of the field event; defaults to save time
    pub timestamp: Option<i64>,
}

impl FormPayload {
    /// Creates a payload with the mandatory fields
    pub fn new(
        status: FormStatus,
        created_by: impl Into<String>,
        latitude: impl Into<String>,
        longitude: impl Into<String>,
    ) -> Self {
        Self {
            status,
            created_by: created_by.into(),
            latitude: latitude.into(),
            longitude: longitude.into(),
            reason: None,
            resource_changed: None,
            timestamp: None,
        }
    }

    /// Sets the free-text reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the driver/vehicle substitution flag
    pub fn with_resource_changed(mut self, changed: bool) -> Self {
        self.resource_changed = Some(changed);
        self
    }

    /// Sets the event timestamp (epoch seconds)
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A validated form ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormDraft {
    record_key: RecordKey,
    status: FormStatus,
    created_by: String,
    latitude: Coordinate,
    longitude: Coordinate,
    reason: Option<String>,
    resource_changed: bool,
    timestamp: Option<i64>,
}

impl FormDraft {
    /// Validates a payload for the given record key
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] when the key, creator or coordinates are
    /// missing or malformed, or when an `ISSUE` lacks its reason or
    /// resource-changed flag.
    pub fn new(record_key: &str, payload: FormPayload) -> Result<Self, DomainError> {
        let record_key = RecordKey::new(record_key)?;

        let created_by = payload.created_by.trim().to_string();
        if created_by.is_empty() {
            return Err(DomainError::MissingField("created_by"));
        }

        let latitude = Coordinate::latitude(payload.latitude)?;
        let longitude = Coordinate::longitude(payload.longitude)?;

        let reason = payload
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        if payload.status.requires_reason() {
            if reason.is_none() {
                return Err(DomainError::MissingField("reason"));
            }
            if payload.resource_changed.is_none() {
                return Err(DomainError::MissingField("resource_changed"));
            }
        }

        Ok(Self {
            record_key,
            status: payload.status,
            created_by,
            latitude,
            longitude,
            reason,
            resource_changed: payload.resource_changed.unwrap_or(false),
            timestamp: payload.timestamp,
        })
    }

    pub fn record_key(&self) -> &RecordKey {
        &self.record_key
    }

    pub fn status(&self) -> FormStatus {
        self.status
    }

    /// Explicit event time, if the caller supplied one
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }
}

// ============================================================================
// FormRecord
// ============================================================================

/// All stored columns of a form record
///
/// Used by storage adapters to rebuild a [`FormRecord`] from a row or a
/// legacy entry without going through draft validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormRecordParts {
    pub record_key: RecordKey,
    pub status: FormStatus,
    pub created_by: String,
    pub latitude: String,
    pub longitude: String,
    pub reason: Option<String>,
    pub resource_changed: bool,
    pub timestamp: i64,
    pub is_synced: bool,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A persisted form record with its sync metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormRecord {
    record_key: RecordKey,
    status: FormStatus,
    created_by: String,
    latitude: String,
    longitude: String,
    reason: Option<String>,
    resource_changed: bool,
    timestamp: i64,
    is_synced: bool,
    retry_count: u32,
    last_error: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl FormRecord {
    /// Creates a new, unsynced record from a validated draft
    pub fn from_draft(draft: FormDraft, now: i64) -> Self {
        Self {
            timestamp: draft.timestamp.unwrap_or(now),
            record_key: draft.record_key,
            status: draft.status,
            created_by: draft.created_by,
            latitude: draft.latitude.as_str().to_string(),
            longitude: draft.longitude.as_str().to_string(),
            reason: draft.reason,
            resource_changed: draft.resource_changed,
            is_synced: false,
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a record from stored columns
    pub fn from_parts(parts: FormRecordParts) -> Self {
        Self {
            record_key: parts.record_key,
            status: parts.status,
            created_by: parts.created_by,
            latitude: parts.latitude,
            longitude: parts.longitude,
            reason: parts.reason,
            resource_changed: parts.resource_changed,
            timestamp: parts.timestamp,
            is_synced: parts.is_synced,
            retry_count: parts.retry_count,
            last_error: parts.last_error,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    // --- Accessors ---

    pub fn record_key(&self) -> &RecordKey {
        &self.record_key
    }

    pub fn status(&self) -> FormStatus {
        self.status
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn latitude(&self) -> &str {
        &self.latitude
    }

    pub fn longitude(&self) -> &str {
        &self.longitude
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn resource_changed(&self) -> bool {
        self.resource_changed
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn is_synced(&self) -> bool {
        self.is_synced
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    // --- Queue predicates ---

    /// Returns true if the record may still be retried automatically
    pub fn is_retry_eligible(&self, max_retry_attempts: u32) -> bool {
        !self.is_synced && self.retry_count < max_retry_attempts
    }

    /// Returns true if the automatic retry budget is exhausted
    pub fn is_failed(&self, max_retry_attempts: u32) -> bool {
        !self.is_synced && self.retry_count >= max_retry_attempts
    }

    // --- Mutations ---

    /// Overwrites the payload with a re-saved draft
    ///
    /// The record becomes unsynced again. `retry_count`, `last_error` and
    /// `created_at` are preserved.
    pub fn apply_draft(&mut self, draft: FormDraft, now: i64) {
        self.status = draft.status;
        self.created_by = draft.created_by;
        self.latitude = draft.latitude.as_str().to_string();
        self.longitude = draft.longitude.as_str().to_string();
        self.reason = draft.reason;
        self.resource_changed = draft.resource_changed;
        if let Some(ts) = draft.timestamp {
            self.timestamp = ts;
        }
        self.is_synced = false;
        self.updated_at = now;
    }

    /// Marks the record as accepted by the server and clears retry metadata
    pub fn mark_synced(&mut self, now: i64) {
        self.is_synced = true;
        self.retry_count = 0;
        self.last_error = None;
        self.updated_at = now;
    }

    /// Records a failed attempt and returns the new retry count
    pub fn record_failure(&mut self, message: impl Into<String>, now: i64) -> u32 {
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(message.into());
        self.updated_at = now;
        self.retry_count
    }

    /// Records an error that no retry can fix and parks the record in the
    /// failed set
    ///
    /// The retry count is raised to `max_retry_attempts` (never lowered), so
    /// only an explicit reset brings the record back to the pending queue.
    pub fn exhaust_retries(&mut self, message: impl Into<String>, max_retry_attempts: u32, now: i64) {
        self.retry_count = self.retry_count.max(max_retry_attempts);
        self.last_error = Some(message.into());
        self.updated_at = now;
    }

    /// Explicit reset that re-enables automatic retries
    pub fn reset_retry(&mut self, now: i64) {
        self.retry_count = 0;
        self.last_error = None;
        self.updated_at = now;
    }

    /// Re-checks the payload invariants before submission
    ///
    /// Records restored from storage (notably legacy entries) bypass draft
    /// validation, so the engine runs this before every submission.
    pub fn validate_for_submission(&self) -> Result<(), DomainError> {
        if self.created_by.trim().is_empty() {
            return Err(DomainError::MissingField("created_by"));
        }
        Coordinate::latitude(self.latitude.clone())?;
        Coordinate::longitude(self.longitude.clone())?;
        if self.status.requires_reason()
            && self.reason.as_deref().map_or(true, |r| r.trim().is_empty())
        {
            return Err(DomainError::MissingField("reason"));
        }
        Ok(())
    }
}

// ============================================================================
// SyncStats
// ============================================================================

/// Read-only projection of queue health
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    pub total: u64,
    pub synced: u64,
    pub pending: u64,
    pub failed: u64,
    pub sync_percentage: f64,
}

impl SyncStats {
    /// Builds stats from raw counts, deriving the percentage
    pub fn new(total: u64, synced: u64, pending: u64, failed: u64) -> Self {
        let sync_percentage = if total == 0 {
            0.0
        } else {
            synced as f64 / total as f64 * 100.0
        };
        Self {
            total,
            synced,
            pending,
            failed,
            sync_percentage,
        }
    }

    /// Computes stats over an in-memory record set
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a FormRecord>,
        max_retry_attempts: u32,
    ) -> Self {
        let (mut total, mut synced, mut pending, mut failed) = (0, 0, 0, 0);
        for record in records {
            total += 1;
            if record.is_synced() {
                synced += 1;
            } else if record.is_retry_eligible(max_retry_attempts) {
                pending += 1;
            } else {
                failed += 1;
            }
        }
        Self::new(total, synced, pending, failed)
    }
}
