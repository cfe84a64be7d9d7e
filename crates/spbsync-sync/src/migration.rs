//! Generation migration: legacy key-value records into the record store
//!
//! The first storage generation kept each form as a family of key-value
//! entries (`form_data_<key>` plus sibling flag keys). The
//! [`GenerationMigrationService`] copies every such record into the
//! current [`IFormRepository`], verifies the copy and, on request, deletes
//! the legacy entries.
//!
//! ## State machine
//!
//! ```text
//! NotStarted ──→ InProgress ──→ Completed ──→ Cleaning ──→ Completed
//!                    │
//!                    └────────→ Failed
//! ```
//!
//! `migrate` only inserts records whose key is not in the record store yet.
//! Running it again over the same legacy data leaves existing rows (and
//! whatever the engine wrote to them since) untouched. `cleanup` is refused
//! unless the last `migrate` completed.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use spbsync_core::config::MigrationConfig;
use spbsync_core::domain::legacy::{FORM_DATA_PREFIX, MIGRATION_MARKER_KEY, PENDING_INDEX_KEY};
use spbsync_core::domain::{epoch_now, FormRecord, RecordKey};
use spbsync_core::ports::legacy_layout;
use spbsync_core::ports::{IFormRepository, IKeyValueStore};

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur during migration or cleanup
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A migration or cleanup is already running on this service
    #[error("Migration already running")]
    AlreadyRunning,

    /// `cleanup` was called before a successful `migrate`
    #[error("Migration has not completed; refusing to clean up legacy data")]
    NotCompleted,

    /// Reading or deleting legacy entries failed
    #[error("Legacy store error: {0:#}")]
    Legacy(anyhow::Error),

    /// Writing to or reading from the record store failed
    #[error("Record store error: {0:#}")]
    Target(anyhow::Error),

    /// The copy did not pass verification
    #[error("Verification failed: {0}")]
    VerificationFailed(String),
}

// ============================================================================
// State, progress and report
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationState {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
    Cleaning,
}

/// Entries processed so far out of the entries found by the scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MigrationProgress {
    pub current: usize,
    pub total: usize,
}

impl MigrationProgress {
    /// Completion in `0.0..=1.0`; an empty migration counts as done
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.current as f64 / self.total as f64
    }
}

/// Outcome of a successful `migrate`
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationReport {
    /// Legacy entries found by the scan
    pub total: usize,
    /// Entries inserted into the record store
    pub migrated: usize,
    /// Entries whose key was already in the record store; left as stored
    pub kept: usize,
    /// Entries that could not be parsed
    pub skipped: usize,
    /// Rows in the record store after the copy
    pub target_rows: u64,
    /// Records compared during verification
    pub sampled: usize,
    /// Sampled records whose key fields matched the source
    pub sample_matched: usize,
    pub duration_ms: u64,
}

/// Verification policy
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationSettings {
    /// Records compared against the source after the copy
    pub verify_sample_size: usize,
    /// Fraction of the sample that must match
    pub verify_threshold: f64,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            verify_sample_size: 10,
            verify_threshold: 0.8,
        }
    }
}

impl From<&MigrationConfig> for MigrationSettings {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            verify_sample_size: config.verify_sample_size,
            verify_threshold: config.verify_threshold,
        }
    }
}

// ============================================================================
// GenerationMigrationService
// ============================================================================

/// A migrated record together with what the source said about it
struct MigratedEntry {
    key: RecordKey,
    expected: FormRecord,
}

/// Copies legacy key-value form records into the record store
pub struct GenerationMigrationService {
    legacy: Arc<dyn IKeyValueStore>,
    target: Arc<dyn IFormRepository>,
    settings: MigrationSettings,
    state: watch::Sender<MigrationState>,
    progress: watch::Sender<MigrationProgress>,
    /// Keys in the record store after the last successful `migrate`,
    /// consumed by `cleanup`
    migrated_keys: Mutex<Vec<RecordKey>>,
}

impl GenerationMigrationService {
    pub fn new(
        legacy: Arc<dyn IKeyValueStore>,
        target: Arc<dyn IFormRepository>,
        settings: MigrationSettings,
    ) -> Self {
        Self {
            legacy,
            target,
            settings,
            state: watch::channel(MigrationState::NotStarted).0,
            progress: watch::channel(MigrationProgress::default()).0,
            migrated_keys: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> MigrationState {
        *self.state.borrow()
    }

    pub fn progress(&self) -> MigrationProgress {
        *self.progress.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<MigrationState> {
        self.state.subscribe()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<MigrationProgress> {
        self.progress.subscribe()
    }

    /// Whether the legacy store still has to be migrated
    ///
    /// False once the completion marker is set. Entries left behind after
    /// that (unparseable ones, or a store never cleaned up) are reported but
    /// do not trigger another pass.
    pub async fn needs_migration(&self) -> Result<bool, MigrationError> {
        let marker = self
            .legacy
            .get_bool(MIGRATION_MARKER_KEY)
            .await
            .map_err(MigrationError::Legacy)?
            .unwrap_or(false);
        if !marker {
            return Ok(true);
        }

        let remaining = self
            .legacy
            .keys_with_prefix(FORM_DATA_PREFIX)
            .await
            .map_err(MigrationError::Legacy)?;
        if !remaining.is_empty() {
            debug!(remaining = remaining.len(), "Legacy entries left after completed migration");
        }
        Ok(false)
    }

    /// Copies every legacy record into the record store and verifies it
    pub async fn migrate(&self) -> Result<MigrationReport, MigrationError> {
        self.enter(
            |s| !matches!(s, MigrationState::InProgress | MigrationState::Cleaning),
            MigrationState::InProgress,
        )
        .ok_or(MigrationError::AlreadyRunning)?;

        let mut migrated_keys = self.migrated_keys.lock().await;
        migrated_keys.clear();

        match self.run(&mut migrated_keys).await {
            Ok(report) => {
                self.state.send_replace(MigrationState::Completed);
                info!(
                    migrated = report.migrated,
                    kept = report.kept,
                    skipped = report.skipped,
                    sampled = report.sampled,
                    sample_matched = report.sample_matched,
                    duration_ms = report.duration_ms,
                    "Migration completed"
                );
                Ok(report)
            }
            Err(e) => {
                migrated_keys.clear();
                self.state.send_replace(MigrationState::Failed);
                warn!(error = %e, "Migration failed");
                Err(e)
            }
        }
    }

    async fn run(&self, migrated_keys: &mut Vec<RecordKey>) -> Result<MigrationReport, MigrationError> {
        let started = Instant::now();

        self.target
            .ensure_schema()
            .await
            .map_err(MigrationError::Target)?;

        let scanned = legacy_layout::scan_record_keys(self.legacy.as_ref())
            .await
            .map_err(MigrationError::Legacy)?;
        let total = scanned.len();
        self.progress.send_replace(MigrationProgress { current: 0, total });
        info!(total, "Migrating legacy form records");

        let now = epoch_now();
        let mut migrated: Vec<MigratedEntry> = Vec::with_capacity(total);
        let mut kept: Vec<RecordKey> = Vec::new();
        let mut skipped = 0;

        for (index, scanned_key) in scanned.into_iter().enumerate() {
            match scanned_key {
                Ok(key) => match self.read_record(&key, now).await? {
                    Some(record) => {
                        let inserted = self
                            .target
                            .insert_if_absent(&record)
                            .await
                            .map_err(MigrationError::Target)?;
                        if inserted {
                            debug!(record_key = %key, "Migrated form record");
                            migrated.push(MigratedEntry {
                                key,
                                expected: record,
                            });
                        } else {
                            debug!(record_key = %key, "Form record already migrated, keeping stored row");
                            kept.push(key);
                        }
                    }
                    None => skipped += 1,
                },
                Err(e) => {
                    warn!(error = %e, "Skipping legacy entry with invalid key");
                    skipped += 1;
                }
            }
            self.progress.send_replace(MigrationProgress {
                current: index + 1,
                total,
            });
        }

        let (target_rows, sampled, sample_matched) =
            self.verify(&migrated, kept.len()).await?;

        self.legacy
            .set_bool(MIGRATION_MARKER_KEY, true)
            .await
            .map_err(MigrationError::Legacy)?;

        let inserted = migrated.len();
        let kept_count = kept.len();
        migrated_keys.extend(migrated.into_iter().map(|entry| entry.key));
        migrated_keys.extend(kept);

        Ok(MigrationReport {
            total,
            migrated: inserted,
            kept: kept_count,
            skipped,
            target_rows,
            sampled,
            sample_matched,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Reads and converts one legacy record; `None` means skipped
    async fn read_record(&self, key: &RecordKey, now: i64) -> Result<Option<FormRecord>, MigrationError> {
        let entry = match legacy_layout::read_entry(self.legacy.as_ref(), key)
            .await
            .map_err(MigrationError::Legacy)?
        {
            Some(Ok(entry)) => entry,
            Some(Err(e)) => {
                warn!(record_key = %key, error = %e, "Skipping unparseable legacy entry");
                return Ok(None);
            }
            None => {
                debug!(record_key = %key, "Legacy entry vanished during scan");
                return Ok(None);
            }
        };

        match entry.into_record(now) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(record_key = %key, error = %e, "Skipping invalid legacy entry");
                Ok(None)
            }
        }
    }

    /// Row-count check plus a sampled field comparison
    ///
    /// Only freshly inserted records are sampled; kept rows may legitimately
    /// differ from their legacy source.
    async fn verify(
        &self,
        migrated: &[MigratedEntry],
        kept: usize,
    ) -> Result<(u64, usize, usize), MigrationError> {
        let target_rows = self.target.count().await.map_err(MigrationError::Target)?;
        let expected_rows = (migrated.len() + kept) as u64;
        if target_rows < expected_rows {
            return Err(MigrationError::VerificationFailed(format!(
                "record store has {target_rows} rows, expected at least {expected_rows}"
            )));
        }

        let sample = sample_evenly(migrated, self.settings.verify_sample_size);
        let mut matched = 0;
        for entry in &sample {
            let stored = self
                .target
                .get(&entry.key)
                .await
                .map_err(MigrationError::Target)?;
            match stored {
                Some(stored) if key_fields_match(&stored, &entry.expected) => matched += 1,
                _ => warn!(record_key = %entry.key, "Migrated record does not match its source"),
            }
        }

        if !sample.is_empty() {
            let ratio = matched as f64 / sample.len() as f64;
            if ratio < self.settings.verify_threshold {
                return Err(MigrationError::VerificationFailed(format!(
                    "{matched} of {} sampled records matched (threshold {:.0}%)",
                    sample.len(),
                    self.settings.verify_threshold * 100.0
                )));
            }
        }

        Ok((target_rows, sample.len(), matched))
    }

    /// Deletes the legacy entries the last successful `migrate` found in
    /// the record store, inserted or kept
    ///
    /// Returns how many records were removed. Refused with
    /// [`MigrationError::NotCompleted`] unless the service is in the
    /// `Completed` state.
    pub async fn cleanup(&self) -> Result<usize, MigrationError> {
        self.enter(|s| *s == MigrationState::Completed, MigrationState::Cleaning)
            .ok_or(MigrationError::NotCompleted)?;

        let mut migrated_keys = self.migrated_keys.lock().await;
        let result = self.remove_legacy(&mut migrated_keys).await;
        self.state.send_replace(MigrationState::Completed);

        match &result {
            Ok(removed) => info!(removed, "Legacy form entries cleaned up"),
            Err(e) => warn!(error = %e, "Legacy cleanup interrupted"),
        }
        result
    }

    async fn remove_legacy(&self, migrated_keys: &mut Vec<RecordKey>) -> Result<usize, MigrationError> {
        let mut removed = 0;
        while let Some(key) = migrated_keys.last() {
            legacy_layout::remove_entry(self.legacy.as_ref(), key)
                .await
                .map_err(MigrationError::Legacy)?;
            migrated_keys.pop();
            removed += 1;
        }

        let index_empty = self
            .legacy
            .get_string_list(PENDING_INDEX_KEY)
            .await
            .map_err(MigrationError::Legacy)?
            .map_or(false, |index| index.is_empty());
        if index_empty {
            self.legacy
                .remove(PENDING_INDEX_KEY)
                .await
                .map_err(MigrationError::Legacy)?;
        }

        Ok(removed)
    }

    /// Moves to `next` if `allowed` holds for the current state
    fn enter(&self, allowed: impl Fn(&MigrationState) -> bool, next: MigrationState) -> Option<()> {
        let mut entered = false;
        self.state.send_if_modified(|state| {
            if !allowed(state) {
                return false;
            }
            *state = next;
            entered = true;
            true
        });
        entered.then_some(())
    }
}

/// Picks up to `n` entries spread evenly across `items`
fn sample_evenly<T>(items: &[T], n: usize) -> Vec<&T> {
    if n == 0 || items.is_empty() {
        return Vec::new();
    }
    if items.len() <= n {
        return items.iter().collect();
    }
    (0..n).map(|i| &items[i * items.len() / n]).collect()
}

fn key_fields_match(stored: &FormRecord, expected: &FormRecord) -> bool {
    stored.record_key() == expected.record_key()
        && stored.status() == expected.status()
        && stored.created_by() == expected.created_by()
        && stored.latitude() == expected.latitude()
        && stored.longitude() == expected.longitude()
        && stored.reason() == expected.reason()
        && stored.resource_changed() == expected.resource_changed()
        && stored.is_synced() == expected.is_synced()
}
