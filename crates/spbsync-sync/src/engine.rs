//! Form sync engine
//!
//! The [`FormSyncEngine`] owns the lifecycle of locally created SPB form
//! records: it saves them durably first, then reconciles them with the
//! remote service whenever connectivity allows.
//!
//! ## Sync Flow (per record)
//!
//! 1. **Guard**: a key already being synced returns [`SyncOutcome::InFlight`]
//! 2. **Load**: missing records return `NotFound`, synced ones `AlreadySynced`
//! 3. **Validate**: invalid payloads are parked in the failed set, never retried
//! 4. **Already-processed check**: a record the server already accepted is
//!    marked synced without resubmission
//! 5. **Submit**: HTTP 200 marks the record synced; anything else consumes
//!    one unit of retry budget
//!
//! ## Retry Logic
//!
//! After the n-th failed attempt the next attempt is scheduled after
//! `initial_backoff * 2^n` (default base 5s), while `n < max_retry_attempts`
//! (default 3). Each key has at most one scheduled retry; scheduling again
//! replaces the previous one. Exhausted records stay in the failed set
//! until [`FormSyncEngine::reset_retry`] or
//! [`FormSyncEngine::reset_all_failed`] is called.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use spbsync_core::config::Config;
use spbsync_core::domain::{epoch_now, FormDraft, FormPayload, FormRecord, RecordKey, SyncStats};
use spbsync_core::ports::{
    AdjustRequest, IConnectivityMonitor, IFormRepository, ISubmissionClient, SubmissionError,
};

use crate::scheduler;
use crate::status::SyncStatusBoard;
use crate::EngineError;

// ============================================================================
// EngineConfig
// ============================================================================

/// Tuning knobs of the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Automatic attempts before a record is left in the failed set
    pub max_retry_attempts: u32,
    /// Base of the exponential backoff
    pub initial_backoff: Duration,
    /// Upper bound on a single submission call
    pub request_timeout: Duration,
    /// Period of the silent background sweep
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            initial_backoff: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(15 * 60),
        }
    }
}

impl EngineConfig {
    /// Builds the engine settings from the `sync` and `api` sections
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retry_attempts: config.sync.max_retry_attempts,
            initial_backoff: config.sync.initial_backoff(),
            request_timeout: config.api.request_timeout(),
            sweep_interval: config.sync.sweep_interval(),
        }
    }

    /// Delay before the next attempt once `retry_count` attempts have failed
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of syncing a single record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Submitted and accepted (HTTP 200)
    Synced,
    /// The record was already synced; no network call was made
    AlreadySynced,
    /// The server had already processed the record; marked synced locally
    AlreadyProcessed,
    /// Connectivity is down; nothing was attempted
    Offline,
    /// No record with this key exists
    NotFound,
    /// Another sync of the same key is running
    InFlight,
    /// The stored payload is invalid; moved to the failed set, never retried
    Invalid(String),
    /// The attempt failed and consumed retry budget
    Failed {
        retry_count: u32,
        message: String,
        retry_scheduled: bool,
    },
    /// The local store failed while syncing
    LocalError(String),
}

impl SyncOutcome {
    /// True when the record is known to be on the server
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            SyncOutcome::Synced | SyncOutcome::AlreadySynced | SyncOutcome::AlreadyProcessed
        )
    }
}

/// Summary of one bulk sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Queue entries found at the start of the pass
    pub total: usize,
    pub synced: usize,
    pub failed: usize,
    /// Entries skipped because they were in flight or vanished
    pub skipped: usize,
    /// `"<key>: <message>"` for each failed entry
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl SyncReport {
    /// Human-readable description of the failures in this pass
    pub fn failure_summary(&self) -> Option<String> {
        let last = self.errors.last()?;
        Some(format!(
            "{} of {} forms failed to sync (last error: {})",
            self.failed, self.total, last
        ))
    }
}

/// Result of [`FormSyncEngine::sync_all_pending`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAllOutcome {
    /// Another bulk pass is running; this call did nothing
    Busy,
    /// Connectivity is down; nothing was attempted
    Offline,
    /// The pass ran over the whole queue
    Completed(SyncReport),
    /// The queue could not be read from the local store
    Failed(String),
}

impl SyncAllOutcome {
    /// True when a pass ran and every entry ended synced or skipped
    pub fn succeeded(&self) -> bool {
        matches!(self, SyncAllOutcome::Completed(report) if report.failed == 0)
    }
}

// ============================================================================
// Guards
// ============================================================================

/// Recovers the data of a poisoned lock; every critical section here
/// leaves the protected map consistent
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds the single-flight flag of the bulk path until dropped
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Marks one record key as being synced until dropped
struct KeyGuard<'a> {
    set: &'a Mutex<HashSet<RecordKey>>,
    key: RecordKey,
}

impl<'a> KeyGuard<'a> {
    fn claim(set: &'a Mutex<HashSet<RecordKey>>, key: &RecordKey) -> Option<Self> {
        lock(set).insert(key.clone()).then(|| Self {
            set,
            key: key.clone(),
        })
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.key);
    }
}

struct ScheduledRetry {
    id: u64,
    handle: AbortHandle,
}

// ============================================================================
// FormSyncEngine
// ============================================================================

struct EngineInner {
    repository: Arc<dyn IFormRepository>,
    submission: Arc<dyn ISubmissionClient>,
    connectivity: Arc<dyn IConnectivityMonitor>,
    config: EngineConfig,
    status: SyncStatusBoard,
    /// Single-flight flag of `sync_all_pending`
    bulk_running: AtomicBool,
    /// Keys with a sync attempt in progress
    in_flight: Mutex<HashSet<RecordKey>>,
    /// At most one pending retry per key
    retries: Mutex<HashMap<RecordKey, ScheduledRetry>>,
    next_retry_id: AtomicU64,
    started: AtomicBool,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Offline-first sync engine for SPB form records
///
/// Cheap to clone; clones share all state. The engine is the only writer
/// of form records besides the migration service.
///
/// ## Dependencies
///
/// - `repository`: durable record store (SQLite or legacy key-value)
/// - `submission`: remote adjust endpoint and already-processed check
/// - `connectivity`: reachability checks and change notifications
#[derive(Clone)]
pub struct FormSyncEngine {
    inner: Arc<EngineInner>,
}

impl FormSyncEngine {
    pub fn new(
        repository: Arc<dyn IFormRepository>,
        submission: Arc<dyn ISubmissionClient>,
        connectivity: Arc<dyn IConnectivityMonitor>,
        config: EngineConfig,
    ) -> Self {
        info!(
            max_retry_attempts = config.max_retry_attempts,
            initial_backoff_ms = config.initial_backoff.as_millis() as u64,
            sweep_interval_secs = config.sweep_interval.as_secs(),
            "Creating form sync engine"
        );

        Self {
            inner: Arc::new(EngineInner {
                repository,
                submission,
                connectivity,
                config,
                status: SyncStatusBoard::new(),
                bulk_running: AtomicBool::new(false),
                in_flight: Mutex::new(HashSet::new()),
                retries: Mutex::new(HashMap::new()),
                next_retry_id: AtomicU64::new(0),
                started: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Observable phase, last error and last success time
    pub fn status(&self) -> &SyncStatusBoard {
        &self.inner.status
    }

    /// Whether a bulk pass is running
    pub fn is_syncing(&self) -> bool {
        self.inner.bulk_running.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Number of records with a retry waiting on its backoff timer
    pub fn scheduled_retry_count(&self) -> usize {
        lock(&self.inner.retries).len()
    }

    pub async fn is_online(&self) -> bool {
        self.inner.connectivity.check().await.is_connected()
    }

    // ------------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------------

    /// Validates and persists a form record, local first
    ///
    /// Returns the stored record once it is durable. When online, an
    /// opportunistic sync of the record is spawned; its result does not
    /// affect this call.
    ///
    /// # Errors
    /// - [`EngineError::Validation`] if the payload is invalid (nothing is written)
    /// - [`EngineError::Storage`] if the local store fails
    #[tracing::instrument(skip(self, payload), fields(status = %payload.status))]
    pub async fn save_form(
        &self,
        record_key: &str,
        payload: FormPayload,
    ) -> Result<FormRecord, EngineError> {
        let draft = FormDraft::new(record_key, payload).map_err(|e| {
            warn!(record_key, error = %e, "Rejected invalid form");
            EngineError::Validation(e)
        })?;
        let key = draft.record_key().clone();

        let record = self
            .inner
            .repository
            .save_draft(draft, epoch_now())
            .await
            .with_context(|| format!("Failed to save form {key}"))
            .map_err(EngineError::Storage)?;

        info!(
            record_key = %key,
            retry_count = record.retry_count(),
            "Form saved locally"
        );

        if !self.is_stopped() && self.is_online().await {
            let engine = self.clone();
            tokio::spawn(async move {
                let outcome = engine.sync_record(&key).await;
                debug!(record_key = %key, ?outcome, "Opportunistic sync finished");
            });
        }

        Ok(record)
    }

    // ------------------------------------------------------------------------
    // Single-record sync
    // ------------------------------------------------------------------------

    /// Syncs one record with the remote service
    ///
    /// Never fails: every problem is absorbed into the record's retry
    /// metadata and described by the returned [`SyncOutcome`].
    #[tracing::instrument(skip(self))]
    pub async fn sync_form(&self, record_key: &RecordKey) -> SyncOutcome {
        if !self.is_online().await {
            debug!(record_key = %record_key, "Offline, sync deferred");
            return SyncOutcome::Offline;
        }
        self.sync_record(record_key).await
    }

    /// Sync without the connectivity check; the caller already made it
    async fn sync_record(&self, key: &RecordKey) -> SyncOutcome {
        let Some(guard) = KeyGuard::claim(&self.inner.in_flight, key) else {
            debug!(record_key = %key, "Sync already in flight");
            return SyncOutcome::InFlight;
        };

        let (mut outcome, retry_after) = self.attempt(key).await;
        drop(guard);

        if let Some(delay) = retry_after {
            if !self.schedule_retry(key.clone(), delay) {
                if let SyncOutcome::Failed {
                    retry_scheduled, ..
                } = &mut outcome
                {
                    *retry_scheduled = false;
                }
            }
        }

        outcome
    }

    /// One attempt; returns the outcome and the backoff of the next retry
    async fn attempt(&self, key: &RecordKey) -> (SyncOutcome, Option<Duration>) {
        let repository = &self.inner.repository;

        let record = match repository.get(key).await {
            Ok(Some(record)) => record,
            Ok(None) => return (SyncOutcome::NotFound, None),
            Err(e) => {
                error!(record_key = %key, error = %format!("{e:#}"), "Failed to load form");
                return (SyncOutcome::LocalError(format!("{e:#}")), None);
            }
        };

        if record.is_synced() {
            return (SyncOutcome::AlreadySynced, None);
        }

        if let Err(e) = record.validate_for_submission() {
            let message = format!("Invalid payload: {e}");
            warn!(record_key = %key, error = %e, "Form failed validation, moving to failed set");
            let max = self.inner.config.max_retry_attempts;
            if let Err(store_err) = repository
                .mark_exhausted(key, &message, max, epoch_now())
                .await
            {
                warn!(record_key = %key, error = %format!("{store_err:#}"), "Failed to record validation error");
            }
            return (SyncOutcome::Invalid(message), None);
        }

        let submission = &self.inner.submission;

        match submission.check_already_processed(key.as_str()).await {
            Ok(true) => {
                info!(record_key = %key, "Server already processed form, skipping submission");
                return (self.complete(key, SyncOutcome::AlreadyProcessed).await, None);
            }
            Ok(false) => {}
            Err(e) => {
                return self
                    .fail(key, format!("Already-processed check failed: {e}"))
                    .await
            }
        }

        let request = AdjustRequest::from(&record);
        let result = tokio::time::timeout(self.inner.config.request_timeout, submission.submit(&request))
            .await
            .unwrap_or(Err(SubmissionError::Timeout));

        match result {
            Ok(()) => (self.complete(key, SyncOutcome::Synced).await, None),
            Err(e) => self.fail(key, e.to_string()).await,
        }
    }

    async fn complete(&self, key: &RecordKey, outcome: SyncOutcome) -> SyncOutcome {
        self.cancel_retry(key);
        match self.inner.repository.mark_synced(key, epoch_now()).await {
            Ok(true) => {
                info!(record_key = %key, "Form synced");
                outcome
            }
            Ok(false) => SyncOutcome::NotFound,
            Err(e) => {
                error!(record_key = %key, error = %format!("{e:#}"), "Failed to mark form synced");
                SyncOutcome::LocalError(format!("{e:#}"))
            }
        }
    }

    async fn fail(&self, key: &RecordKey, message: String) -> (SyncOutcome, Option<Duration>) {
        let max = self.inner.config.max_retry_attempts;

        let retry_count = match self
            .inner
            .repository
            .record_failure(key, &message, epoch_now())
            .await
        {
            Ok(Some(count)) => count,
            Ok(None) => return (SyncOutcome::NotFound, None),
            Err(e) => {
                error!(record_key = %key, error = %format!("{e:#}"), "Failed to record sync failure");
                return (SyncOutcome::LocalError(format!("{e:#}")), None);
            }
        };

        let retry_after = (retry_count < max).then(|| self.inner.config.backoff_delay(retry_count));
        match retry_after {
            Some(delay) => warn!(
                record_key = %key,
                retry_count,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "Sync failed, retry scheduled"
            ),
            None => warn!(
                record_key = %key,
                retry_count,
                error = %message,
                "Sync failed, retry budget exhausted"
            ),
        }

        (
            SyncOutcome::Failed {
                retry_count,
                message,
                retry_scheduled: retry_after.is_some(),
            },
            retry_after,
        )
    }

    // ------------------------------------------------------------------------
    // Retry scheduling
    // ------------------------------------------------------------------------

    /// Schedules a retry of `key` after `delay`, replacing any pending one
    ///
    /// Returns `false` once the engine is stopped.
    fn schedule_retry(&self, key: RecordKey, delay: Duration) -> bool {
        let cancel = self.inner.cancel.clone();
        if cancel.is_cancelled() {
            return false;
        }

        let id = self.inner.next_retry_id.fetch_add(1, Ordering::Relaxed);
        let engine = self.clone();
        let task_key = key.clone();

        // Held across the spawn so the task cannot look itself up before
        // it is registered.
        let mut retries = lock(&self.inner.retries);
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if engine.take_retry(&task_key, id) {
                engine.run_scheduled_retry(&task_key).await;
            }
        });

        if let Some(previous) = retries.insert(
            key,
            ScheduledRetry {
                id,
                handle: handle.abort_handle(),
            },
        ) {
            previous.handle.abort();
        }
        true
    }

    /// Removes the retry entry if it still belongs to task `id`
    fn take_retry(&self, key: &RecordKey, id: u64) -> bool {
        let mut retries = lock(&self.inner.retries);
        if retries.get(key).map(|r| r.id) != Some(id) {
            return false;
        }
        retries.remove(key);
        true
    }

    fn cancel_retry(&self, key: &RecordKey) {
        if let Some(retry) = lock(&self.inner.retries).remove(key) {
            retry.handle.abort();
            debug!(record_key = %key, "Cancelled scheduled retry");
        }
    }

    async fn run_scheduled_retry(&self, key: &RecordKey) {
        let max = self.inner.config.max_retry_attempts;
        match self.inner.repository.get(key).await {
            Ok(Some(record)) if record.is_retry_eligible(max) => {}
            Ok(_) => {
                debug!(record_key = %key, "Form no longer eligible for retry");
                return;
            }
            Err(e) => {
                warn!(record_key = %key, error = %format!("{e:#}"), "Failed to load form for retry");
                return;
            }
        }

        let outcome = self.sync_form(key).await;
        debug!(record_key = %key, ?outcome, "Scheduled retry finished");
    }

    // ------------------------------------------------------------------------
    // Bulk sync
    // ------------------------------------------------------------------------

    /// Syncs every queue entry (unsynced, under the retry budget)
    ///
    /// Single-flight: a call made while another pass is running returns
    /// [`SyncAllOutcome::Busy`] without touching any record. Silent calls
    /// leave the status board alone.
    #[tracing::instrument(skip(self))]
    pub async fn sync_all_pending(&self, silent: bool) -> SyncAllOutcome {
        let Some(_flight) = FlightGuard::acquire(&self.inner.bulk_running) else {
            debug!("Bulk sync already running");
            return SyncAllOutcome::Busy;
        };

        let board = &self.inner.status;

        if !self.is_online().await {
            if !silent {
                board.mark_offline();
            }
            debug!("Offline, bulk sync skipped");
            return SyncAllOutcome::Offline;
        }

        if !silent {
            board.mark_syncing();
        }

        let started = Instant::now();
        let pending = match self
            .inner
            .repository
            .query_pending(self.inner.config.max_retry_attempts)
            .await
            .context("Failed to query pending forms")
        {
            Ok(pending) => pending,
            Err(e) => {
                let message = format!("{e:#}");
                error!(error = %message, "Bulk sync aborted");
                if !silent {
                    board.mark_failed(message.clone());
                }
                return SyncAllOutcome::Failed(message);
            }
        };

        info!(count = pending.len(), silent, "Syncing pending forms");

        let mut report = SyncReport {
            total: pending.len(),
            ..SyncReport::default()
        };

        for record in &pending {
            let key = record.record_key();
            match self.sync_record(key).await {
                SyncOutcome::Synced | SyncOutcome::AlreadySynced | SyncOutcome::AlreadyProcessed => {
                    report.synced += 1
                }
                SyncOutcome::InFlight | SyncOutcome::NotFound | SyncOutcome::Offline => {
                    report.skipped += 1
                }
                SyncOutcome::Failed { message, .. }
                | SyncOutcome::Invalid(message)
                | SyncOutcome::LocalError(message) => {
                    report.failed += 1;
                    report.errors.push(format!("{key}: {message}"));
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            total = report.total,
            synced = report.synced,
            failed = report.failed,
            skipped = report.skipped,
            duration_ms = report.duration_ms,
            "Bulk sync completed"
        );

        if !silent {
            match report.failure_summary() {
                Some(summary) => board.mark_failed(summary),
                None => board.mark_success(Utc::now()),
            }
        }

        SyncAllOutcome::Completed(report)
    }

    /// Resets every exhausted record, then runs a non-silent bulk sync
    #[tracing::instrument(skip(self))]
    pub async fn retry_failed_now(&self) -> Result<SyncAllOutcome, EngineError> {
        let reset = self.reset_all_failed().await?;
        info!(reset, "Retrying failed forms now");
        Ok(self.sync_all_pending(false).await)
    }

    // ------------------------------------------------------------------------
    // Queries and maintenance
    // ------------------------------------------------------------------------

    pub async fn get_form(&self, key: &RecordKey) -> Result<Option<FormRecord>, EngineError> {
        self.inner
            .repository
            .get(key)
            .await
            .with_context(|| format!("Failed to load form {key}"))
            .map_err(EngineError::Storage)
    }

    pub async fn list_forms(&self) -> Result<Vec<FormRecord>, EngineError> {
        self.inner
            .repository
            .list_all()
            .await
            .context("Failed to list forms")
            .map_err(EngineError::Storage)
    }

    /// The sync queue, oldest first
    pub async fn pending_forms(&self) -> Result<Vec<FormRecord>, EngineError> {
        self.inner
            .repository
            .query_pending(self.inner.config.max_retry_attempts)
            .await
            .context("Failed to query pending forms")
            .map_err(EngineError::Storage)
    }

    /// Unsynced records whose retry budget is exhausted
    pub async fn failed_forms(&self) -> Result<Vec<FormRecord>, EngineError> {
        self.inner
            .repository
            .query_failed(self.inner.config.max_retry_attempts)
            .await
            .context("Failed to query failed forms")
            .map_err(EngineError::Storage)
    }

    pub async fn stats(&self) -> Result<SyncStats, EngineError> {
        self.inner
            .repository
            .stats(self.inner.config.max_retry_attempts)
            .await
            .context("Failed to compute sync stats")
            .map_err(EngineError::Storage)
    }

    /// Manual retry affordance: gives the record a fresh retry budget
    ///
    /// Returns `false` if the record does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn reset_retry(&self, key: &RecordKey) -> Result<bool, EngineError> {
        self.cancel_retry(key);
        let found = self
            .inner
            .repository
            .reset_retry(key, epoch_now())
            .await
            .with_context(|| format!("Failed to reset retry count of {key}"))
            .map_err(EngineError::Storage)?;
        if found {
            info!(record_key = %key, "Retry count reset");
        }
        Ok(found)
    }

    /// Resets the retry count of every exhausted record
    pub async fn reset_all_failed(&self) -> Result<u64, EngineError> {
        let count = self
            .inner
            .repository
            .reset_all_failed(self.inner.config.max_retry_attempts, epoch_now())
            .await
            .context("Failed to reset failed forms")
            .map_err(EngineError::Storage)?;
        info!(count, "Reset failed forms");
        Ok(count)
    }

    /// Deletes every form record and drops all scheduled retries
    pub async fn clear_all(&self) -> Result<u64, EngineError> {
        let retries: Vec<ScheduledRetry> = lock(&self.inner.retries).drain().map(|(_, r)| r).collect();
        for retry in retries {
            retry.handle.abort();
        }

        let deleted = self
            .inner
            .repository
            .delete_all()
            .await
            .context("Failed to clear forms")
            .map_err(EngineError::Storage)?;
        warn!(deleted, "All form records cleared");
        Ok(deleted)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Spawns the periodic sweep and the connectivity listener
    ///
    /// Calling `start` twice is a no-op; calling it after [`stop`](Self::stop)
    /// is ignored.
    pub fn start(&self) {
        if self.is_stopped() {
            warn!("Engine already stopped, start ignored");
            return;
        }
        if self.inner.started.swap(true, Ordering::AcqRel) {
            debug!("Engine already started");
            return;
        }

        let sweep = scheduler::spawn_periodic_sweep(
            self.clone(),
            self.inner.config.sweep_interval,
            self.inner.cancel.child_token(),
        );
        let listener = scheduler::spawn_connectivity_listener(
            self.clone(),
            self.inner.connectivity.subscribe(),
            self.inner.cancel.child_token(),
        );
        lock(&self.inner.tasks).extend([sweep, listener]);

        info!("Form sync engine started");
    }

    /// Cancels the background tasks and every scheduled retry
    ///
    /// In-flight submissions run to completion, bounded by the request
    /// timeout. The engine cannot be restarted.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();

        let retries: Vec<ScheduledRetry> = lock(&self.inner.retries).drain().map(|(_, r)| r).collect();
        for retry in &retries {
            retry.handle.abort();
        }

        let tasks = std::mem::take(&mut *lock(&self.inner.tasks));
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Background task ended abnormally");
                }
            }
        }

        info!(cancelled_retries = retries.len(), "Form sync engine stopped");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_backoff(ms: u64) -> EngineConfig {
        EngineConfig {
            initial_backoff: Duration::from_millis(ms),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.initial_backoff, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.sweep_interval, Duration::from_secs(900));
    }

    #[test]
    fn test_from_config_reads_sync_and_api_sections() {
        let config = spbsync_core::config::ConfigBuilder::new()
            .sync_max_retry_attempts(5)
            .sync_initial_backoff_ms(250)
            .sync_sweep_interval_secs(60)
            .api_request_timeout_secs(10)
            .build();
        let engine_config = EngineConfig::from_config(&config);
        assert_eq!(engine_config.max_retry_attempts, 5);
        assert_eq!(engine_config.initial_backoff, Duration::from_millis(250));
        assert_eq!(engine_config.sweep_interval, Duration::from_secs(60));
        assert_eq!(engine_config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_doubles_per_failed_attempt() {
        let config = EngineConfig::default();
        assert_eq!(config.backoff_delay(0), Duration::from_secs(5));
        assert_eq!(config.backoff_delay(1), Duration::from_secs(10));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(20));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(40));
    }

    #[test]
    fn test_backoff_is_monotonic_and_saturates() {
        let config = config_with_backoff(100);
        let delays: Vec<Duration> = (0..40).map(|n| config.backoff_delay(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(config.backoff_delay(64), config.backoff_delay(32));
    }

    #[test]
    fn test_outcome_success_classification() {
        assert!(SyncOutcome::Synced.is_success());
        assert!(SyncOutcome::AlreadySynced.is_success());
        assert!(SyncOutcome::AlreadyProcessed.is_success());
        assert!(!SyncOutcome::Offline.is_success());
        assert!(!SyncOutcome::InFlight.is_success());
        assert!(!SyncOutcome::Invalid("x".into()).is_success());
        assert!(!SyncOutcome::Failed {
            retry_count: 1,
            message: "Request timed out".into(),
            retry_scheduled: true,
        }
        .is_success());
    }

    #[test]
    fn test_sync_all_outcome_succeeded() {
        assert!(!SyncAllOutcome::Busy.succeeded());
        assert!(!SyncAllOutcome::Offline.succeeded());
        assert!(!SyncAllOutcome::Failed("db".into()).succeeded());
        assert!(SyncAllOutcome::Completed(SyncReport::default()).succeeded());

        let report = SyncReport {
            total: 2,
            synced: 1,
            failed: 1,
            errors: vec!["SPB-2: Request timed out".into()],
            ..SyncReport::default()
        };
        assert!(!SyncAllOutcome::Completed(report).succeeded());
    }

    #[test]
    fn test_failure_summary() {
        assert_eq!(SyncReport::default().failure_summary(), None);

        let report = SyncReport {
            total: 3,
            failed: 2,
            errors: vec!["SPB-1: a".into(), "SPB-2: Server responded with status 500: b".into()],
            ..SyncReport::default()
        };
        let summary = report.failure_summary().unwrap();
        assert!(summary.starts_with("2 of 3 forms failed"));
        assert!(summary.contains("500"));
    }

    #[test]
    fn test_flight_guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let first = FlightGuard::acquire(&flag).expect("first acquire");
        assert!(FlightGuard::acquire(&flag).is_none());
        drop(first);
        assert!(FlightGuard::acquire(&flag).is_some());
    }

    #[test]
    fn test_key_guard_is_per_key() {
        let set = Mutex::new(HashSet::new());
        let a = RecordKey::new("SPB-1").unwrap();
        let b = RecordKey::new("SPB-2").unwrap();

        let guard_a = KeyGuard::claim(&set, &a).expect("claim a");
        assert!(KeyGuard::claim(&set, &a).is_none());
        assert!(KeyGuard::claim(&set, &b).is_some());

        drop(guard_a);
        assert!(KeyGuard::claim(&set, &a).is_some());
        assert!(lock(&set).is_empty());
    }
}
