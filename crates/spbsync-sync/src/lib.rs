//! SPB Sync - Offline-first form synchronization
//!
//! Provides:
//! - Local-first saving of SPB form records with validation
//! - Per-record sync with already-processed detection and exponential backoff
//! - Single-flight bulk sync of the pending queue
//! - Migration of legacy key-value records into the relational store
//! - A thin orchestration controller for the SPB list view
//!
//! ## Modules
//!
//! - [`engine`] - Form sync engine: save, sync, retry scheduling, bulk sync
//! - [`status`] - Observable sync phase, last error and last success time
//! - [`scheduler`] - Periodic sweep and connectivity reaction tasks
//! - [`migration`] - Legacy KV to relational migration with verification
//! - [`controller`] - SPB list view state and connectivity-driven refresh

pub mod controller;
pub mod engine;
pub mod migration;
pub mod scheduler;
pub mod status;

use thiserror::Error;

use spbsync_core::domain::DomainError;

pub use controller::{
    ControllerEvent, ListViewState, SortColumn, SortDirection, SyncController, ViewStatus,
};
pub use engine::{EngineConfig, FormSyncEngine, SyncAllOutcome, SyncOutcome, SyncReport};
pub use migration::{
    GenerationMigrationService, MigrationError, MigrationProgress, MigrationReport,
    MigrationSettings, MigrationState,
};
pub use status::{SyncPhase, SyncStatusBoard, SyncStatusSnapshot};

/// Errors returned by the engine's local operations
///
/// Sync failures are not errors at this level: they are recorded on the
/// form record and reported through [`SyncOutcome`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The payload failed validation; nothing was written
    #[error("Validation failed: {0}")]
    Validation(#[from] DomainError),

    /// The local record store failed
    #[error("Local storage error: {0:#}")]
    Storage(anyhow::Error),
}
