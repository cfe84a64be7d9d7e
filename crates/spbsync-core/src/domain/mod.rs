//! Domain entities and business logic
//!
//! This module contains the core domain types for SPB Sync:
//! - Newtypes for the record key and validated coordinates
//! - Form records, their validated drafts and queue statistics
//! - SPB documents and the scope they are fetched for
//! - The legacy key-value layout of the first storage generation
//! - Domain-specific error types

pub mod errors;
pub mod form_record;
pub mod legacy;
pub mod newtypes;
pub mod spb_document;

// Re-export commonly used types
pub use errors::DomainError;
pub use form_record::{
    epoch_now, FormDraft, FormPayload, FormRecord, FormRecordParts, FormStatus,
    SyncStats,
};
pub use legacy::{LegacyEntry, LegacyFormData, LegacyKeys};
pub use newtypes::*;
pub use spb_document::{FetchScope, SpbDocument};
