//! Remote submission port (driven/secondary port)
//!
//! This module defines the interface to the remote SPB service: submitting
//! (adjusting) a form record, checking whether a record was already
//! processed server-side, and fetching the SPB document list.
//!
//! ## Design Notes
//!
//! - Submission uses a typed [`SubmissionError`] because the engine needs to
//!   tell transport failures apart from server rejections for logging;
//!   every variant is retryable.
//! - Only an HTTP 200 response counts as success.
//! - The SPB list source and its local cache use `anyhow::Result`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{FetchScope, FormRecord, SpbDocument};

// ============================================================================
// AdjustRequest
// ============================================================================

/// Wire body of the adjust (submission) endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustRequest {
    pub record_key: String,
    pub status: String,
    pub created_by: String,
    pub latitude: String,
    pub longitude: String,
    pub reason: Option<String>,
    /// `"1"` when the driver or vehicle was substituted, otherwise `"0"`
    pub resource_changed_flag: String,
}

impl From<&FormRecord> for AdjustRequest {
    fn from(record: &FormRecord) -> Self {
        Self {
            record_key: record.record_key().to_string(),
            status: record.status().as_code().to_string(),
            created_by: record.created_by().to_string(),
            latitude: record.latitude().to_string(),
            longitude: record.longitude().to_string(),
            reason: record.reason().map(str::to_string),
            resource_changed_flag: if record.resource_changed() { "1" } else { "0" }.to_string(),
        }
    }
}

// ============================================================================
// SubmissionError
// ============================================================================

/// Failure of a remote call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionError {
    /// The request did not complete within the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure (DNS, refused, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with something other than 200
    #[error("Server responded with status {status}: {message}")]
    Server { status: u16, message: String },

    /// The server answered 200 with a body that could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SubmissionError {
    /// Returns true for transport-level failures
    pub fn is_network(&self) -> bool {
        matches!(self, SubmissionError::Timeout | SubmissionError::Network(_))
    }

    /// HTTP status code when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            SubmissionError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ============================================================================
// Ports
// ============================================================================

/// Port trait for submitting form records to the remote service
#[async_trait::async_trait]
pub trait ISubmissionClient: Send + Sync {
    /// Submits a record; `Ok` only on HTTP 200
    async fn submit(&self, request: &AdjustRequest) -> Result<(), SubmissionError>;

    /// Asks whether the server already processed `record_key`
    async fn check_already_processed(&self, record_key: &str) -> Result<bool, SubmissionError>;
}

/// Port trait for the remote SPB document list
#[async_trait::async_trait]
pub trait ISpbSource: Send + Sync {
    async fn fetch_documents(&self, scope: &FetchScope) -> anyhow::Result<Vec<SpbDocument>>;
}

/// Port trait for the local SPB document cache
#[async_trait::async_trait]
pub trait ISpbCache: Send + Sync {
    /// Cached documents for the scope; empty if nothing was cached
    async fn load(&self, scope: &FetchScope) -> anyhow::Result<Vec<SpbDocument>>;

    /// Replaces the cached documents for the scope
    async fn replace(&self, scope: &FetchScope, documents: &[SpbDocument]) -> anyhow::Result<()>;
}
