//! SPB Sync API - HTTP client for the remote SPB service
//!
//! Provides async client for:
//! - Submitting (adjusting) form records
//! - Checking whether a record was already processed server-side
//! - Fetching the SPB document list for a user and vendor
//! - Probing reachability of the service
//!
//! ## Modules
//!
//! - [`client`] - Typed HTTP client with bearer auth and request timeout
//! - [`provider`] - `ISubmissionClient` / `ISpbSource` port implementations
//! - [`probe`] - HTTP reachability probe implementing `IConnectivityMonitor`

pub mod client;
pub mod probe;
pub mod provider;

use spbsync_core::ports::SubmissionError;
use thiserror::Error;

pub use client::ApiClient;
pub use probe::HttpConnectivityProbe;
pub use provider::SpbApiProvider;

/// Errors that can occur when communicating with the SPB service
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server rejected the credentials (401/403)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The server answered with an unexpected status
    #[error("Server responded with status {status}: {message}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// The request did not finish within the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[source] reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::InvalidResponse(e.to_string())
        } else {
            ApiError::NetworkError(e)
        }
    }
}

impl From<ApiError> for SubmissionError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Timeout => SubmissionError::Timeout,
            ApiError::NetworkError(inner) => SubmissionError::Network(inner.to_string()),
            ApiError::ServerError { status, message } => SubmissionError::Server { status, message },
            ApiError::Unauthorized(message) => SubmissionError::Server {
                status: 401,
                message,
            },
            ApiError::NotFound(message) => SubmissionError::Server {
                status: 404,
                message,
            },
            ApiError::InvalidResponse(message) => SubmissionError::InvalidResponse(message),
        }
    }
}
