//! Domain error types
//!
//! This module defines error types specific to domain operations:
//! payload validation failures, malformed identifiers and coordinates,
//! and unknown status codes.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The record key is empty or contains only whitespace
    #[error("Invalid record key: {0}")]
    InvalidRecordKey(String),

    /// A required field was not provided
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A coordinate could not be parsed or is out of range
    #[error("Invalid coordinate for {field}: {value}")]
    InvalidCoordinate {
        /// Which coordinate failed (`latitude` or `longitude`)
        field: &'static str,
        /// The rejected input
        value: String,
    },

    /// Unknown status code string
    #[error("Unknown form status: {0}")]
    UnknownStatus(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// A legacy key-value entry could not be decoded
    #[error("Malformed legacy entry {key}: {reason}")]
    MalformedLegacyEntry {
        /// The legacy key that failed to decode
        key: String,
        /// Why decoding failed
        reason: String,
    },
}
