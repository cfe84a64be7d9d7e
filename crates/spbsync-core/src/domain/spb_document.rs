//! SPB (delivery note) documents as listed to field users

use serde::{Deserialize, Serialize};

/// A delivery note as returned by the remote SPB list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpbDocument {
    pub spb_number: String,
    #[serde(default)]
    pub vendor_code: String,
    #[serde(default)]
    pub driver_name: String,
    #[serde(default)]
    pub vehicle_number: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub status: String,
    /// Epoch seconds when the note was issued
    #[serde(default)]
    pub issued_at: i64,
}

impl SpbDocument {
    /// Case-insensitive substring match across the searchable columns
    ///
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        [
            &self.spb_number,
            &self.driver_name,
            &self.vehicle_number,
            &self.destination,
            &self.status,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Which user and vendor a list of SPB documents belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FetchScope {
    pub user_id: String,
    pub vendor_code: String,
}

impl FetchScope {
    pub fn new(user_id: impl Into<String>, vendor_code: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            vendor_code: vendor_code.into(),
        }
    }
}
