//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the SPB business key and geolocation values.
//! Each newtype ensures data validity at construction time, so code deeper
//! in the engine never re-checks raw strings.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// RecordKey
// ============================================================================

/// Business key of a form record (the SPB / delivery-note number)
///
/// Acts as the natural primary key of the record store. Leading and trailing
/// whitespace is trimmed; an empty key is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordKey(String);

impl RecordKey {
    /// Creates a new RecordKey after trimming and validating the input
    pub fn new(key: impl Into<String>) -> Result<Self, DomainError> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidRecordKey(key));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RecordKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RecordKey> for String {
    fn from(key: RecordKey) -> Self {
        key.0
    }
}

impl AsRef<str> for RecordKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Coordinate
// ============================================================================

/// Which axis a coordinate belongs to; determines the valid range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    fn field(self) -> &'static str {
        match self {
            Axis::Latitude => "latitude",
            Axis::Longitude => "longitude",
        }
    }

    fn limit(self) -> f64 {
        match self {
            Axis::Latitude => 90.0,
            Axis::Longitude => 180.0,
        }
    }
}

/// A geolocation component kept as the decimal string captured on-device
///
/// The original text is preserved verbatim (the remote service and the
/// legacy store both exchange coordinates as strings); construction only
/// verifies that it parses and lies within range for its axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coordinate(String);

impl Coordinate {
    /// Validates `value` as a coordinate on the given axis
    pub fn new(axis: Axis, value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::MissingField(axis.field()));
        }

        let parsed: f64 = trimmed
            .parse()
            .map_err(|_| DomainError::InvalidCoordinate {
                field: axis.field(),
                value: value.clone(),
            })?;

        if !parsed.is_finite() || parsed.abs() > axis.limit() {
            return Err(DomainError::InvalidCoordinate {
                field: axis.field(),
                value,
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Shorthand for a latitude coordinate
    pub fn latitude(value: impl Into<String>) -> Result<Self, DomainError> {
        Self::new(Axis::Latitude, value)
    }

    /// Shorthand for a longitude coordinate
    pub fn longitude(value: impl Into<String>) -> Result<Self, DomainError> {
        Self::new(Axis::Longitude, value)
    }

    /// Returns the coordinate text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_trims() {
        let key = RecordKey::new("  SPB-100 ").unwrap();
        assert_eq!(key.as_str(), "SPB-100");
        assert_eq!(key.to_string(), "SPB-100");
    }

    #[test]
    fn test_record_key_rejects_empty() {
        assert!(RecordKey::new("").is_err());
        assert!(RecordKey::new("   ").is_err());
        assert!("".parse::<RecordKey>().is_err());
    }

    #[test]
    fn test_record_key_serde_roundtrip() {
        let key = RecordKey::new("SPB-7").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"SPB-7\"");

        let bad: Result<RecordKey, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_coordinate_ranges() {
        assert!(Coordinate::latitude("-6.2088").is_ok());
        assert!(Coordinate::longitude("106.8456").is_ok());
        assert!(Coordinate::latitude("90").is_ok());
        assert!(Coordinate::latitude("90.5").is_err());
        assert!(Coordinate::longitude("-180.01").is_err());
    }

    #[test]
    fn test_coordinate_rejects_garbage() {
        assert_eq!(
            Coordinate::latitude(""),
            Err(DomainError::MissingField("latitude"))
        );
        assert!(matches!(
            Coordinate::longitude("east"),
            Err(DomainError::InvalidCoordinate { field: "longitude", .. })
        ));
        assert!(Coordinate::latitude("NaN").is_err());
    }

    #[test]
    fn test_coordinate_preserves_text() {
        let lat = Coordinate::latitude(" -6.20880000 ").unwrap();
        assert_eq!(lat.as_str(), "-6.20880000");
    }
}
