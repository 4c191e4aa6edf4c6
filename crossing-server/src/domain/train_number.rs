//! Train number (train identity) type.

use std::fmt;

use serde::{Serialize, Serializer};

/// Error returned when parsing an invalid train number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid train number {raw:?}: must be non-empty and contain a digit")]
pub struct InvalidTrainNumber {
    raw: String,
}

/// A validated train number.
///
/// Indian Railways numbers are usually five digits ("12658"), but the feed
/// also carries specials with a letter prefix or suffix. The only hard rule
/// is that the trimmed value is non-empty and contains at least one digit;
/// metadata rows in the feed fail this check.
///
/// # Examples
///
/// ```
/// use crossing_server::domain::TrainNumber;
///
/// assert_eq!(TrainNumber::parse(" 12658 ").unwrap().as_str(), "12658");
/// assert!(TrainNumber::parse("06A21").is_ok());
///
/// assert!(TrainNumber::parse("").is_err());
/// assert!(TrainNumber::parse("VN").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrainNumber(String);

impl TrainNumber {
    /// Parse a train number, trimming surrounding whitespace.
    pub fn parse(s: &str) -> Result<Self, InvalidTrainNumber> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.chars().any(|c| c.is_ascii_digit()) {
            return Err(InvalidTrainNumber { raw: s.to_string() });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the train number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TrainNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrainNumber({})", self.0)
    }
}

impl fmt::Display for TrainNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl Serialize for TrainNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
