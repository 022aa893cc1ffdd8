//! Migration version identifiers
//!
//! Versions are positive integers. New units get a `YYYYMMDDHHMMSS`
//! timestamp; hand-numbered catalogs may use small sequential integers, but a
//! single catalog never mixes the two.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const TIMESTAMP_DIGITS: usize = 14;

/// A unique, totally ordered migration identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(i64);

/// Numbering scheme a version belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionScheme {
    /// 14 digit `YYYYMMDDHHMMSS` value
    Timestamp,
    /// Any other positive integer
    Sequential,
}

impl Version {
    /// The version reported when nothing has been applied
    pub const ZERO: Version = Version(0);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Allocate a timestamp version for the given instant
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        // The formatted value is always 14 ASCII digits.
        let digits = at.format(TIMESTAMP_FORMAT).to_string();
        Self(digits.parse().unwrap_or_default())
    }

    pub fn scheme(&self) -> VersionScheme {
        let digits = self.0.to_string();
        if digits.len() == TIMESTAMP_DIGITS
            && NaiveDateTime::parse_from_str(&digits, TIMESTAMP_FORMAT).is_ok()
        {
            VersionScheme::Timestamp
        } else {
            VersionScheme::Sequential
        }
    }

    /// Creation time encoded in a timestamp version
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.scheme() {
            VersionScheme::Timestamp => {
                NaiveDateTime::parse_from_str(&self.0.to_string(), TIMESTAMP_FORMAT)
                    .ok()
                    .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
            }
            VersionScheme::Sequential => None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("'{}' is not a non-negative integer", s));
        }
        trimmed
            .parse::<i64>()
            .map(Version)
            .map_err(|e| format!("'{}' is out of range: {}", s, e))
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Version(value)
    }
}
