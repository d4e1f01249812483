//! Shared types used across the per-diem rate extractor.
//!
//! This module defines the location code newtype, the normalized rate
//! record, the sanity bounds every record must satisfy, and timestamps.

use crate::error::PerDiemError;
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Placeholder used for country or post names the parser could not resolve.
pub const UNKNOWN: &str = "Unknown";

/// Newtype for location codes (P-codes) with validation.
///
/// A location code is the 5-digit identifier the upstream rate site uses
/// for a diplomatic post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocationCode(String);

impl LocationCode {
    /// Create a new `LocationCode` from a string.
    ///
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    /// Returns error if the code is not exactly five ASCII digits.
    pub fn new(code: impl Into<String>) -> Result<Self, PerDiemError> {
        let code = code.into();
        let trimmed = code.trim();
        Self::validate(trimmed)?;
        Ok(Self(trimmed.to_string()))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(code: &str) -> Result<(), PerDiemError> {
        static CODE_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = CODE_REGEX.get_or_init(|| Regex::new(r"^[0-9]{5}$").expect("valid regex"));

        if regex.is_match(code) {
            Ok(())
        } else {
            Err(PerDiemError::InvalidLocationCode {
                code: code.to_string(),
            })
        }
    }
}

impl fmt::Display for LocationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for LocationCode {
    type Error = PerDiemError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LocationCode> for String {
    fn from(code: LocationCode) -> Self {
        code.0
    }
}

/// The parser stage that produced a rate record.
///
/// Kept on every record so drift in the upstream markup shows up as a
/// shift towards lower-priority strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Header-anchored table row
    StructuredTable,
    /// Elements labelled through their `title` attribute
    TitleAttribute,
    /// Loose regular expression over the raw markup
    GenericPattern,
    /// Any three consecutive integers that pass the sanity checks
    BareNumbers,
}

impl ExtractionStrategy {
    /// All strategies in cascade priority order.
    pub const CASCADE: [Self; 4] = [
        Self::StructuredTable,
        Self::TitleAttribute,
        Self::GenericPattern,
        Self::BareNumbers,
    ];

    /// Stable identifier used in logs and storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuredTable => "structured_table",
            Self::TitleAttribute => "title_attribute",
            Self::GenericPattern => "generic_pattern",
            Self::BareNumbers => "bare_numbers",
        }
    }

    /// How much a match from this strategy can be trusted (0.0 - 1.0).
    #[must_use]
    pub fn confidence(&self) -> f32 {
        match self {
            Self::StructuredTable => 0.95,
            Self::TitleAttribute => 0.85,
            Self::GenericPattern => 0.60,
            Self::BareNumbers => 0.30,
        }
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Plausible ranges for extracted rates.
///
/// The upper limits are heuristics, not facts about the upstream site, so
/// they are configurable. The lower limit is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateBounds {
    /// Maximum lodging rate in dollars
    pub max_lodging: u32,
    /// Maximum meals & incidentals rate in dollars
    pub max_mie: u32,
    /// Maximum total per diem in dollars
    pub max_total: u32,
}

impl Default for RateBounds {
    fn default() -> Self {
        Self {
            max_lodging: 2000,
            max_mie: 1000,
            max_total: 3000,
        }
    }
}

impl RateBounds {
    /// Check a candidate triple against the bounds.
    ///
    /// # Errors
    /// Returns the first violated limit.
    pub fn check(&self, lodging: u32, mie: u32, total: u32) -> Result<(), BoundsViolation> {
        if lodging > self.max_lodging {
            return Err(BoundsViolation::Lodging {
                value: lodging,
                max: self.max_lodging,
            });
        }
        if mie > self.max_mie {
            return Err(BoundsViolation::Mie {
                value: mie,
                max: self.max_mie,
            });
        }
        if total > self.max_total {
            return Err(BoundsViolation::Total {
                value: total,
                max: self.max_total,
            });
        }
        Ok(())
    }

    /// Whether a record's rates fall within the bounds.
    #[must_use]
    pub fn contains(&self, record: &RateRecord) -> bool {
        self.check(record.lodging_rate, record.mie_rate, record.total_rate)
            .is_ok()
    }
}

/// A rate that fell outside [`RateBounds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum BoundsViolation {
    /// Lodging above its limit
    Lodging {
        /// Offending value
        value: u32,
        /// Configured limit
        max: u32,
    },
    /// M&IE above its limit
    Mie {
        /// Offending value
        value: u32,
        /// Configured limit
        max: u32,
    },
    /// Total above its limit
    Total {
        /// Offending value
        value: u32,
        /// Configured limit
        max: u32,
    },
}

impl fmt::Display for BoundsViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lodging { value, max } => write!(f, "lodging rate {value} exceeds {max}"),
            Self::Mie { value, max } => write!(f, "M&IE rate {value} exceeds {max}"),
            Self::Total { value, max } => write!(f, "total rate {value} exceeds {max}"),
        }
    }
}

/// Normalized per-diem rates for one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRecord {
    /// Location the rates apply to
    pub location_code: LocationCode,
    /// Uppercased country name, or [`UNKNOWN`]
    pub country: String,
    /// Post (city) name, or [`UNKNOWN`]
    pub post: String,
    /// Maximum lodging rate
    pub lodging_rate: u32,
    /// Meals & incidentals rate
    pub mie_rate: u32,
    /// Maximum per diem rate
    pub total_rate: u32,
    /// When the rates were extracted
    pub extracted_at: Timestamp,
    /// Cascade stage that produced the record
    pub strategy_used: ExtractionStrategy,
}

impl RateRecord {
    /// Whether this record carries the same data as `other`, ignoring
    /// `extracted_at`.
    #[must_use]
    pub fn same_rates(&self, other: &Self) -> bool {
        self.location_code == other.location_code
            && self.country == other.country
            && self.post == other.post
            && self.lodging_rate == other.lodging_rate
            && self.mie_rate == other.mie_rate
            && self.total_rate == other.total_rate
            && self.strategy_used == other.strategy_used
    }
}

/// Wrapper around `chrono::DateTime<Utc>` for consistent timestamp handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp representing the current moment.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create a timestamp from a `DateTime<Utc>`.
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get the inner `DateTime<Utc>`.
    #[must_use]
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Parse a timestamp from an RFC3339 string.
    pub fn from_rfc3339(s: &str) -> Result<Self, PerDiemError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| PerDiemError::InvalidTimestamp(e.to_string()))
    }

    /// Create a timestamp from milliseconds since the Unix epoch.
    pub fn from_millis(millis: i64) -> Result<Self, PerDiemError> {
        Utc.timestamp_millis_opt(millis)
            .single()
            .map(Self)
            .ok_or_else(|| PerDiemError::InvalidTimestamp(format!("out of range: {millis}")))
    }

    /// Format as RFC3339 string.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Get seconds since Unix epoch.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.0.timestamp()
    }

    /// Get milliseconds since Unix epoch.
    #[must_use]
    pub fn timestamp_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Time elapsed between this timestamp and `now`.
    ///
    /// Timestamps in the future report a zero age.
    #[must_use]
    pub fn age_at(&self, now: Self) -> chrono::Duration {
        (now.0 - self.0).max(chrono::Duration::zero())
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}
