//! Conversion of upstream ISO-8601 timestamps into naive datetimes.
//!
//! The API emits timestamps such as `2023-03-16T01:11:27.466669Z`. The trailing
//! `Z` is dropped and the remainder is stored as a naive datetime; no other
//! offset forms are interpreted.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid ISO-8601 timestamp '{input}'")]
pub struct DateParseError {
    pub input: String,
}

/// Values that can be normalized into a stored timestamp.
pub trait IntoTimestamp {
    fn into_timestamp(self) -> Result<NaiveDateTime, DateParseError>;
}

impl IntoTimestamp for NaiveDateTime {
    fn into_timestamp(self) -> Result<NaiveDateTime, DateParseError> {
        Ok(self)
    }
}

impl IntoTimestamp for &str {
    fn into_timestamp(self) -> Result<NaiveDateTime, DateParseError> {
        parse_iso8601(self)
    }
}

impl IntoTimestamp for &String {
    fn into_timestamp(self) -> Result<NaiveDateTime, DateParseError> {
        parse_iso8601(self)
    }
}

/// Normalize a timestamp value. Datetimes pass through untouched.
pub fn normalize<T: IntoTimestamp>(value: T) -> Result<NaiveDateTime, DateParseError> {
    value.into_timestamp()
}

fn parse_iso8601(input: &str) -> Result<NaiveDateTime, DateParseError> {
    let trimmed = input.strip_suffix('Z').unwrap_or(input);

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| DateParseError {
            input: input.to_string(),
        })
}

/// Timestamps as they arrive on an upstream record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawTimestamps {
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl RawTimestamps {
    pub fn normalize(&self) -> Result<Timestamps, DateParseError> {
        Ok(Timestamps {
            created_at: self.created_at.as_ref().map(normalize).transpose()?,
            updated_at: self.updated_at.as_ref().map(normalize).transpose()?,
        })
    }
}

/// Normalized record timestamps. `None` means upstream did not supply one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamps {
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl Timestamps {
    /// Resolve both timestamps for a new row, defaulting to ingestion time.
    pub fn or_now(self) -> (NaiveDateTime, NaiveDateTime) {
        let now = Utc::now().naive_utc();
        (
            self.created_at.unwrap_or(now),
            self.updated_at.unwrap_or(now),
        )
    }
}
