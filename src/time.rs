//! RFC 3339 timestamps that may be absent.
//!
//! Descriptors and front matter write timestamps as strings; an empty string
//! means "not set". A present value keeps the exact text it was parsed from
//! so rewriting a file does not reformat it.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, thiserror::Error)]
#[error("`{value}` is not an RFC3339 timestamp: {source}")]
pub struct TimeParseError {
    pub value: String,
    source: chrono::ParseError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timestamp(Option<Present>);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Present {
    raw: String,
    value: DateTime<FixedOffset>,
}

impl Timestamp {
    /// The absent value.
    pub fn empty() -> Self {
        Self(None)
    }

    /// Parse an RFC 3339 string. `""` yields the absent value.
    pub fn parse(text: &str) -> Result<Self, TimeParseError> {
        if text.is_empty() {
            return Ok(Self(None));
        }
        let value = DateTime::parse_from_rfc3339(text).map_err(|source| TimeParseError {
            value: text.to_string(),
            source,
        })?;
        Ok(Self(Some(Present {
            raw: text.to_string(),
            value,
        })))
    }

    pub fn from_datetime(value: DateTime<FixedOffset>) -> Self {
        Self(Some(Present {
            raw: value.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            value,
        }))
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now().fixed_offset())
    }

    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }

    pub fn datetime(&self) -> Option<DateTime<FixedOffset>> {
        self.0.as_ref().map(|p| p.value)
    }

    /// The original lexical form, or `""` when absent.
    pub fn as_str(&self) -> &str {
        self.0.as_ref().map_or("", |p| p.raw.as_str())
    }
}

/// Only present values are ordered; any comparison with an absent value
/// yields `None`.
impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Some(a.value.cmp(&b.value)),
            _ => None,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_absent() {
        let t = Timestamp::parse("").unwrap();
        assert!(!t.is_present());
        assert_eq!(t.to_string(), "");
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"\"");
    }

    #[test]
    fn keeps_original_text() {
        let t = Timestamp::parse("2024-03-01T09:30:00+09:00").unwrap();
        assert!(t.is_present());
        assert_eq!(t.as_str(), "2024-03-01T09:30:00+09:00");
    }

    #[test]
    fn rejects_non_rfc3339() {
        assert!(Timestamp::parse("2024-03-01").is_err());
        assert!(Timestamp::parse("yesterday").is_err());
        let err = Timestamp::parse("2024/03/01 10:00").unwrap_err();
        assert_eq!(err.value, "2024/03/01 10:00");
    }

    #[test]
    fn orders_present_values_only() {
        let a = Timestamp::parse("2024-01-01T00:00:00Z").unwrap();
        let b = Timestamp::parse("2024-01-01T08:00:00+09:00").unwrap();
        let c = Timestamp::parse("2024-01-02T00:00:00Z").unwrap();
        assert!(b < a);
        assert!(a < c);
        assert_eq!(a.partial_cmp(&Timestamp::empty()), None);
    }

    #[test]
    fn utc_renders_with_z() {
        let dt = DateTime::parse_from_rfc3339("2025-05-05T12:00:00+00:00").unwrap();
        assert_eq!(Timestamp::from_datetime(dt).as_str(), "2025-05-05T12:00:00Z");
    }
}
