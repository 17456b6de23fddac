//! Core type definitions with validation.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for relay configuration values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A numeric value was NaN, infinite or outside its allowed range.
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: f64,
    },
}

/// A time entry reduced to the fields the relay cares about.
///
/// `duration_seconds` is `None` when the entry carried no usable duration.
/// Such records produce no worklog.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub description: String,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    pub duration_seconds: Option<u64>,
}

impl CanonicalRecord {
    /// The record produced for events that carry no live data.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Whether an allocation covers regular or overtime hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationKind {
    Regular,
    Overtime,
}

impl AllocationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Overtime => "overtime",
        }
    }
}

impl fmt::Display for AllocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A span of time ready to be logged against a downstream target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeAllocation {
    pub description: String,
    pub started: DateTime<FixedOffset>,
    /// Whole minutes, at least 1 for anything that gets dispatched.
    pub time_spent_minutes: u32,
    /// Always `None`; serialized as `null` for targets that expect the field.
    pub visibility: Option<serde_json::Value>,
    #[serde(skip)]
    pub kind: AllocationKind,
}

impl TimeAllocation {
    pub fn new(
        description: impl Into<String>,
        started: DateTime<FixedOffset>,
        time_spent_minutes: u32,
        kind: AllocationKind,
    ) -> Self {
        Self {
            description: description.into(),
            started,
            time_spent_minutes,
            visibility: None,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_serializes_with_null_visibility() {
        let started = DateTime::parse_from_rfc3339("2023-08-22T13:50:51+02:00").unwrap();
        let allocation = TimeAllocation::new("C2C-2 review", started, 50, AllocationKind::Regular);

        let json = serde_json::to_string_pretty(&allocation).unwrap();
        insta::assert_snapshot!(json, @r#"
        {
          "description": "C2C-2 review",
          "started": "2023-08-22T13:50:51+02:00",
          "timeSpentMinutes": 50,
          "visibility": null
        }
        "#);
    }

    #[test]
    fn validation_error_messages() {
        let err = ValidationError::OutOfRange {
            field: "overtime_multiplier",
            expected: "a finite number greater than 0",
            value: -1.0,
        };
        assert_eq!(
            err.to_string(),
            "overtime_multiplier must be a finite number greater than 0, got -1"
        );
        assert_eq!(
            ValidationError::Empty { field: "overtime_token" }.to_string(),
            "overtime_token cannot be empty"
        );
    }
}
