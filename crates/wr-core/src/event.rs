//! Inbound webhook events and their normalization.
//!
//! The time tracker posts one JSON document per change. Three shapes are
//! recognised: the subscription ping (whose `payload` is the literal string
//! `"ping"`), and time entry `created` / `updated` notifications whose
//! `payload` is the entry itself. Everything else is kept as
//! [`InboundEvent::Unrecognized`] and normalizes to an empty record.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::Deserialize;

use crate::types::CanonicalRecord;

/// Value of the `payload` field on subscription pings.
pub const PING_MARKER: &str = "ping";

/// Substrings of `metadata.request_body` that mark a deleted entry.
///
/// The request body is a JSON document stored inside a string field, so the
/// check is textual. A deletion carries a timestamp (`"deleted_at":"..."`),
/// whereas live entries carry `"server_deleted_at":null`.
const DELETION_MARKERS: &[&str] = &["deleted_at\":\"", "deleted_at\\\":\\\""];

static ISO_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^P(?:(\d+(?:\.\d+)?)W)?(?:(\d+(?:\.\d+)?)D)?(?:T(?:(\d+(?:\.\d+)?)H)?(?:(\d+(?:\.\d+)?)M)?(?:(\d+(?:\.\d+)?)S)?)?$",
    )
    .unwrap()
});

/// The shape of an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventVariant {
    Ping,
    Created,
    Updated,
    Unrecognized,
}

/// Why an event is not turned into worklogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IgnoreReason {
    /// Subscription pings are answered by the validation echo instead.
    Ping,
    /// The entry is still running.
    EntryRunning,
    /// The entry was deleted.
    EntryDeleted,
}

impl IgnoreReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping event",
            Self::EntryRunning => "time entry is still running",
            Self::EntryDeleted => "time entry was deleted",
        }
    }
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classified webhook event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Ping(PingEvent),
    Created(EntryEvent),
    Updated(EntryEvent),
    /// Anything that is neither a ping nor a parseable entry notification.
    Unrecognized,
}

/// Subscription validation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingEvent {
    pub validation_code_url: Option<String>,
}

/// A time entry notification.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryEvent {
    pub event_id: Option<u64>,
    pub entry: TimeEntry,
    /// Raw `metadata.request_body`, scanned verbatim for deletion markers.
    pub request_body: Option<String>,
}

/// The time entry snapshot carried in `payload`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimeEntry {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    pub start: DateTime<FixedOffset>,
    #[serde(default)]
    pub stop: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub duration: Option<EntryDuration>,
}

/// A duration as sent by the source: raw seconds or an ISO-8601 string.
///
/// Any other JSON value is kept as-is so that an odd duration never hides
/// the entry itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EntryDuration {
    Seconds(i64),
    Text(String),
    Other(serde_json::Value),
}

impl EntryDuration {
    /// Normalizes to a non-negative number of seconds.
    ///
    /// Running entries report a negative duration and yield `None`, as does
    /// any text that is neither an integer nor an ISO-8601 duration.
    pub fn as_seconds(&self) -> Option<u64> {
        match self {
            Self::Seconds(secs) => u64::try_from(*secs).ok(),
            Self::Text(text) => {
                let text = text.trim();
                if let Ok(secs) = text.parse::<i64>() {
                    return u64::try_from(secs).ok();
                }
                parse_iso8601_duration(text)
            }
            Self::Other(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    event_id: serde_json::Value,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default)]
    metadata: Option<RawMetadata>,
    #[serde(default)]
    validation_code_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    request_body: Option<String>,
}

/// Reads an identifier sent either as a number or as a numeric string.
fn lenient_id(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl InboundEvent {
    /// Classifies a webhook body. Never fails: unknown shapes become
    /// [`InboundEvent::Unrecognized`].
    pub fn from_value(value: serde_json::Value) -> Self {
        let raw: RawEvent = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!(error = %err, "webhook body has an unexpected shape");
                return Self::Unrecognized;
            }
        };

        if raw.payload.as_str() == Some(PING_MARKER) {
            return Self::Ping(PingEvent {
                validation_code_url: raw.validation_code_url,
            });
        }

        let (action, request_body) = raw
            .metadata
            .map(|m| (m.action, m.request_body))
            .unwrap_or_default();

        let wrap: fn(EntryEvent) -> Self = match action.as_deref() {
            Some("created") => Self::Created,
            Some("updated") => Self::Updated,
            _ => return Self::Unrecognized,
        };

        match serde_json::from_value::<TimeEntry>(raw.payload) {
            Ok(entry) => wrap(EntryEvent {
                event_id: lenient_id(&raw.event_id),
                entry,
                request_body,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "time entry payload has an unexpected shape");
                Self::Unrecognized
            }
        }
    }

    pub const fn classify(&self) -> EventVariant {
        match self {
            Self::Ping(_) => EventVariant::Ping,
            Self::Created(_) => EventVariant::Created,
            Self::Updated(_) => EventVariant::Updated,
            Self::Unrecognized => EventVariant::Unrecognized,
        }
    }

    /// Returns the first matching ignore rule, if any.
    pub fn should_ignore(&self) -> Option<IgnoreReason> {
        match self {
            Self::Ping(_) => Some(IgnoreReason::Ping),
            Self::Created(event) if event.entry.stop.is_none() => Some(IgnoreReason::EntryRunning),
            Self::Updated(event) if event.entry.stop.is_none() => Some(IgnoreReason::EntryRunning),
            Self::Updated(event) if event.is_deleted() => Some(IgnoreReason::EntryDeleted),
            Self::Created(_) | Self::Updated(_) | Self::Unrecognized => None,
        }
    }

    /// Projects the event onto a [`CanonicalRecord`].
    ///
    /// Pings and unrecognized events give the empty record, whose absent
    /// duration means there is nothing to log.
    pub fn project(&self) -> CanonicalRecord {
        match self {
            Self::Created(event) | Self::Updated(event) => CanonicalRecord {
                description: event.entry.description.clone(),
                start: Some(event.entry.start),
                end: event.entry.stop,
                duration_seconds: event
                    .entry
                    .duration
                    .as_ref()
                    .and_then(EntryDuration::as_seconds),
            },
            Self::Ping(_) | Self::Unrecognized => CanonicalRecord::empty(),
        }
    }

    pub fn event_id(&self) -> Option<u64> {
        match self {
            Self::Created(event) | Self::Updated(event) => event.event_id,
            Self::Ping(_) | Self::Unrecognized => None,
        }
    }
}

impl EntryEvent {
    fn is_deleted(&self) -> bool {
        self.request_body
            .as_deref()
            .is_some_and(|body| DELETION_MARKERS.iter().any(|marker| body.contains(marker)))
    }
}

/// Parses an ISO-8601 duration (`PT1H30M`, `P1DT2H`, `PT0.5S`) into whole
/// seconds, rounding half up.
///
/// Years and months have no fixed length and are rejected.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_iso8601_duration(text: &str) -> Option<u64> {
    const UNIT_SECONDS: [f64; 5] = [604_800.0, 86_400.0, 3_600.0, 60.0, 1.0];

    let caps = ISO_DURATION_RE.captures(text)?;
    if text.ends_with('T') || caps.iter().skip(1).all(|c| c.is_none()) {
        return None;
    }

    let mut total = 0.0;
    for (idx, unit) in UNIT_SECONDS.iter().enumerate() {
        if let Some(value) = caps.get(idx + 1) {
            total += value.as_str().parse::<f64>().ok()? * unit;
        }
    }

    Some(total.round() as u64)
}
