//! Overtime allocation.
//!
//! Turns the duration of a finished time entry into one or two worklog
//! allocations.
//!
//! # Algorithm Summary
//!
//! 1. Convert seconds to minutes and optionally round to the alignment grid
//! 2. Drop entries shorter than a minute
//! 3. Token-marked entries are multiplied as a whole
//! 4. Unmarked entries longer than the threshold are split into a regular
//!    part (exactly the threshold) and a multiplied overtime part
//!
//! Minute arithmetic stays in floating point until each allocation is emitted.

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::types::{AllocationKind, CanonicalRecord, TimeAllocation, ValidationError};

/// Configuration for overtime allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Round durations to the nearest multiple of this many minutes.
    /// Default: off.
    pub align_to_minutes: Option<u32>,

    /// Marker in a description that flags the whole entry as overtime.
    /// Default: `[OT]`.
    pub overtime_token: String,

    /// Factor applied to overtime minutes.
    /// Default: 1.5.
    pub overtime_multiplier: f64,

    /// Hours after which an unmarked entry is split. 0 disables splitting.
    /// Default: 8.
    pub overtime_threshold_hours: f64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            align_to_minutes: None,
            overtime_token: "[OT]".to_string(),
            overtime_multiplier: 1.5,
            overtime_threshold_hours: 8.0,
        }
    }
}

impl AllocationConfig {
    /// Checks that every value can drive the allocator.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.overtime_token.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "overtime_token",
            });
        }
        if !self.overtime_multiplier.is_finite() || self.overtime_multiplier <= 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "overtime_multiplier",
                expected: "a finite number greater than 0",
                value: self.overtime_multiplier,
            });
        }
        if !self.overtime_threshold_hours.is_finite() || self.overtime_threshold_hours < 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "overtime_threshold_hours",
                expected: "a finite number of at least 0",
                value: self.overtime_threshold_hours,
            });
        }
        if self.align_to_minutes == Some(0) {
            return Err(ValidationError::OutOfRange {
                field: "align_to_minutes",
                expected: "greater than 0 when set",
                value: 0.0,
            });
        }
        Ok(())
    }

    fn threshold_minutes(&self) -> f64 {
        self.overtime_threshold_hours * 60.0
    }
}

/// Rounds `minutes` to the nearest multiple of `grid`, halves rounding up.
pub fn align_minutes(minutes: f64, grid: u32) -> f64 {
    let grid = f64::from(grid);
    (minutes / grid).round() * grid
}

/// Splits a record into worklog allocations.
///
/// Returns an empty vector when the record has no duration or start time, or
/// when the entry is shorter than a minute after alignment. When an entry is
/// split, the overtime allocation comes first.
pub fn allocate(record: &CanonicalRecord, config: &AllocationConfig) -> Vec<TimeAllocation> {
    let (Some(seconds), Some(start)) = (record.duration_seconds, record.start) else {
        return Vec::new();
    };

    #[allow(clippy::cast_precision_loss)]
    let mut minutes = seconds as f64 / 60.0;

    if let Some(grid) = config.align_to_minutes.filter(|grid| *grid > 0) {
        let original = minutes;
        minutes = align_minutes(minutes, grid);
        tracing::debug!(original, rounded = minutes, grid, "aligned duration");
    }

    if minutes < 1.0 {
        return Vec::new();
    }

    // Neither portion may exceed what a worklog can carry.
    if minutes * config.overtime_multiplier.max(1.0) > f64::from(u32::MAX) {
        tracing::warn!(minutes, "duration too large to log");
        return Vec::new();
    }

    let description = record.description.trim();
    let threshold = config.threshold_minutes();

    if description.contains(&config.overtime_token) {
        tracing::debug!("overtime token found, applying multiplier to whole entry");
        return emit(
            description.to_string(),
            start,
            minutes * config.overtime_multiplier,
            AllocationKind::Overtime,
        )
        .into_iter()
        .collect();
    }

    if threshold > 0.0 && minutes > threshold {
        let overtime_minutes = (minutes - threshold) * config.overtime_multiplier;
        let overtime = match overtime_start(start, threshold) {
            Some(started) => emit(
                format!("{description} {}", config.overtime_token),
                started,
                overtime_minutes,
                AllocationKind::Overtime,
            ),
            None => {
                tracing::warn!(%start, threshold, "overtime start out of range, dropping overtime");
                None
            }
        };
        let regular = emit(
            description.to_string(),
            start,
            threshold,
            AllocationKind::Regular,
        );
        return overtime.into_iter().chain(regular).collect();
    }

    emit(description.to_string(), start, minutes, AllocationKind::Regular)
        .into_iter()
        .collect()
}

/// Builds an allocation, or `None` for spans under a minute.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn emit(
    description: String,
    started: DateTime<FixedOffset>,
    minutes: f64,
    kind: AllocationKind,
) -> Option<TimeAllocation> {
    if minutes.is_nan() || minutes < 1.0 {
        return None;
    }
    Some(TimeAllocation::new(
        description,
        started,
        minutes.round() as u32,
        kind,
    ))
}

/// `start` shifted by `minutes`, or `None` when the result is not representable.
#[allow(clippy::cast_possible_truncation)]
fn overtime_start(start: DateTime<FixedOffset>, minutes: f64) -> Option<DateTime<FixedOffset>> {
    let offset = Duration::try_milliseconds((minutes * 60_000.0).round() as i64)?;
    start.checked_add_signed(offset)
}
