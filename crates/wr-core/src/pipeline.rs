//! From webhook event to worklog allocations.

use crate::allocation::{AllocationConfig, allocate};
use crate::event::{IgnoreReason, InboundEvent};
use crate::types::{CanonicalRecord, TimeAllocation};

/// What became of one inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// An ignore rule matched.
    Ignored(IgnoreReason),
    /// The event carried no usable duration.
    NoDuration(CanonicalRecord),
    /// The entry was too short to log after rounding.
    TooShort(CanonicalRecord),
    /// Allocations to dispatch, overtime first.
    Allocated(Vec<TimeAllocation>),
}

/// Runs the ignore checks, projection and allocation for one event.
///
/// Never fails. Every reason for not producing a worklog is reported as an
/// outcome for the caller to log.
pub fn plan_event(event: &InboundEvent, config: &AllocationConfig) -> EventOutcome {
    if let Some(reason) = event.should_ignore() {
        return EventOutcome::Ignored(reason);
    }

    let record = event.project();
    if record.duration_seconds.is_none() || record.start.is_none() {
        return EventOutcome::NoDuration(record);
    }

    let allocations = allocate(&record, config);
    if allocations.is_empty() {
        EventOutcome::TooShort(record)
    } else {
        EventOutcome::Allocated(allocations)
    }
}
