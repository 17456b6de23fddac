//! Core domain logic for the worklog relay.
//!
//! This crate contains the fundamental types and logic for:
//! - Normalization: classifying webhook events and projecting time entries
//! - Allocation: rounding durations and splitting off overtime
//! - Retry: bounded, policy-driven retries of async actions
//! - Dispatch: fanning allocations out to named downstream targets

mod allocation;
pub mod directive;
pub mod dispatch;
pub mod event;
pub mod pipeline;
pub mod retry;
mod types;

pub use allocation::{AllocationConfig, align_minutes, allocate};
pub use dispatch::{DefaultTargets, Dispatcher, PublishError, Publisher, TargetRegistry};
pub use event::{EventVariant, IgnoreReason, InboundEvent};
pub use pipeline::{EventOutcome, plan_event};
pub use retry::{DelayStrategy, RetryError, RetryPolicy};
pub use types::{AllocationKind, CanonicalRecord, TimeAllocation, ValidationError};
