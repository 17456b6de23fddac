//! Fan-out of allocations to downstream targets.
//!
//! Each resolved target gets its own background retry session. Sessions are
//! tracked so the process can wait for them on shutdown, but callers never
//! wait for delivery.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::task::TaskTracker;

use crate::directive::extract_directive;
use crate::retry::{RetryAction, RetryPolicy, repeat_with};
use crate::types::TimeAllocation;

/// Failure reported by a publish capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    /// Permanent failure. Retrying cannot help.
    #[error("aborted: {0}")]
    Abort(String),
    /// Retryable failure such as a network error or unexpected status.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl PublishError {
    pub const fn retry_action(&self) -> RetryAction {
        match self {
            Self::Abort(_) => RetryAction::Abort,
            Self::Transient(_) => RetryAction::Continue,
        }
    }
}

/// A downstream system that accepts worklogs.
///
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, allocation: &TimeAllocation) -> Result<(), PublishError>;
}

/// Stand-in for a known target that has no credentials; every publish aborts.
#[derive(Debug, Clone)]
pub struct Unconfigured {
    name: String,
}

impl Unconfigured {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Publisher for Unconfigured {
    async fn publish(&self, _allocation: &TimeAllocation) -> Result<(), PublishError> {
        Err(PublishError::Abort(format!("{} not configured", self.name)))
    }
}

/// Where allocations go when their description names no targets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultTargets {
    /// Every registered target.
    #[default]
    All,
    /// Only the listed targets.
    Only(Vec<String>),
}

/// A registered publisher with its retry policy.
#[derive(Clone)]
pub struct Target {
    pub publisher: Arc<dyn Publisher>,
    pub policy: RetryPolicy,
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Named downstream targets.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<String, Target>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        publisher: Arc<dyn Publisher>,
        policy: RetryPolicy,
    ) -> &mut Self {
        self.targets
            .insert(name.into(), Target { publisher, policy });
        self
    }

    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// An allocation with its directive removed and the targets it should reach.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub allocation: TimeAllocation,
    pub targets: Vec<(String, Target)>,
}

/// Spawns one retry session per resolved target.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<TargetRegistry>,
    default_targets: DefaultTargets,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(registry: TargetRegistry, default_targets: DefaultTargets) -> Self {
        Self {
            registry: Arc::new(registry),
            default_targets,
            tracker: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// Resolves targets without dispatching.
    ///
    /// Names missing from the registry are skipped with a warning.
    pub fn resolve(&self, mut allocation: TimeAllocation) -> Resolved {
        let names: Vec<String> = match extract_directive(&allocation.description) {
            Some(directive) => {
                allocation.description = directive.description;
                directive.targets
            }
            None => match &self.default_targets {
                DefaultTargets::All => self.registry.names().map(String::from).collect(),
                DefaultTargets::Only(names) => names.clone(),
            },
        };

        let mut targets: Vec<(String, Target)> = Vec::with_capacity(names.len());
        for name in names {
            if targets.iter().any(|(seen, _)| *seen == name) {
                continue;
            }
            match self.registry.get(&name) {
                Some(target) => targets.push((name, target.clone())),
                None => tracing::warn!(target_name = %name, "target not found"),
            }
        }

        Resolved {
            allocation,
            targets,
        }
    }

    /// Dispatches an allocation in the background and returns the number of
    /// sessions started.
    pub fn dispatch(&self, allocation: TimeAllocation) -> usize {
        let Resolved {
            allocation,
            targets,
        } = self.resolve(allocation);
        let allocation = Arc::new(allocation);
        let count = targets.len();

        for (name, target) in targets {
            let allocation = Arc::clone(&allocation);
            self.tracker.spawn(async move {
                deliver(&name, &target, &allocation).await;
            });
        }

        count
    }

    /// Number of sessions still in flight.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stops accepting work and waits for in-flight sessions to settle.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn deliver(name: &str, target: &Target, allocation: &TimeAllocation) {
    let result = repeat_with(&target.policy, PublishError::retry_action, || {
        target.publisher.publish(allocation)
    })
    .await;

    match result {
        Ok(()) => tracing::info!(
            target_name = %name,
            minutes = allocation.time_spent_minutes,
            kind = %allocation.kind,
            "worklog delivered"
        ),
        Err(err) => tracing::error!(
            target_name = %name,
            attempts = err.attempts,
            termination = %err.termination,
            error = %err.error,
            "failed to deliver worklog"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::DateTime;

    use crate::types::AllocationKind;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<TimeAllocation>>,
    }

    #[async_trait]
    impl Publisher for Recorder {
        async fn publish(&self, allocation: &TimeAllocation) -> Result<(), PublishError> {
            self.seen.lock().unwrap().push(allocation.clone());
            Ok(())
        }
    }

    struct Flaky {
        calls: AtomicU32,
        error: PublishError,
    }

    #[async_trait]
    impl Publisher for Flaky {
        async fn publish(&self, _allocation: &TimeAllocation) -> Result<(), PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        }
    }

    fn allocation(description: &str) -> TimeAllocation {
        TimeAllocation::new(
            description,
            DateTime::parse_from_rfc3339("2024-03-04T09:00:00Z").unwrap(),
            30,
            AllocationKind::Regular,
        )
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            delay_ms: 10,
            ..RetryPolicy::default()
        }
    }

    fn registry_with(names: &[&str]) -> (TargetRegistry, Vec<Arc<Recorder>>) {
        let mut registry = TargetRegistry::new();
        let mut recorders = Vec::new();
        for name in names {
            let recorder = Arc::new(Recorder::default());
            registry.register(*name, recorder.clone(), quick_policy());
            recorders.push(recorder);
        }
        (registry, recorders)
    }

    #[tokio::test]
    async fn directive_selects_target_and_is_stripped() {
        let (registry, recorders) = registry_with(&["billing", "jira"]);
        let dispatcher = Dispatcher::new(registry, DefaultTargets::All);

        assert_eq!(dispatcher.dispatch(allocation("Fix bug {jira}")), 1);
        dispatcher.shutdown().await;

        assert!(recorders[0].seen.lock().unwrap().is_empty());
        let seen = recorders[1].seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].description, "Fix bug");
        assert_eq!(seen[0].time_spent_minutes, 30);
    }

    #[tokio::test]
    async fn no_directive_reaches_every_target_by_default() {
        let (registry, recorders) = registry_with(&["billing", "jira"]);
        let dispatcher = Dispatcher::new(registry, DefaultTargets::All);

        assert_eq!(dispatcher.dispatch(allocation("ABC-1 review")), 2);
        dispatcher.shutdown().await;

        for recorder in recorders {
            assert_eq!(recorder.seen.lock().unwrap()[0].description, "ABC-1 review");
        }
    }

    #[test]
    fn default_policy_can_name_a_single_target() {
        let (registry, _) = registry_with(&["billing", "jira"]);
        let dispatcher = Dispatcher::new(registry, DefaultTargets::Only(vec!["jira".into()]));

        let resolved = dispatcher.resolve(allocation("ABC-1 review"));
        let names: Vec<_> = resolved.targets.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["jira"]);
    }

    #[test]
    fn unknown_and_duplicate_names_are_skipped() {
        let (registry, _) = registry_with(&["jira"]);
        let dispatcher = Dispatcher::new(registry, DefaultTargets::All);

        let resolved = dispatcher.resolve(allocation("x {nope, jira, jira}"));
        let names: Vec<_> = resolved.targets.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["jira"]);
        assert_eq!(resolved.allocation.description, "x");
    }

    #[tokio::test(start_paused = true)]
    async fn failing_target_does_not_block_siblings() {
        let (mut registry, recorders) = registry_with(&["jira"]);
        let flaky = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            error: PublishError::Transient("503".into()),
        });
        registry.register("broken", flaky.clone(), quick_policy());
        let dispatcher = Dispatcher::new(registry, DefaultTargets::All);

        assert_eq!(dispatcher.dispatch(allocation("ABC-1")), 2);
        dispatcher.shutdown().await;

        assert_eq!(flaky.calls.load(Ordering::SeqCst), 5);
        assert_eq!(recorders[0].seen.lock().unwrap().len(), 1);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_is_not_retried() {
        let flaky = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            error: PublishError::Abort("no issue".into()),
        });
        let mut registry = TargetRegistry::new();
        registry.register("jira", flaky.clone(), quick_policy());
        let dispatcher = Dispatcher::new(registry, DefaultTargets::All);

        dispatcher.dispatch(allocation("no key here"));
        dispatcher.shutdown().await;

        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unconfigured_target_aborts() {
        let err = Unconfigured::new("jira")
            .publish(&allocation("ABC-1"))
            .await
            .unwrap_err();
        assert_eq!(err, PublishError::Abort("jira not configured".into()));
        assert_eq!(err.retry_action(), RetryAction::Abort);
    }

    #[test]
    fn default_targets_deserialize() {
        let all: DefaultTargets = serde_json::from_str(r#""all""#).unwrap();
        assert_eq!(all, DefaultTargets::All);
        let only: DefaultTargets = serde_json::from_str(r#"{"only": ["jira"]}"#).unwrap();
        assert_eq!(only, DefaultTargets::Only(vec!["jira".into()]));
    }
}
