//! Bounded retries with pluggable delays.
//!
//! [`repeat`] drives an async action until it succeeds or one of the terminal
//! conditions of its [`RetryPolicy`] is hit. Each call owns its own session
//! state, so concurrent sessions never share counters.
//!
//! ```text
//! Idle ─► Attempting ─► Success
//!            │  ▲
//!            ▼  │
//!          Delaying
//!            │
//!            └─► Aborted | RepeatedError | Exhausted | TimedOut
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// How the pause between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayStrategy {
    /// `delay` every time.
    Constant,
    /// `delay * attempt`.
    #[default]
    Linear,
    /// `delay * attempt²`.
    Exponential,
}

impl DelayStrategy {
    /// Pause before the attempt following failed attempt number `attempt`.
    pub fn delay(self, attempt: u32, base: Duration) -> Duration {
        match self {
            Self::Constant => base,
            Self::Linear => base.saturating_mul(attempt),
            Self::Exponential => base.saturating_mul(attempt.saturating_mul(attempt)),
        }
    }
}

/// Limits for one retry session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts. 0 means unlimited.
    pub max_retries: u32,
    /// Wall-clock budget since the first attempt. 0 means unlimited.
    pub timeout_ms: u64,
    /// Base delay fed to the strategy.
    pub delay_ms: u64,
    pub delay_strategy: DelayStrategy,
    /// Give up as soon as two consecutive failures carry the same message.
    pub abort_on_repeated_error: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            timeout_ms: 0,
            delay_ms: 1000,
            delay_strategy: DelayStrategy::Linear,
            abort_on_repeated_error: false,
        }
    }
}

impl RetryPolicy {
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.timeout_ms))
        }
    }
}

/// Verdict of an error classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryAction {
    Continue,
    /// Stop immediately regardless of the remaining budget.
    Abort,
}

/// Why a retry session gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    Aborted,
    RepeatedError,
    Exhausted,
    TimedOut,
}

impl Termination {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Aborted => "aborted",
            Self::RepeatedError => "aborted on repeated error",
            Self::Exhausted => "retries exhausted",
            Self::TimedOut => "timed out",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The last failure of a session that did not succeed.
#[derive(Debug)]
pub struct RetryError<E> {
    pub termination: Termination,
    /// Number of times the action was invoked.
    pub attempts: u32,
    pub error: E,
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        self.error
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} after {} attempt(s): {}",
            self.termination, self.attempts, self.error
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

struct RetrySession {
    attempt: u32,
    started: Instant,
    last_error: Option<String>,
}

impl RetrySession {
    fn start() -> Self {
        Self {
            attempt: 0,
            started: Instant::now(),
            last_error: None,
        }
    }

    fn terminate<E>(&self, termination: Termination, error: E) -> RetryError<E> {
        RetryError {
            termination,
            attempts: self.attempt,
            error,
        }
    }
}

/// Retries `action` under `policy`, treating every failure as retryable.
pub async fn repeat<T, E, F, Fut>(policy: &RetryPolicy, action: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    repeat_with(policy, |_| RetryAction::Continue, action).await
}

/// Retries `action` under `policy`, consulting `classify` after each failure.
pub async fn repeat_with<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    mut classify: C,
    mut action: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: FnMut(&E) -> RetryAction,
    E: fmt::Display,
{
    let mut session = RetrySession::start();
    let mut delay = Duration::ZERO;

    loop {
        if session.attempt > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let err = match action().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        session.attempt += 1;

        if classify(&err) == RetryAction::Abort {
            return Err(session.terminate(Termination::Aborted, err));
        }

        let message = err.to_string();
        if policy.abort_on_repeated_error && session.last_error.as_deref() == Some(message.as_str())
        {
            return Err(session.terminate(Termination::RepeatedError, err));
        }

        if policy.max_retries > 0 && session.attempt >= policy.max_retries {
            return Err(session.terminate(Termination::Exhausted, err));
        }

        if policy
            .timeout()
            .is_some_and(|timeout| session.started.elapsed() > timeout)
        {
            return Err(session.terminate(Termination::TimedOut, err));
        }

        delay = policy.delay_strategy.delay(session.attempt, policy.delay());
        tracing::debug!(
            attempt = session.attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %message,
            "attempt failed, retrying"
        );
        session.last_error = Some(message);
    }
}
