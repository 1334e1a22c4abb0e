// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Bounded retries with per-attempt timeouts and separate backoff schedules for transient
//! failures and rate-limit rejections.
//!
//! The operation is described by a closure producing one future per [`Attempt`]. Its error type
//! classifies itself through [`Recover`]: permanent failures end the loop at once, transient
//! failures and attempt timeouts wait on the transient schedule, and rate-limit rejections wait
//! on the (typically longer) rate-limit schedule. No delay follows the final attempt.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use flightline::retry::{Backoff, Recover, RecoveryInfo, RetryPolicy};
//!
//! #[derive(Debug)]
//! struct Throttled;
//!
//! impl Recover for Throttled {
//!     fn recovery(&self) -> RecoveryInfo {
//!         RecoveryInfo::rate_limited()
//!     }
//! }
//!
//! # async fn example() {
//! let policy = RetryPolicy::new()
//!     .max_attempts(3)
//!     .rate_limit_backoff(Backoff::Constant(Duration::from_secs(15)));
//!
//! let result = policy
//!     .run("lookup", |attempt| async move {
//!         if attempt.is_last() { Ok(42) } else { Err(Throttled) }
//!     })
//!     .await;
//! assert_eq!(result.ok(), Some(42));
//! # }
//! ```

mod backoff;
mod recovery;

use std::time::Duration;

pub use backoff::Backoff;
pub use recovery::{Recover, RecoveryInfo, RecoveryKind};

use crate::Pacer;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(8);
const DEFAULT_TRANSIENT_BACKOFF: Backoff = Backoff::Linear(Duration::from_secs(3));
const DEFAULT_RATE_LIMIT_BACKOFF: Backoff = Backoff::Constant(Duration::from_secs(15));

/// Information about the attempt being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    index: u32,
    max_attempts: u32,
}

impl Attempt {
    const fn first(max_attempts: u32) -> Self {
        Self { index: 0, max_attempts }
    }

    const fn next(self) -> Self {
        Self {
            index: self.index + 1,
            max_attempts: self.max_attempts,
        }
    }

    /// Zero-based index of this attempt.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// One-based number of this attempt.
    #[must_use]
    pub const fn number(&self) -> u32 {
        self.index + 1
    }

    /// Returns `true` for the first attempt.
    #[must_use]
    pub const fn is_first(&self) -> bool {
        self.index == 0
    }

    /// Returns `true` if no further attempt follows this one.
    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.index + 1 >= self.max_attempts
    }
}

/// The failure of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError<E> {
    /// The operation returned an error.
    #[error("attempt failed: {0}")]
    Failed(E),

    /// The operation did not finish within the attempt timeout.
    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),
}

/// The outcome of a retry loop that did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError<E> {
    /// The operation failed permanently; no further attempt was made.
    #[error("permanent failure: {0}")]
    Permanent(E),

    /// Every allowed attempt failed.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The failure of the final attempt.
        last: AttemptError<E>,
    },
}

impl<E> RetryError<E> {
    /// Returns the error returned by the operation, if the final failure was not a timeout.
    #[must_use]
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Permanent(error)
            | Self::Exhausted {
                last: AttemptError::Failed(error),
                ..
            } => Some(error),
            Self::Exhausted {
                last: AttemptError::TimedOut(_),
                ..
            } => None,
        }
    }
}

/// Retry policy: how many attempts, how long each may take, and how long to wait in between.
///
/// Defaults: 3 attempts, 8 seconds per attempt, linear 3 second steps between transient
/// failures and a constant 15 seconds after a rate-limit rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    attempt_timeout: Duration,
    transient_backoff: Backoff,
    rate_limit_backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            transient_backoff: DEFAULT_TRANSIENT_BACKOFF,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the total number of attempts, including the first. Values below 1 are treated as 1.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the time limit for a single attempt.
    #[must_use]
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Sets the schedule used after transient failures and timeouts.
    #[must_use]
    pub fn transient_backoff(mut self, backoff: Backoff) -> Self {
        self.transient_backoff = backoff;
        self
    }

    /// Sets the schedule used after rate-limit rejections.
    #[must_use]
    pub fn rate_limit_backoff(mut self, backoff: Backoff) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    /// The total number of attempts.
    #[must_use]
    pub fn get_max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The time limit for a single attempt.
    #[must_use]
    pub fn get_attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Returns the delay before the attempt following `failed`.
    #[must_use]
    pub fn delay_after(&self, failed: Attempt, recovery: &RecoveryInfo) -> Duration {
        if let Some(delay) = recovery.get_delay() {
            return delay;
        }

        match recovery.kind() {
            RecoveryKind::RateLimited => self.rate_limit_backoff.delay_after(failed.number()),
            _ => self.transient_backoff.delay_after(failed.number()),
        }
    }

    /// Runs `operation` until it succeeds, fails permanently or runs out of attempts.
    ///
    /// `name` identifies the operation in log events.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Permanent`] as soon as an attempt fails with an error classified
    /// as [`RecoveryKind::Never`], and [`RetryError::Exhausted`] when the final attempt fails.
    pub async fn run<T, E, F, Fut>(&self, name: &str, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Recover,
    {
        self.run_with(name, None, operation).await
    }

    /// Like [`run`][Self::run], but every attempt after the first also waits for a turn from
    /// `pacer` once its backoff has elapsed.
    ///
    /// Use this from inside a [`SerialQueue`][crate::SerialQueue] job so retries keep the
    /// queue's spacing. The first attempt is not paced since the job start already was. Waiting
    /// for the turn does not count against the attempt timeout.
    ///
    /// # Errors
    ///
    /// Same as [`run`][Self::run].
    pub async fn run_paced<T, E, F, Fut>(&self, name: &str, pacer: &Pacer, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Recover,
    {
        self.run_with(name, Some(pacer), operation).await
    }

    async fn run_with<T, E, F, Fut>(&self, name: &str, pacer: Option<&Pacer>, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Recover,
    {
        let mut attempt = Attempt::first(self.max_attempts);

        loop {
            let (failure, recovery) = match tokio::time::timeout(self.attempt_timeout, operation(attempt)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => {
                    let recovery = error.recovery();
                    if recovery.kind() == RecoveryKind::Never {
                        return Err(RetryError::Permanent(error));
                    }
                    (AttemptError::Failed(error), recovery)
                }
                Err(_elapsed) => (AttemptError::TimedOut(self.attempt_timeout), RecoveryInfo::retry()),
            };

            if attempt.is_last() {
                tracing::warn!(
                    operation = name,
                    attempts = attempt.number(),
                    rate_limited = recovery.kind() == RecoveryKind::RateLimited,
                    "giving up"
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt.number(),
                    last: failure,
                });
            }

            let delay = self.delay_after(attempt, &recovery);
            tracing::warn!(
                operation = name,
                attempt = attempt.number(),
                rate_limited = recovery.kind() == RecoveryKind::RateLimited,
                timed_out = matches!(failure, AttemptError::TimedOut(_)),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "attempt failed, retrying"
            );

            tokio::time::sleep(delay).await;
            if let Some(pacer) = pacer {
                pacer.wait_turn().await;
            }
            attempt = attempt.next();
        }
    }
}
