// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// How a failed attempt may be recovered from.
///
/// Errors describe their own recoverability by implementing [`Recover`]; the retry loop uses
/// the kind to choose between giving up, the transient backoff schedule and the rate-limit
/// backoff schedule. An explicit [`delay`][RecoveryInfo::delay] overrides both schedules.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use flightline::retry::{RecoveryInfo, RecoveryKind};
///
/// let recovery = RecoveryInfo::rate_limited().delay(Duration::from_secs(5));
/// assert_eq!(recovery.kind(), RecoveryKind::RateLimited);
/// assert_eq!(recovery.get_delay(), Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecoveryInfo {
    kind: RecoveryKind,
    delay: Option<Duration>,
}

/// The kind of recovery possible after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RecoveryKind {
    /// The failure is permanent; retrying will not change the outcome.
    Never,

    /// The failure is transient (network error, server error, timeout).
    Retry,

    /// The upstream asked us to slow down.
    RateLimited,
}

impl RecoveryInfo {
    /// A permanent failure.
    #[must_use]
    pub const fn never() -> Self {
        Self {
            kind: RecoveryKind::Never,
            delay: None,
        }
    }

    /// A transient failure, retried on the transient backoff schedule.
    #[must_use]
    pub const fn retry() -> Self {
        Self {
            kind: RecoveryKind::Retry,
            delay: None,
        }
    }

    /// A rate-limit rejection, retried on the rate-limit backoff schedule.
    #[must_use]
    pub const fn rate_limited() -> Self {
        Self {
            kind: RecoveryKind::RateLimited,
            delay: None,
        }
    }

    /// Overrides the backoff schedule with an explicit delay, e.g. from a `Retry-After` header.
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The recovery kind.
    #[must_use]
    pub const fn kind(&self) -> RecoveryKind {
        self.kind
    }

    /// The explicit delay, if one was set.
    #[must_use]
    pub const fn get_delay(&self) -> Option<Duration> {
        self.delay
    }
}

/// Classifies an error for the retry loop.
pub trait Recover {
    /// Returns how the failed attempt that produced `self` may be recovered from.
    fn recovery(&self) -> RecoveryInfo;
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_carry_no_delay() {
        for (info, kind) in [
            (RecoveryInfo::never(), RecoveryKind::Never),
            (RecoveryInfo::retry(), RecoveryKind::Retry),
            (RecoveryInfo::rate_limited(), RecoveryKind::RateLimited),
        ] {
            assert_eq!(info.kind(), kind);
            assert_eq!(info.get_delay(), None);
        }
    }

    #[test]
    fn delay_keeps_the_kind() {
        let info = RecoveryInfo::retry().delay(Duration::from_millis(250));

        assert_eq!(info.kind(), RecoveryKind::Retry);
        assert_eq!(info.get_delay(), Some(Duration::from_millis(250)));
    }
}
