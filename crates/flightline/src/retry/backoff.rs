// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Delay schedule between retry attempts.
///
/// The schedule is indexed by the 1-based number of the attempt that just failed.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use flightline::retry::Backoff;
///
/// let linear = Backoff::Linear(Duration::from_secs(3));
/// assert_eq!(linear.delay_after(1), Duration::from_secs(3));
/// assert_eq!(linear.delay_after(2), Duration::from_secs(6));
///
/// let exponential = Backoff::Exponential {
///     base: Duration::from_secs(1),
///     max: Duration::from_secs(30),
/// };
/// assert_eq!(exponential.delay_after(3), Duration::from_secs(4));
/// assert_eq!(exponential.delay_after(10), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backoff {
    /// The same delay after every failure.
    ///
    /// **With `15s`:** `15s, 15s, 15s, ...`
    Constant(Duration),

    /// A delay proportional to the number of the failed attempt.
    ///
    /// **With `3s`:** `3s, 6s, 9s, ...`
    Linear(Duration),

    /// A delay doubling with every failure, capped at `max`.
    ///
    /// **With `1s` base and `30s` max:** `1s, 2s, 4s, 8s, 16s, 30s, 30s, ...`
    Exponential {
        /// Delay after the first failure.
        base: Duration,
        /// Upper bound for any delay.
        max: Duration,
    },
}

impl Backoff {
    /// Returns the delay to wait after attempt number `attempt` (1-based) failed.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match *self {
            Self::Constant(delay) => delay,
            Self::Linear(step) => step.saturating_mul(attempt),
            Self::Exponential { base, max } => {
                let factor = 1_u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1, 15)]
    #[case(2, 15)]
    #[case(3, 15)]
    fn constant_never_changes(#[case] attempt: u32, #[case] secs: u64) {
        assert_eq!(Backoff::Constant(Duration::from_secs(15)).delay_after(attempt), Duration::from_secs(secs));
    }

    #[rstest]
    #[case(0, 3_000)]
    #[case(1, 3_000)]
    #[case(2, 6_000)]
    #[case(3, 9_000)]
    fn linear_scales_with_attempt(#[case] attempt: u32, #[case] millis: u64) {
        assert_eq!(Backoff::Linear(Duration::from_secs(3)).delay_after(attempt), Duration::from_millis(millis));
    }

    #[rstest]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(3, 4)]
    #[case(5, 16)]
    #[case(6, 30)]
    #[case(40, 30)]
    fn exponential_doubles_until_capped(#[case] attempt: u32, #[case] secs: u64) {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
        };
        assert_eq!(backoff.delay_after(attempt), Duration::from_secs(secs));
    }
}
