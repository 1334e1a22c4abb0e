// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use flightline::retry::{AttemptError, Recover, RecoveryInfo, RetryError};
use flightline::{GuardError, ScheduleError};

/// Why a single Data API call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum FaceitError {
    /// The resource does not exist. Not retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// The API key was rejected (HTTP 401 or 403). Not retried.
    #[error("API key rejected with HTTP {0}")]
    Unauthorized(u16),

    /// The API asked us to slow down (HTTP 429).
    #[error("rate limited by the FACEIT API")]
    RateLimited {
        /// Server-requested wait from `Retry-After`, already capped.
        retry_after: Option<Duration>,
    },

    /// The API answered with an unexpected status.
    #[error("FACEIT API returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Start of the response body.
        body: String,
    },

    /// The request never produced a response.
    #[error("request to the FACEIT API failed: {0}")]
    Transport(String),

    /// The API answered 2xx with a body that is not JSON.
    #[error("FACEIT API returned an invalid body: {0}")]
    InvalidBody(String),
}

impl Recover for FaceitError {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Self::NotFound(_) | Self::Unauthorized(_) => RecoveryInfo::never(),
            Self::RateLimited { retry_after: Some(wait) } => RecoveryInfo::rate_limited().delay(*wait),
            Self::RateLimited { retry_after: None } => RecoveryInfo::rate_limited(),
            Self::Status { .. } | Self::Transport(_) | Self::InvalidBody(_) => RecoveryInfo::retry(),
        }
    }
}

/// Why a [`FaceitClient`][crate::FaceitClient] operation failed.
///
/// Callers that coalesced onto the same API call receive clones of the same error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The API rejected the request in a way retrying cannot fix.
    #[error(transparent)]
    Api(FaceitError),

    /// Every attempt failed.
    #[error("FACEIT request failed after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// The final attempt's failure.
        last: AttemptError<FaceitError>,
    },

    /// The request was dropped before it could run.
    #[error(transparent)]
    Abandoned(ScheduleError),

    /// An argument was rejected before any request was made.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// Argument name.
        name: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl Error {
    /// Returns `true` if the requested resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api(FaceitError::NotFound(_)))
    }

    /// Returns `true` if the request ultimately failed because of rate limiting.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Self::Exhausted {
                last: AttemptError::Failed(FaceitError::RateLimited { .. }),
                ..
            }
        )
    }
}

impl From<GuardError<RetryError<FaceitError>>> for Error {
    fn from(error: GuardError<RetryError<FaceitError>>) -> Self {
        match error {
            GuardError::Load(RetryError::Permanent(error)) => Self::Api(error),
            GuardError::Load(RetryError::Exhausted { attempts, last }) => Self::Exhausted { attempts, last },
            GuardError::Schedule(error) => Self::Abandoned(error),
        }
    }
}
