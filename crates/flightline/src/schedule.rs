// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;

/// Decides when a unit of upstream work may run.
///
/// A scheduler accepts a job and returns a [`Scheduled`] handle that resolves with the job's
/// output once the job has had its turn and completed. Implementations differ in *when* jobs
/// start: [`SerialQueue`][crate::SerialQueue] runs them one at a time with a minimum spacing,
/// [`ConcurrencyLimiter`][crate::ConcurrencyLimiter] runs up to a fixed number at once.
///
/// The job is registered when `schedule` is called, not when the returned handle is first
/// polled, so the order of `schedule` calls is the order in which a FIFO scheduler starts jobs.
pub trait Scheduler: Send + Sync + 'static {
    /// Registers `job` and returns a handle to its eventual output.
    fn schedule<T, F, Fut>(&self, job: F) -> Scheduled<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static;

    /// Number of jobs registered but not yet started.
    fn queued(&self) -> usize;
}

/// The reason a scheduled job produced no output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ScheduleError {
    /// The job was dropped before delivering a result, typically because it panicked.
    #[error("scheduled job was abandoned before producing a result")]
    Abandoned,

    /// The scheduler was shut down before the job could start.
    #[error("scheduler closed before the job could start")]
    Closed,
}

/// Handle to the output of a job registered with a [`Scheduler`].
#[must_use = "a scheduled job's output is only observable by awaiting the handle"]
pub struct Scheduled<T> {
    inner: BoxFuture<'static, Result<T, ScheduleError>>,
}

impl<T> Scheduled<T> {
    pub(crate) fn new(inner: impl Future<Output = Result<T, ScheduleError>> + Send + 'static) -> Self {
        Self { inner: Box::pin(inner) }
    }
}

impl<T> Future for Scheduled<T> {
    type Output = Result<T, ScheduleError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl<T> Debug for Scheduled<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduled").finish_non_exhaustive()
    }
}
