// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;

use crate::{ScheduleError, Scheduled, Scheduler};

/// Runs at most a fixed number of jobs at the same time.
///
/// Unlike [`SerialQueue`][crate::SerialQueue], the limiter does not serialize work or space
/// job starts apart; it only bounds parallelism. Jobs waiting for a slot are admitted in
/// arrival order. This suits upstreams that tolerate modest parallelism but fall over under a
/// burst.
///
/// Cloning a `ConcurrencyLimiter` yields a handle sharing the same slots.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    slots: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    max_in_flight: usize,
}

impl ConcurrencyLimiter {
    /// Creates a limiter admitting up to `max_in_flight` simultaneous jobs.
    ///
    /// # Panics
    ///
    /// Panics if `max_in_flight` is 0.
    #[must_use]
    pub fn new(max_in_flight: usize) -> Self {
        assert!(max_in_flight > 0, "max_in_flight must be at least 1");
        Self {
            slots: Arc::new(Semaphore::new(max_in_flight)),
            waiting: Arc::default(),
            max_in_flight,
        }
    }

    /// The maximum number of simultaneous jobs.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Number of jobs currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.slots.available_permits()
    }
}

impl Scheduler for ConcurrencyLimiter {
    fn schedule<T, F, Fut>(&self, job: F) -> Scheduled<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let slots = Arc::clone(&self.slots);
        let waiting = WaitingGuard::enter(&self.waiting);

        Scheduled::new(async move {
            let permit = slots.acquire_owned().await;
            drop(waiting);
            let _permit = permit.map_err(|_closed| ScheduleError::Closed)?;
            Ok(job().await)
        })
    }

    fn queued(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }
}

/// Counts a job as waiting until it is admitted or its handle is dropped.
struct WaitingGuard(Arc<AtomicUsize>);

impl WaitingGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for WaitingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
