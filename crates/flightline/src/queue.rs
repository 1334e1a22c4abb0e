// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::{ScheduleError, Scheduled, Scheduler};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct QueueItem {
    enqueued_at: Instant,
    job: Job,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueueItem>,
    draining: bool,
    last_started: Option<Instant>,
}

struct QueueShared {
    min_interval: Duration,
    state: Mutex<QueueState>,
}

/// A process-wide FIFO queue that runs one job at a time.
///
/// Jobs start strictly in the order they were scheduled, and the start of each job is at
/// least `min_interval` after the start of the previous one, regardless of which key or caller
/// the jobs belong to. This is the pacing a fragile upstream needs when it tolerates roughly
/// one request per interval from the whole process.
///
/// A single background task drains the queue. It is spawned on the ambient tokio runtime when
/// a job arrives at an idle queue and exits once the queue is empty, so an idle queue costs
/// nothing. A job that panics is abandoned (its caller sees [`ScheduleError::Abandoned`]) and
/// draining continues with the next job.
///
/// Work a job does after its start, such as retrying the upstream call, can keep to the same
/// spacing through the queue's [`Pacer`].
///
/// Cloning a `SerialQueue` yields a handle to the same queue.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use flightline::{Scheduler, SerialQueue};
///
/// # async fn example() -> Result<(), flightline::ScheduleError> {
/// let queue = SerialQueue::new(Duration::from_secs(2));
///
/// let first = queue.schedule(|| async { "first" });
/// let second = queue.schedule(|| async { "second" });
///
/// // `second` starts no earlier than two seconds after `first` started.
/// assert_eq!(first.await?, "first");
/// assert_eq!(second.await?, "second");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SerialQueue {
    shared: Arc<QueueShared>,
}

impl SerialQueue {
    /// Creates a queue enforcing `min_interval` between consecutive job starts.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                min_interval,
                state: Mutex::default(),
            }),
        }
    }

    /// The minimum spacing between consecutive job starts.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.shared.min_interval
    }

    /// Returns a handle that spaces extra calls made by a running job.
    #[must_use]
    pub fn pacer(&self) -> Pacer {
        Pacer {
            shared: Arc::clone(&self.shared),
        }
    }

    fn push(&self, job: Job) {
        let start_drain = {
            let mut state = self.shared.state.lock();
            state.pending.push_back(QueueItem {
                enqueued_at: Instant::now(),
                job,
            });
            !std::mem::replace(&mut state.draining, true)
        };

        if start_drain {
            tokio::spawn(drain(Arc::clone(&self.shared)));
        }
    }
}

impl Scheduler for SerialQueue {
    fn schedule<T, F, Fut>(&self, job: F) -> Scheduled<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.push(Box::new(move || {
            async move {
                let output = job().await;
                // The caller may have stopped waiting; the job still counts as done.
                let _ = tx.send(output);
            }
            .boxed()
        }));

        Scheduled::new(async move { rx.await.map_err(|_dropped| ScheduleError::Abandoned) })
    }

    fn queued(&self) -> usize {
        self.shared.state.lock().pending.len()
    }
}

impl Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SerialQueue")
            .field("min_interval", &self.shared.min_interval)
            .field("pending", &state.pending.len())
            .field("draining", &state.draining)
            .finish()
    }
}

/// Shares a [`SerialQueue`]'s spacing with calls made from inside its jobs.
///
/// Each [`wait_turn`][Pacer::wait_turn] counts as a start: it waits until `min_interval` has
/// passed since the previous start (of a job or of another turn) and records itself as the
/// latest one. A job that calls the upstream several times takes a turn before every call after
/// the first, and the next queued job is then spaced from the last of those calls.
#[derive(Clone)]
pub struct Pacer {
    shared: Arc<QueueShared>,
}

impl Pacer {
    /// Waits until the queue's spacing allows another start, then records it.
    pub async fn wait_turn(&self) {
        take_turn(&self.shared).await;
    }
}

impl Debug for Pacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer")
            .field("min_interval", &self.shared.min_interval)
            .finish_non_exhaustive()
    }
}

/// Waits out `min_interval` since the latest start and stamps a new one under the same lock
/// that checked it.
async fn take_turn(shared: &QueueShared) -> Instant {
    loop {
        let wait = {
            let mut state = shared.state.lock();
            let wait = state
                .last_started
                .map_or(Duration::ZERO, |last| shared.min_interval.saturating_sub(last.elapsed()));
            if wait.is_zero() {
                let now = Instant::now();
                state.last_started = Some(now);
                return now;
            }
            wait
        };

        tokio::time::sleep(wait).await;
    }
}

async fn drain(shared: Arc<QueueShared>) {
    loop {
        let next = {
            let mut state = shared.state.lock();
            let next = state.pending.pop_front();
            if next.is_none() {
                state.draining = false;
            }
            next
        };
        let Some(item) = next else {
            return;
        };

        let started = take_turn(&shared).await;

        tracing::debug!(
            waited_ms = duration_ms(started.saturating_duration_since(item.enqueued_at)),
            "starting queued job"
        );

        let job = (item.job)();
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            tracing::error!("queued job panicked; continuing with the next job");
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    static_assertions::assert_impl_all!(SerialQueue: Send, Sync, Clone);

    #[tokio::test(start_paused = true)]
    async fn first_job_starts_immediately() {
        let queue = SerialQueue::new(Duration::from_secs(2));
        let begin = Instant::now();

        let started = queue.schedule(|| async { Instant::now() }).await.unwrap();

        assert_eq!(started, begin);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_queue_does_not_delay_after_interval_passed() {
        let queue = SerialQueue::new(Duration::from_secs(2));
        queue.schedule(|| async {}).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        let before = Instant::now();
        let started = queue.schedule(|| async { Instant::now() }).await.unwrap();

        assert_eq!(started, before);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_reports_pending_jobs() {
        let queue = SerialQueue::new(Duration::from_secs(2));
        let a = queue.schedule(|| async {});
        let b = queue.schedule(|| async {});
        let c = queue.schedule(|| async {});

        assert_eq!(queue.queued(), 3);
        let _ = tokio::join!(a, b, c);
        assert_eq!(queue.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_job_is_abandoned_and_drain_continues() {
        let queue = SerialQueue::new(Duration::from_millis(10));
        let order = Arc::new(StdMutex::new(Vec::new()));

        let boom: Scheduled<()> = queue.schedule(|| async {
            panic!("upstream exploded");
        });
        let order_clone = Arc::clone(&order);
        let next = queue.schedule(move || async move {
            order_clone.lock().unwrap().push("next");
            7
        });

        assert_eq!(boom.await, Err(ScheduleError::Abandoned));
        assert_eq!(next.await, Ok(7));
        assert_eq!(*order.lock().unwrap(), vec!["next"]);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_does_not_stop_the_job() {
        let queue = SerialQueue::new(Duration::from_millis(10));
        let ran = Arc::new(StdMutex::new(false));

        let ran_clone = Arc::clone(&ran);
        drop(queue.schedule(move || async move {
            *ran_clone.lock().unwrap() = true;
        }));
        queue.schedule(|| async {}).await.unwrap();

        assert!(*ran.lock().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn paced_calls_inside_a_job_delay_the_next_job() {
        let queue = SerialQueue::new(Duration::from_secs(2));
        let pacer = queue.pacer();
        let begin = Instant::now();

        let first = queue.schedule(move || async move {
            let mut calls = vec![begin.elapsed()];
            pacer.wait_turn().await;
            calls.push(begin.elapsed());
            calls
        });
        let second = queue.schedule(move || async move { begin.elapsed() });

        assert_eq!(first.await.unwrap(), vec![Duration::ZERO, Duration::from_secs(2)]);
        assert_eq!(second.await.unwrap(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_does_not_wait_once_the_interval_passed() {
        let queue = SerialQueue::new(Duration::from_secs(2));
        let pacer = queue.pacer();
        let begin = Instant::now();

        let elapsed = queue
            .schedule(move || async move {
                tokio::time::sleep(Duration::from_secs(3)).await;
                pacer.wait_turn().await;
                begin.elapsed()
            })
            .await
            .unwrap();

        assert_eq!(elapsed, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_turns_are_spaced() {
        let queue = SerialQueue::new(Duration::from_secs(1));
        let pacer = queue.pacer();
        let begin = Instant::now();

        let (a, b, c) = tokio::join!(
            async {
                pacer.wait_turn().await;
                begin.elapsed()
            },
            async {
                pacer.wait_turn().await;
                begin.elapsed()
            },
            async {
                pacer.wait_turn().await;
                begin.elapsed()
            }
        );

        let mut starts = vec![a, b, c];
        starts.sort();
        assert_eq!(starts, vec![Duration::ZERO, Duration::from_secs(1), Duration::from_secs(2)]);
    }
}
