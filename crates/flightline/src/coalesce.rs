// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

type SharedWork<T> = Shared<BoxFuture<'static, T>>;

struct InFlight<T> {
    id: u64,
    work: SharedWork<T>,
}

/// Merges concurrent requests for the same key into a single execution.
///
/// The first caller for a key (the leader) supplies the work; every caller arriving while that
/// work is still running receives a handle to the *same* execution instead of starting its own.
/// Once the work settles, the key is released and the next caller starts fresh.
///
/// The factory passed by the leader is invoked synchronously inside
/// [`execute`][Coalescer::execute], so side effects performed while building the future (such as
/// registering with a [`Scheduler`][crate::Scheduler]) happen in call order. The resulting
/// future is then driven by a background task on the ambient tokio runtime: it runs to
/// completion even if every caller stops waiting.
///
/// Cloning a `Coalescer` yields a handle to the same set of in-flight executions.
///
/// # Examples
///
/// ```
/// use flightline::Coalescer;
///
/// # async fn example() {
/// let group: Coalescer<String, u32> = Coalescer::new();
///
/// let (a, b) = tokio::join!(
///     group.execute("shroud".to_string(), || async { 2100 }),
///     group.execute("shroud".to_string(), || async { unreachable!("coalesced") }),
/// );
/// assert_eq!((a, b), (2100, 2100));
/// # }
/// ```
pub struct Coalescer<K, T> {
    flights: Arc<DashMap<K, InFlight<T>>>,
    next_id: Arc<AtomicU64>,
}

impl<K, T> Clone for Coalescer<K, T> {
    fn clone(&self) -> Self {
        Self {
            flights: Arc::clone(&self.flights),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<K, T> Default for Coalescer<K, T>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
            next_id: Arc::default(),
        }
    }
}

impl<K, T> Debug for Coalescer<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coalescer").finish_non_exhaustive()
    }
}

impl<K, T> Coalescer<K, T>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty coalescer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with an execution currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    /// Returns `true` if an execution for `key` is currently in flight.
    #[must_use]
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.flights.contains_key(key)
    }

    /// Runs `factory` for `key` unless an execution for `key` is already in flight, in which
    /// case the caller joins that execution.
    ///
    /// All callers that join the same execution receive clones of the same output.
    pub fn execute<F, Fut>(&self, key: K, factory: F) -> Flight<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (work, leader) = match self.flights.entry(key) {
            Entry::Occupied(entry) => (entry.get().work.clone(), false),
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let release_key = entry.key().clone();
                let flights = Arc::clone(&self.flights);
                let fut = factory();

                let work = async move {
                    let output = fut.await;
                    flights.remove_if(&release_key, |_, flight| flight.id == id);
                    output
                }
                .boxed()
                .shared();

                entry.insert(InFlight { id, work: work.clone() });
                (work, true)
            }
        };

        if leader {
            tokio::spawn(work.clone().map(drop));
        }

        Flight { work }
    }
}

/// Handle to a (possibly shared) execution started through a [`Coalescer`].
#[must_use = "a flight's output is only observable by awaiting it"]
pub struct Flight<T> {
    work: SharedWork<T>,
}

impl<T: Clone> Future for Flight<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        Pin::new(&mut self.work).poll(cx)
    }
}

impl<T> Debug for Flight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flight").finish_non_exhaustive()
    }
}
