// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::{CacheStore, Coalescer, ScheduleError, Scheduler};

/// Where a value returned by [`RequestGuard::get`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// Served from the cache without touching the upstream.
    Cache,

    /// Produced by an upstream load, either started by this call or joined while in flight.
    Upstream,
}

/// A value together with its [`Source`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched<V> {
    value: V,
    source: Source,
}

impl<V> Fetched<V> {
    /// The fetched value.
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Where the value came from.
    #[must_use]
    pub fn source(&self) -> Source {
        self.source
    }

    /// Returns `true` if the value was served from the cache.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.source == Source::Cache
    }

    /// Consumes the wrapper and returns the value.
    #[must_use]
    pub fn into_value(self) -> V {
        self.value
    }
}

/// Why [`RequestGuard::get`] could not produce a value.
///
/// Every caller coalesced onto the same load receives a clone of the same error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError<E> {
    /// The scheduler never ran the load.
    #[error(transparent)]
    Schedule(ScheduleError),

    /// The load ran and failed.
    #[error("{0}")]
    Load(E),
}

type Outcome<V, E> = Result<Fetched<V>, GuardError<E>>;

/// What a scheduled job produced: a value already cached by the time it ran, or a fresh load.
enum Loaded<V> {
    Reused(V),
    Fresh(V),
}

struct GuardInner<K, V, E, S, Q> {
    store: S,
    scheduler: Q,
    flights: Coalescer<K, Outcome<V, E>>,
    ttl: Duration,
}

/// Serves keyed lookups against a fragile upstream through a cache, a coalescer and a scheduler.
///
/// A call to [`get`][RequestGuard::get] proceeds as follows:
///
/// 1. The cache store is consulted; a live entry is returned immediately. A failing cache
///    read is logged and treated as a miss.
/// 2. On a miss, the call joins the load already in flight for the key, or starts one. Only
///    the caller starting the load hands it to the scheduler, so coalesced callers take no
///    extra queue position. When the job gets its turn it reads the cache once more and skips
///    the load if an earlier flight for the key filled it in the meantime.
/// 3. When the load succeeds its value is written to the cache with the configured TTL. A
///    failing cache write is logged and the value is returned regardless. Failed loads are
///    never cached.
///
/// The load closure is where retries belong; the guard itself makes exactly one scheduling
/// request per flight.
///
/// Cloning a `RequestGuard` yields a handle to the same cache, scheduler and flights.
pub struct RequestGuard<K, V, E, S, Q> {
    inner: Arc<GuardInner<K, V, E, S, Q>>,
}

impl<K, V, E, S, Q> Clone for RequestGuard<K, V, E, S, Q> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, E, S: Debug, Q: Debug> Debug for RequestGuard<K, V, E, S, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGuard")
            .field("store", &self.inner.store)
            .field("scheduler", &self.inner.scheduler)
            .field("ttl", &self.inner.ttl)
            .finish_non_exhaustive()
    }
}

impl<K, V, E, S, Q> RequestGuard<K, V, E, S, Q>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    S: CacheStore<K, V> + 'static,
    Q: Scheduler,
{
    /// Creates a guard caching successful loads in `store` for `ttl`, and running loads through
    /// `scheduler`.
    #[must_use]
    pub fn new(store: S, scheduler: Q, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                store,
                scheduler,
                flights: Coalescer::new(),
                ttl,
            }),
        }
    }

    /// The cache store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// The scheduler running loads.
    #[must_use]
    pub fn scheduler(&self) -> &Q {
        &self.inner.scheduler
    }

    /// The TTL applied to cached values.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Number of keys with a load currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.flights.in_flight()
    }

    /// Returns the value for `key`, from the cache or by running `load`.
    ///
    /// `load` is only invoked if the cache has no live entry and no load for `key` is already
    /// in flight.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Load`] if the load failed and [`GuardError::Schedule`] if the
    /// scheduler abandoned it.
    pub async fn get<F, Fut>(&self, key: K, load: F) -> Result<Fetched<V>, GuardError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        match self.inner.store.get(&key).await {
            Ok(Some(value)) => {
                tracing::debug!(key = ?key, "cache hit");
                return Ok(Fetched {
                    value,
                    source: Source::Cache,
                });
            }
            Ok(None) => tracing::debug!(key = ?key, "cache miss"),
            Err(error) => tracing::warn!(key = ?key, %error, "cache read failed, treating as a miss"),
        }

        let inner = Arc::clone(&self.inner);
        self.inner
            .flights
            .execute(key.clone(), move || {
                // Scheduling stays synchronous so jobs queue in arrival order.
                let job_inner = Arc::clone(&inner);
                let job_key = key.clone();
                let scheduled = inner.scheduler.schedule(move || async move {
                    if let Ok(Some(value)) = job_inner.store.get(&job_key).await {
                        tracing::debug!(key = ?job_key, "cache filled while queued, skipping the load");
                        return Ok(Loaded::Reused(value));
                    }
                    load().await.map(Loaded::Fresh)
                });

                async move {
                    match scheduled.await.map_err(GuardError::Schedule)? {
                        Ok(Loaded::Reused(value)) => Ok(Fetched {
                            value,
                            source: Source::Cache,
                        }),
                        Ok(Loaded::Fresh(value)) => {
                            if let Err(error) = inner.store.put(key.clone(), value.clone(), inner.ttl).await {
                                tracing::warn!(key = ?key, %error, "cache write failed, returning the value uncached");
                            }
                            Ok(Fetched {
                                value,
                                source: Source::Upstream,
                            })
                        }
                        Err(error) => Err(GuardError::Load(error)),
                    }
                }
            })
            .await
    }

    /// Removes any cached value for `key`.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the removal failed.
    pub async fn invalidate(&self, key: &K) -> crate::cache::Result<()> {
        self.inner.store.invalidate(key).await
    }
}
