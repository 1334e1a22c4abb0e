// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;

use flightline::retry::{RetryError, RetryPolicy};
use flightline::{GuardError, Pacer, RequestGuard, Scheduler, SerialQueue};
use serde_json::{Value, json};

use crate::config::GatewayConfig;
use crate::nickname::{InvalidNickname, Nickname};
use crate::store::GatewayStore;
use crate::upstream::{HttpUpstream, Upstream, UpstreamError};

type LookupError = RetryError<UpstreamError>;

/// Gateway counters exposed by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayStats {
    /// Upstream lookups waiting for their turn in the queue.
    pub queued: usize,
    /// Nicknames with a lookup currently in flight.
    pub in_flight: usize,
}

/// Resolves nicknames to live ELO payloads without overwhelming the upstream.
///
/// Lookups go through the configured cache, are coalesced per nickname, and run one at a time
/// through a process-wide queue that spaces upstream calls at least
/// [`min_interval`][GatewayConfig::min_interval] apart. Each queued lookup retries on its own
/// budget before giving up, and every retried call keeps the same spacing from the call before
/// it, whichever lookup made that one.
///
/// Construct one `Gateway` per process and share it (it is cheap to wrap in an [`Arc`]).
pub struct Gateway<U = HttpUpstream> {
    guard: RequestGuard<String, Value, LookupError, GatewayStore, SerialQueue>,
    upstream: Arc<U>,
    retry: RetryPolicy,
    pacer: Pacer,
}

impl<U: Debug> Debug for Gateway<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("guard", &self.guard)
            .field("upstream", &self.upstream)
            .field("retry", &self.retry)
            .field("pacer", &self.pacer)
            .finish()
    }
}

impl<U: Upstream> Gateway<U> {
    /// Creates a gateway over `upstream`, caching in `store`, paced and retried per `config`.
    #[must_use]
    pub fn new(upstream: U, store: GatewayStore, config: &GatewayConfig) -> Self {
        let queue = SerialQueue::new(config.min_interval());
        let pacer = queue.pacer();
        Self {
            guard: RequestGuard::new(store, queue, config.cache_ttl()),
            upstream: Arc::new(upstream),
            retry: config.retry_policy(),
            pacer,
        }
    }

    /// Returns the live ELO payload for `nickname`.
    ///
    /// Successful upstream payloads (including domain-level "not found" bodies) are returned
    /// verbatim and cached. When every attempt fails the result is the soft error object
    /// `{"error": true, "isLive": false, "message": ...}`, which is not cached.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidNickname`] without touching the cache or the queue if `nickname` fails
    /// validation. This is the only error.
    pub async fn resolve(&self, nickname: &str) -> Result<Value, InvalidNickname> {
        let nickname = Nickname::parse(nickname).inspect_err(|error| {
            tracing::debug!(%error, "rejected nickname");
        })?;

        let key = nickname.into_string();
        let upstream = Arc::clone(&self.upstream);
        let retry = self.retry.clone();
        let pacer = self.pacer.clone();
        let lookup_key = key.clone();

        let result = self
            .guard
            .get(key.clone(), move || async move {
                let result = retry
                    .run_paced("live_elo", &pacer, |_attempt| upstream.fetch(&lookup_key))
                    .await;
                if result.is_ok() {
                    tracing::info!(nickname = %lookup_key, "fetched live ELO");
                }
                result
            })
            .await;

        match result {
            Ok(fetched) => Ok(fetched.into_value()),
            Err(error) => {
                tracing::warn!(nickname = %key, %error, "live ELO lookup failed");
                Ok(soft_error(&error))
            }
        }
    }

    /// Current queue depth and number of in-flight lookups.
    #[must_use]
    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            queued: self.guard.scheduler().queued(),
            in_flight: self.guard.in_flight(),
        }
    }

    /// The cache backend.
    #[must_use]
    pub fn store(&self) -> &GatewayStore {
        self.guard.store()
    }
}

/// The shape callers receive when the upstream could not be reached.
fn soft_error(error: &GuardError<LookupError>) -> Value {
    let message = match error {
        GuardError::Load(RetryError::Exhausted { attempts, last }) => {
            format!("live ELO lookup failed after {attempts} attempts: {last}")
        }
        other => format!("live ELO lookup failed: {other}"),
    };

    json!({
        "error": true,
        "isLive": false,
        "message": message,
    })
}
