// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;

use flightline::retry::{RetryError, RetryPolicy};
use flightline::{ConcurrencyLimiter, MemoryStore, RequestGuard, Scheduler};
use serde_json::Value;

use crate::config::{ConfigError, FaceitClientConfig};
use crate::error::{Error, FaceitError};
use crate::request::ApiRequest;
use crate::transport::{HttpTransport, Transport};

const DEFAULT_GAME: &str = "cs2";
const MAX_PAGE_SIZE: u32 = 100;

type Guard = RequestGuard<String, Value, RetryError<FaceitError>, MemoryStore<String, Value>, ConcurrencyLimiter>;

/// A window into a player's match history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPage {
    /// Matches to skip, newest first.
    pub offset: u32,
    /// Matches to return, 1 to 100.
    pub limit: u32,
}

impl Default for HistoryPage {
    fn default() -> Self {
        Self { offset: 0, limit: 20 }
    }
}

/// Client for the FACEIT Data API.
///
/// Answers are cached, concurrent requests for the same resource are coalesced, the number of
/// calls in flight is bounded and failed calls are retried, as configured by
/// [`FaceitClientConfig`]. Errors propagate to the caller.
///
/// Cloning a `FaceitClient` yields a handle sharing the same cache and limits.
pub struct FaceitClient<T = HttpTransport> {
    guard: Guard,
    transport: Arc<T>,
    retry: RetryPolicy,
}

impl<T> Clone for FaceitClient<T> {
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
            transport: Arc::clone(&self.transport),
            retry: self.retry.clone(),
        }
    }
}

impl<T: Debug> Debug for FaceitClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceitClient")
            .field("guard", &self.guard)
            .field("transport", &self.transport)
            .field("retry", &self.retry)
            .finish()
    }
}

impl FaceitClient {
    /// Creates a client calling the Data API over HTTPS.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `config` fails validation or the HTTP client cannot be
    /// built.
    pub fn new(config: &FaceitClientConfig) -> Result<Self, ConfigError> {
        Self::with_transport(HttpTransport::new(config)?, config)
    }
}

impl<T: Transport> FaceitClient<T> {
    /// Creates a client sending requests through `transport`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `config` fails validation.
    pub fn with_transport(transport: T, config: &FaceitClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            guard: RequestGuard::new(
                MemoryStore::with_max_entries(config.max_cache_entries),
                ConcurrencyLimiter::new(config.max_in_flight),
                config.cache_ttl(),
            ),
            transport: Arc::new(transport),
            retry: config.retry_policy(),
        })
    }

    /// Looks a player up by nickname.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] with [`FaceitError::NotFound`] for unknown nicknames, and the
    /// other [`Error`] variants as for any request.
    pub async fn player_by_nickname(&self, nickname: &str) -> Result<Value, Error> {
        let nickname = required("nickname", nickname.trim())?;
        self.fetch(ApiRequest::new(["players"]).query("nickname", nickname)).await
    }

    /// Fetches a player's profile.
    ///
    /// # Errors
    ///
    /// See [`FaceitClient::fetch`].
    pub async fn player(&self, player_id: &str) -> Result<Value, Error> {
        let player_id = required("player_id", player_id)?;
        self.fetch(ApiRequest::new(["players", player_id])).await
    }

    /// Fetches a player's lifetime and per-map statistics for `game` (`cs2` when `None`).
    ///
    /// # Errors
    ///
    /// See [`FaceitClient::fetch`].
    pub async fn player_stats(&self, player_id: &str, game: Option<&str>) -> Result<Value, Error> {
        let player_id = required("player_id", player_id)?;
        let game = required("game", game.unwrap_or(DEFAULT_GAME))?;
        self.fetch(ApiRequest::new(["players", player_id, "stats", game])).await
    }

    /// Fetches a page of a player's CS2 match history.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `page.limit` is not between 1 and 100; otherwise
    /// see [`FaceitClient::fetch`].
    pub async fn player_history(&self, player_id: &str, page: HistoryPage) -> Result<Value, Error> {
        let player_id = required("player_id", player_id)?;
        if page.limit == 0 || page.limit > MAX_PAGE_SIZE {
            return Err(Error::InvalidArgument {
                name: "limit",
                reason: "must be between 1 and 100",
            });
        }
        self.fetch(
            ApiRequest::new(["players", player_id, "history"])
                .query("game", DEFAULT_GAME)
                .query("offset", page.offset.to_string())
                .query("limit", page.limit.to_string()),
        )
        .await
    }

    /// Fetches a match's details (teams, map, result).
    ///
    /// # Errors
    ///
    /// See [`FaceitClient::fetch`].
    pub async fn match_details(&self, match_id: &str) -> Result<Value, Error> {
        let match_id = required("match_id", match_id)?;
        self.fetch(ApiRequest::new(["matches", match_id])).await
    }

    /// Fetches a match's per-round and per-player statistics.
    ///
    /// # Errors
    ///
    /// See [`FaceitClient::fetch`].
    pub async fn match_stats(&self, match_id: &str) -> Result<Value, Error> {
        let match_id = required("match_id", match_id)?;
        self.fetch(ApiRequest::new(["matches", match_id, "stats"])).await
    }

    /// Performs `request` through the cache, coalescer, concurrency limiter and retry policy.
    ///
    /// # Errors
    ///
    /// - [`Error::Api`] when the API rejects the request permanently (not found, bad key).
    /// - [`Error::Exhausted`] when every attempt failed.
    /// - [`Error::Abandoned`] when the request was dropped before it ran.
    pub async fn fetch(&self, request: ApiRequest) -> Result<Value, Error> {
        let key = request.to_string();
        let transport = Arc::clone(&self.transport);
        let retry = self.retry.clone();

        let fetched = self
            .guard
            .get(key, move || async move {
                let operation = request.to_string();
                retry.run(&operation, |_attempt| transport.send(&request)).await
            })
            .await
            .inspect_err(|error| tracing::warn!(%error, "FACEIT request failed"))?;

        Ok(fetched.into_value())
    }

    /// Drops the cached answer for `request`, if any.
    pub async fn invalidate(&self, request: &ApiRequest) {
        if let Err(error) = self.guard.invalidate(&request.to_string()).await {
            tracing::warn!(%error, request = %request, "cache invalidation failed");
        }
    }

    /// Number of requests waiting for a free slot.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.guard.scheduler().queued()
    }

    /// Number of resources with a request currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.guard.in_flight()
    }
}

fn required<'a>(name: &'static str, value: &'a str) -> Result<&'a str, Error> {
    if value.is_empty() {
        Err(Error::InvalidArgument {
            name,
            reason: "must not be empty",
        })
    } else {
        Ok(value)
    }
}
