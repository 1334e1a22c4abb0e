// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Time-to-live cache storage.
//!
//! [`CacheStore`] is the contract every storage backend implements. Backends own their notion
//! of "now": the in-process [`MemoryStore`] uses the tokio clock, persistent stores typically
//! compare against wall-clock timestamps so that several processes agree on expiry.
//!
//! Stores are passive side tables. They know nothing about queues or in-flight requests and
//! are only consulted before scheduling upstream work and again as it starts, and populated
//! after it succeeds.

mod memory;

use std::time::Duration;

pub use memory::MemoryStore;

/// An error from a cache store operation.
///
/// Store failures are never fatal for a lookup: callers treat a failed read as a miss and a
/// failed write as a lost cache fill.
#[derive(Debug, thiserror::Error)]
#[error("cache store operation failed: {message}")]
pub struct Error {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates an error carrying only a message.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping an underlying cause.
    pub fn caused_by(message: impl Into<String>, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// A specialized [`Result`] type for cache store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Storage backend for time-to-live cache entries.
///
/// Implementations must uphold two rules:
///
/// - [`get`][CacheStore::get] never returns an entry whose expiry has passed, even if the entry
///   has not been physically removed yet.
/// - [`put`][CacheStore::put] always overwrites any existing entry for the key (last write
///   wins) and must not fail merely because the key already exists.
pub trait CacheStore<K, V>: Send + Sync {
    /// Returns the live value for `key`, or `None` if it is absent or expired.
    fn get(&self, key: &K) -> impl Future<Output = Result<Option<V>>> + Send;

    /// Stores `value` under `key`, visible for `ttl` from now.
    fn put(&self, key: K, value: V, ttl: Duration) -> impl Future<Output = Result<()>> + Send;

    /// Removes the entry for `key`, if any.
    fn invalidate(&self, key: &K) -> impl Future<Output = Result<()>> + Send;

    /// Returns the number of stored entries, if the backend can tell without blocking.
    ///
    /// The count may include expired entries that have not been pruned yet. Backends that would
    /// have to query storage return `None` and offer an async count of their own.
    fn len(&self) -> Option<usize> {
        None
    }

    /// Returns `true` if the store holds no entries, if the backend tracks size.
    fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }
}
