// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A persistent [`CacheStore`][flightline::CacheStore] backed by SQLite.
//!
//! Several processes pointing at the same database file see each other's entries, which keeps
//! duplicate upstream calls across processes bounded by the cache TTL even though single-flight
//! coalescing only works within one process.
//!
//! Entries are written with a single `INSERT .. ON CONFLICT(key) DO UPDATE` statement, so
//! concurrent writers for the same key never trip over the primary key constraint. Expiry is
//! compared against wall-clock milliseconds since the Unix epoch, which all processes agree on.
//! Values are stored as JSON text.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use flightline::CacheStore;
//! use flightline_sqlite::SqliteStore;
//!
//! # async fn example() -> flightline::cache::Result<()> {
//! let store = SqliteStore::<serde_json::Value>::open_in_memory()?;
//! store
//!     .put("shroud".to_string(), serde_json::json!({"playing": "FaceIt Europe 5v5 Queue"}), Duration::from_secs(30))
//!     .await?;
//! assert!(store.get(&"shroud".to_string()).await?.is_some());
//! # Ok(())
//! # }
//! ```

mod store;

pub use store::SqliteStore;
