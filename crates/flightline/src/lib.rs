// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Building blocks for guarding a fragile, rate-limited upstream API.
//!
//! Calls to third-party HTTP services that throttle aggressively need more than a plain
//! client: repeated lookups should be served from a short-lived cache, concurrent lookups of
//! the same key should share one upstream call, the call rate has to be paced, and transient
//! failures should be retried with a backoff that depends on *why* the call failed.
//!
//! This crate provides each of those concerns as an independent piece, plus a
//! [`RequestGuard`] that wires them together:
//!
//! - [`cache`]: the [`CacheStore`] trait and the in-process [`MemoryStore`].
//! - [`Coalescer`]: single-flight execution of duplicate work.
//! - [`SerialQueue`]: a global FIFO queue that runs one job at a time with a minimum spacing
//!   between upstream calls; a [`Pacer`] extends that spacing to calls made inside a job.
//! - [`ConcurrencyLimiter`]: a bounded-parallelism alternative to the serial queue.
//! - [`retry`]: attempt budgets, per-attempt timeouts and recovery-aware backoff.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use flightline::{MemoryStore, RequestGuard, SerialQueue};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let guard: RequestGuard<String, String, String, _, _> = RequestGuard::new(
//!     MemoryStore::new(),
//!     SerialQueue::new(Duration::from_secs(2)),
//!     Duration::from_secs(30),
//! );
//!
//! let fetched = guard
//!     .get("shroud".to_string(), || async { Ok::<_, String>("payload".to_string()) })
//!     .await?;
//! assert_eq!(fetched.value(), "payload");
//! # Ok(())
//! # }
//! ```
//!
//! # Runtime
//!
//! The queue, limiter and coalescer spawn work onto the ambient tokio runtime and measure time
//! with [`tokio::time`], so tests can pause and advance the clock deterministically.

pub mod cache;
mod coalesce;
mod guard;
mod limiter;
mod queue;
pub mod retry;
mod schedule;
#[cfg(test)]
mod testing;

#[doc(inline)]
pub use cache::{CacheStore, MemoryStore};
pub use coalesce::{Coalescer, Flight};
pub use guard::{Fetched, GuardError, RequestGuard, Source};
pub use limiter::ConcurrencyLimiter;
pub use queue::{Pacer, SerialQueue};
pub use schedule::{ScheduleError, Scheduled, Scheduler};
