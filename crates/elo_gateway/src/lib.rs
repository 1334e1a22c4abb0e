// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A gateway in front of a fragile, rate-limited live ELO endpoint.
//!
//! Browsers ask the gateway for a player's live match state by nickname. The gateway makes sure
//! the upstream sees at most one call per [`min_interval`][config::GatewayConfig::min_interval]
//! from the whole process, however many callers there are:
//!
//! 1. Nicknames are validated against a conservative allow-list. Invalid input is the only hard
//!    error and never reaches the cache or the queue.
//! 2. Recent answers are served from a short-lived cache (30 seconds by default), either in
//!    memory or in a SQLite file shared by several processes.
//! 3. Concurrent lookups for the same nickname share one upstream call.
//! 4. Upstream calls run one at a time from a FIFO queue, spaced apart.
//! 5. Each call is retried with a long backoff after rate-limit rejections and a short linear
//!    backoff after other failures. When all attempts fail, callers receive
//!    `{"error": true, "isLive": false, "message": ...}` instead of an error.
//!
//! Upstream payloads are opaque JSON and passed through unchanged.
//!
//! # Example
//!
//! ```no_run
//! use elo_gateway::config::GatewayConfig;
//! use elo_gateway::{Gateway, GatewayStore, HttpUpstream};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = GatewayConfig::load()?;
//! let gateway = Gateway::new(
//!     HttpUpstream::new(config.upstream_url()?)?,
//!     GatewayStore::open(&config.cache)?,
//!     &config,
//! );
//!
//! let payload = gateway.resolve("shroud").await?;
//! println!("{payload}");
//! # Ok(())
//! # }
//! ```

pub mod config;
mod gateway;
pub mod http;
mod nickname;
mod server;
mod store;
pub mod upstream;

pub use gateway::{Gateway, GatewayStats};
pub use nickname::{InvalidNickname, MAX_LEN as MAX_NICKNAME_LEN, Nickname};
pub use server::{serve, serve_on};
pub use store::{GatewayStore, spawn_purge_task};
pub use upstream::{HttpUpstream, Upstream, UpstreamError};
