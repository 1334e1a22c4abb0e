// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A client for the [FACEIT Data API](https://developers.faceit.com/docs/tools/data-api) that
//! keeps a dashboard from hammering it.
//!
//! Every [`FaceitClient`] operation goes through the same pipeline:
//!
//! - answers are cached in a bounded in-memory store (45 seconds by default);
//! - concurrent requests for the same resource share one API call;
//! - at most a few calls are in flight at once (4 by default), the rest wait in arrival order;
//! - failures are retried: rate-limit rejections with exponential backoff capped at 30 seconds
//!   (or the server's `Retry-After`, when present), other transient failures with a short
//!   linear backoff. Not-found and authorization failures are not retried.
//!
//! Payloads are returned as opaque JSON.
//!
//! # Example
//!
//! ```no_run
//! use faceit_client::{FaceitClient, FaceitClientConfig, HistoryPage};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = FaceitClient::new(&FaceitClientConfig::new("my-api-key"))?;
//!
//! let player = client.player_by_nickname("s1mple").await?;
//! let player_id = player["player_id"].as_str().unwrap_or_default();
//!
//! let stats = client.player_stats(player_id, None).await?;
//! let recent = client.player_history(player_id, HistoryPage::default()).await?;
//! println!("{stats}\n{recent}");
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod request;
mod transport;

pub use client::{FaceitClient, HistoryPage};
pub use config::{ConfigError, FaceitClientConfig};
pub use error::{Error, FaceitError};
pub use request::ApiRequest;
pub use transport::{HttpTransport, Transport};
