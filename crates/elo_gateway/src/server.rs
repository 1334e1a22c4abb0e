// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::store::{GatewayStore, spawn_purge_task};
use crate::upstream::HttpUpstream;
use crate::{Gateway, http};

/// Binds the configured listen address and serves the gateway until `shutdown` completes.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or [`serve_on`] fails.
pub async fn serve<F>(config: GatewayConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    serve_on(listener, config, shutdown).await
}

/// Serves the gateway on an already bound listener until `shutdown` completes.
///
/// Opens the configured cache, starts the periodic purge of expired entries and answers HTTP
/// requests. In-flight requests are allowed to finish after `shutdown` completes.
///
/// # Errors
///
/// Returns an error if the cache or HTTP client cannot be set up, the configuration is invalid,
/// or the server fails.
pub async fn serve_on<F>(listener: TcpListener, config: GatewayConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;
    let store = GatewayStore::open(&config.cache).context("failed to open the cache store")?;
    let upstream = HttpUpstream::new(config.upstream_url()?).context("failed to build the HTTP client")?;
    let gateway = Arc::new(Gateway::new(upstream, store.clone(), &config));
    let app = http::router(gateway, &config.activity_header_names()?);
    let purge = spawn_purge_task(store, config.purge_interval());

    tracing::info!(
        addr = %listener.local_addr().context("listener has no local address")?,
        upstream = %config.upstream_url,
        min_interval_ms = config.min_interval_ms,
        cache = ?config.cache,
        "elo gateway listening"
    );

    let served = axum::serve(listener, app).with_graceful_shutdown(shutdown).await;
    purge.abort();
    served.context("HTTP server failed")
}
