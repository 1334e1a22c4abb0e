// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The `elo_gateway` server binary.
//!
//! Configuration is read from `ELO_GATEWAY_CONFIG` and `ELO_GATEWAY_*` variables; log output
//! is controlled with `RUST_LOG`.

use anyhow::Context;
use elo_gateway::config::GatewayConfig;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,elo_gateway=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .init();

    let config = GatewayConfig::load().context("invalid configuration")?;
    elo_gateway::serve(config, shutdown_signal()).await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested, draining connections"),
        Err(error) => {
            tracing::error!(%error, "cannot listen for the shutdown signal, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
