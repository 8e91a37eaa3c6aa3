use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use darkpattern_detector::{api, AppState, Config, HubLoader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    let filter = match config.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    tracing::info!(model = %config.model.model_id, "starting dark pattern detection API");
    let state = Arc::new(AppState::new(HubLoader::new(config.model.clone())));

    // Best effort: a failure here is retried by the first request.
    if let Err(e) = state.host.ensure_ready().await {
        tracing::warn!(error = %e, "failed to load model at startup");
    }

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
