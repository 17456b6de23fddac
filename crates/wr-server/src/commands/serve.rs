//! Serve command running the webhook listener.

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use crate::Config;
use crate::server::{self, AppState};
use crate::targets::build_dispatcher;

/// Binds the listener and serves until Ctrl-C or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let dispatcher = build_dispatcher(&config).context("failed to configure targets")?;
    let targets: Vec<&str> = dispatcher.registry().names().collect();
    tracing::info!(?targets, default_targets = ?config.default_targets, "targets registered");

    let state = AppState::new(&config, dispatcher.clone()).context("failed to build HTTP client")?;
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "listening for webhooks");

    server::run(listener, state, server::shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shutdown complete");
    Ok(())
}
