//! conferd - conference lifecycle and realtime fanout daemon

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod state;

use config::AppConfig;
use state::{AppError, AppState};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting conferd");

    if let Err(e) = run().await {
        tracing::error!("conferd failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let state = Arc::new(AppState::new(&config)?);

    let server = confer_net::Server::start(
        config.server.listen_addr,
        Arc::clone(&state.lifecycle),
        Arc::clone(&state.hub),
    )
    .await?;

    tracing::info!(addr = %server.addr(), "Accepting realtime connections");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    server.shutdown().await;
    tracing::info!("conferd stopped");
    Ok(())
}
