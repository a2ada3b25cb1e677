mod api;
mod auth;
mod config;
mod error;
mod main_lib;
mod retry_worker;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::main_lib::{app_router, build_state};

const DEFAULT_LOG_FILTER: &str = "info,northstar=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real deployments set the variables directly.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let state = build_state(&config)?;

    let retry_worker = retry_worker::spawn(
        state.retry_queue.clone(),
        state.sync_engine.clone(),
        config.retry_poll_interval,
    );

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("[Server] Listening on {}", config.listen_addr);
    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    retry_worker.abort();
    info!("[Server] Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("[Server] Failed to listen for shutdown signal: {}", err);
    }
}
