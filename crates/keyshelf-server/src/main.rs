//! `KeyShelf` server binary.
//!
//! Reads [`ServerConfig`] from the environment, opens the store, and serves
//! the JSON API until SIGINT or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use keyshelf_core::Vault;
use keyshelf_server::config::{DatabaseLocation, ServerConfig};
use keyshelf_server::routes;
use keyshelf_server::state::AppState;
use keyshelf_storage::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(database = ?config.database, "KeyShelf starting");

    let store = open_store(&config.database).await?;
    let state = Arc::new(AppState::new(Vault::new(store), config.clone()));
    let app = routes::router(Arc::clone(&state));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "KeyShelf server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.vault.store().pool().close().await;
    info!("KeyShelf server stopped");
    Ok(())
}

async fn open_store(location: &DatabaseLocation) -> anyhow::Result<Store> {
    match location {
        DatabaseLocation::Memory => {
            info!("using in-memory store (data will not persist)");
            Store::open_in_memory()
                .await
                .context("failed to open in-memory store")
        }
        DatabaseLocation::File(path) => {
            info!(path = %path, "using SQLite store");
            Store::open(path)
                .await
                .with_context(|| format!("failed to open store at {path}"))
        }
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
