//! Shared application state for `KeyShelf` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use keyshelf_core::Vault;

use crate::config::ServerConfig;

/// Shared application state passed to all HTTP handlers.
#[derive(Debug)]
pub struct AppState {
    /// The vault service, holding the store handle.
    pub vault: Vault,
    /// Configuration the server was started with.
    pub config: ServerConfig,
}

impl AppState {
    #[must_use]
    pub fn new(vault: Vault, config: ServerConfig) -> Self {
        Self { vault, config }
    }
}
