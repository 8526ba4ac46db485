//! Server configuration for `KeyShelf`.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `KEYSHELF_*` environment variables.

use std::net::SocketAddr;

/// Default upload limit for file and database imports (16 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// Ephemeral in-memory store, lost on restart.
    Memory,
    /// SQLite file on disk.
    File(String),
}

impl DatabaseLocation {
    fn parse(raw: &str) -> Self {
        if raw == ":memory:" {
            Self::Memory
        } else {
            Self::File(raw.to_owned())
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Store location.
    pub database: DatabaseLocation,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Whether `POST /projects/{id}/import-os-env` may read the process environment.
    pub allow_os_env_import: bool,
    /// Request body limit for uploads.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            database: DatabaseLocation::File("./keyshelf.db".to_owned()),
            log_level: "info".to_owned(),
            allow_os_env_import: false,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT`: port to bind on (binds to `0.0.0.0`)
    /// - `KEYSHELF_BIND_ADDR`: full bind address (overrides `PORT`, default: `127.0.0.1:5000`)
    /// - `KEYSHELF_DATABASE`: SQLite file, or `:memory:` (default: `./keyshelf.db`)
    /// - `KEYSHELF_LOG_LEVEL`: log filter (default: `info`)
    /// - `KEYSHELF_ALLOW_OS_ENV_IMPORT`: allow importing the server environment (default: `false`)
    /// - `KEYSHELF_MAX_UPLOAD_BYTES`: upload limit in bytes (default: 16 MiB)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        // Priority: KEYSHELF_BIND_ADDR > PORT > default 127.0.0.1:5000
        let bind_addr = if let Some(addr) = var("KEYSHELF_BIND_ADDR") {
            addr.parse().unwrap_or(defaults.bind_addr)
        } else if let Some(port_str) = var("PORT") {
            let port: u16 = port_str.parse().unwrap_or(5000);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            defaults.bind_addr
        };

        let database = var("KEYSHELF_DATABASE")
            .filter(|v| !v.trim().is_empty())
            .map_or(defaults.database, |v| DatabaseLocation::parse(v.trim()));

        let log_level = var("KEYSHELF_LOG_LEVEL").unwrap_or(defaults.log_level);

        let allow_os_env_import = var("KEYSHELF_ALLOW_OS_ENV_IMPORT")
            .is_some_and(|v| v == "true" || v == "1");

        let max_upload_bytes = var("KEYSHELF_MAX_UPLOAD_BYTES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_upload_bytes);

        Self {
            bind_addr,
            database,
            log_level,
            allow_os_env_import,
            max_upload_bytes,
        }
    }
}
