//! `KeyShelf` HTTP server.
//!
//! Wires the vault service from `keyshelf-core` to an Axum router serving
//! the JSON API.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;
