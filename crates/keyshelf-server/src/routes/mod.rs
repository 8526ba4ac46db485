//! HTTP routes for `KeyShelf`.
//!
//! Each module builds a `Router<Arc<AppState>>` for one resource; [`router`]
//! merges them and applies the shared layers.

pub mod database;
pub mod encryption;
pub mod health;
pub mod keys;
pub mod projects;
pub mod transfer;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// `{message, count}` body returned by scope-wide deletes and batches.
#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub message: String,
    pub count: u64,
}

/// `{message}` body.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Build the complete application router with its layers and state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .merge(health::router())
        .merge(keys::router())
        .merge(encryption::router())
        .merge(projects::router())
        .merge(transfer::router())
        .merge(database::router())
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

/// `Content-Disposition` value for a download.
fn attachment(filename: &str) -> String {
    format!("attachment; filename=\"{filename}\"")
}
