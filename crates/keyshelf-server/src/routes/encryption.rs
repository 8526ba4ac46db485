//! Encryption routes.
//!
//! - `POST /keys/encrypt`, `POST /keys/decrypt`: batch over a filter
//! - `POST /keys/{id}/encrypt`, `POST /keys/{id}/decrypt`: one key

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use keyshelf_core::encryption::{BatchOutcome, FailedKey, KeyFilter};
use keyshelf_storage::ApiKey;

use crate::error::AppError;
use crate::extract::{Path, Payload};
use crate::state::AppState;

/// Request body for a batch transition.
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub password: Option<String>,
    pub project_id: Option<i64>,
    pub key_ids: Option<Vec<i64>>,
}

/// Request body for a single-key transition.
#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub message: String,
    pub count: u64,
    pub skipped: u64,
    pub failed_keys: Vec<FailedKey>,
}

impl BatchResponse {
    fn new(verb: &str, outcome: BatchOutcome) -> Self {
        let mut message = format!("{verb} {} keys", outcome.processed);
        if !outcome.failed_keys.is_empty() {
            message.push_str(&format!(", {} failed", outcome.failed_keys.len()));
        }
        Self {
            message,
            count: outcome.processed,
            skipped: outcome.skipped,
            failed_keys: outcome.failed_keys,
        }
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/keys/encrypt", post(encrypt_keys))
        .route("/keys/decrypt", post(decrypt_keys))
        .route("/keys/{id}/encrypt", post(encrypt_key))
        .route("/keys/{id}/decrypt", post(decrypt_key))
}

fn password(value: Option<String>) -> Result<String, AppError> {
    value
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("password is required".to_owned()))
}

fn filter(body: BatchRequest) -> KeyFilter {
    KeyFilter {
        project_id: body.project_id,
        key_ids: body.key_ids,
    }
}

async fn encrypt_keys(
    State(state): State<Arc<AppState>>,
    Payload(body): Payload<BatchRequest>,
) -> Result<Json<BatchResponse>, AppError> {
    let password = password(body.password.clone())?;
    let outcome = state.vault.encrypt_keys(&filter(body), &password).await?;
    Ok(Json(BatchResponse::new("encrypted", outcome)))
}

async fn decrypt_keys(
    State(state): State<Arc<AppState>>,
    Payload(body): Payload<BatchRequest>,
) -> Result<Json<BatchResponse>, AppError> {
    let password = password(body.password.clone())?;
    let outcome = state.vault.decrypt_keys(&filter(body), &password).await?;
    Ok(Json(BatchResponse::new("decrypted", outcome)))
}

async fn encrypt_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Payload(body): Payload<PasswordRequest>,
) -> Result<Json<ApiKey>, AppError> {
    let password = password(body.password)?;
    Ok(Json(state.vault.encrypt_key(id, &password).await?))
}

/// A wrong password answers `decryption_failed` and leaves the key as it was.
async fn decrypt_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Payload(body): Payload<PasswordRequest>,
) -> Result<Json<ApiKey>, AppError> {
    let password = password(body.password)?;
    Ok(Json(state.vault.decrypt_key(id, &password).await?))
}
