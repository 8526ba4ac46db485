//! Import and export routes.
//!
//! - `POST /projects/{id}/import-env`: multipart `file` (`.env`, `.json`, `.yaml`, ...)
//! - `POST /projects/{id}/import-os-env`: the server's own environment, when allowed
//! - `GET  /export?format=&project_id=&password=`: attachment download

use std::ffi::OsString;
use std::sync::Arc;

use axum::extract::State;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use keyshelf_core::codec::Format;
use keyshelf_core::transfer::ImportSummary;

use super::attachment;
use crate::error::AppError;
use crate::extract::{Path, Query, optional_id};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub message: String,
    #[serde(flatten)]
    pub summary: ImportSummary,
}

impl From<ImportSummary> for ImportResponse {
    fn from(summary: ImportSummary) -> Self {
        let message = if summary.skipped.is_empty() {
            format!("imported {} keys", summary.imported)
        } else {
            format!(
                "imported {} keys, skipped {} with unusable names",
                summary.imported,
                summary.skipped.len()
            )
        };
        Self { message, summary }
    }
}

/// Query for `GET /export`. The format defaults to `env`.
#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    pub project_id: Option<i64>,
    pub password: Option<String>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/projects/{id}/import-env", post(import_file))
        .route("/projects/{id}/import-os-env", post(import_os_env))
        .route("/export", get(export))
}

/// Read the multipart field named `file`, returning its filename and bytes.
async fn read_upload(multipart: &mut Multipart) -> Result<(String, Vec<u8>), AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::BadRequest("uploaded file has no filename".to_owned()))?
            .to_owned();
        let bytes = field.bytes().await?;
        return Ok((filename, bytes.to_vec()));
    }
    Err(AppError::BadRequest("no file uploaded".to_owned()))
}

/// `POST /projects/{id}/import-env`
async fn import_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImportResponse>, AppError> {
    let mut multipart = multipart?;
    let (filename, bytes) = read_upload(&mut multipart).await?;
    let summary = state.vault.import_file(id, &filename, &bytes).await?;
    Ok(Json(summary.into()))
}

/// `POST /projects/{id}/import-os-env`
///
/// Exposes every variable of the server process, so it answers 403 unless
/// `KEYSHELF_ALLOW_OS_ENV_IMPORT` is set.
async fn import_os_env(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ImportResponse>, AppError> {
    if !state.config.allow_os_env_import {
        return Err(AppError::Forbidden(
            "importing the server environment is disabled (set KEYSHELF_ALLOW_OS_ENV_IMPORT=true)"
                .to_owned(),
        ));
    }
    tracing::warn!(project_id = id, "importing server environment");
    let summary = state
        .vault
        .import_environment(id, utf8_vars(std::env::vars_os()))
        .await?;
    Ok(Json(summary.into()))
}

/// Environment variables as UTF-8 pairs. Variables that are not valid
/// UTF-8 are logged and left out.
fn utf8_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Vec<(String, String)> {
    vars.into_iter()
        .filter_map(|(name, value)| match (name.into_string(), value.into_string()) {
            (Ok(name), Ok(value)) => Some((name, value)),
            (Ok(name), Err(_)) => {
                tracing::warn!(name = %name, "environment variable skipped, value is not UTF-8");
                None
            }
            (Err(name), _) => {
                tracing::warn!(name = %name.to_string_lossy(), "environment variable skipped, name is not UTF-8");
                None
            }
        })
        .collect()
}

/// `GET /export`
async fn export(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let format = match query.format.as_deref().map(str::trim) {
        None | Some("") => Format::Env,
        Some(raw) => raw.parse()?,
    };
    let file = state
        .vault
        .export(format, query.project_id, query.password.as_deref())
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_owned()),
            (header::CONTENT_DISPOSITION, attachment(&file.filename)),
        ],
        file.body,
    ))
}
