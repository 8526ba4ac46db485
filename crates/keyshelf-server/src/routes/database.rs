//! Whole-database routes.
//!
//! - `GET  /download-db`: snapshot of the store as an attachment
//! - `POST /import-db`: multipart `file` (SQLite) and `import-mode` (`overwrite` | `merge`)

use std::sync::Arc;

use axum::extract::State;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use keyshelf_core::backup::{DatabaseImport, ImportMode};

use super::attachment;
use crate::error::AppError;
use crate::state::AppState;

/// Extensions accepted for database uploads.
const DATABASE_EXTENSIONS: [&str; 3] = ["db", "sqlite", "sqlite3"];

#[derive(Debug, Serialize)]
pub struct ImportDatabaseResponse {
    pub message: String,
    #[serde(flatten)]
    pub result: DatabaseImport,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/download-db", get(download_database))
        .route("/import-db", post(import_database))
}

/// `GET /download-db`
async fn download_database(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let dump = state.vault.download_database().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_owned()),
            (header::CONTENT_DISPOSITION, attachment(&dump.filename)),
        ],
        dump.bytes,
    ))
}

fn has_database_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| DATABASE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// `POST /import-db`
///
/// The upload is streamed to a staging file that is removed when the
/// handler returns, whatever the outcome.
async fn import_database(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImportDatabaseResponse>, AppError> {
    let mut multipart = multipart?;
    let staging = tempfile::tempdir()?;
    let upload = staging.path().join("upload.db");
    let mut mode = ImportMode::default();
    let mut received = false;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_owned();
                if !has_database_extension(&filename) {
                    return Err(AppError::BadRequest(format!(
                        "'{filename}' is not a database file, expected .db, .sqlite, or .sqlite3"
                    )));
                }
                let mut out = tokio::fs::File::create(&upload).await?;
                let mut written = 0_usize;
                while let Some(chunk) = field.chunk().await? {
                    written += chunk.len();
                    out.write_all(&chunk).await?;
                }
                out.flush().await?;
                tracing::debug!(filename = %filename, bytes = written, "database upload staged");
                received = true;
            }
            "import-mode" | "import_mode" => {
                mode = field.text().await?.parse()?;
            }
            _ => {}
        }
    }

    if !received {
        return Err(AppError::BadRequest("no file uploaded".to_owned()));
    }

    let result = state.vault.import_database(&upload, mode).await?;
    let message = match result {
        DatabaseImport::Overwrite(summary) => format!(
            "database replaced: {} projects, {} keys",
            summary.projects, summary.keys
        ),
        DatabaseImport::Merge(summary) => format!(
            "database merged: {} projects created, {} keys imported",
            summary.projects_created, summary.keys_imported
        ),
    };
    tracing::info!(%mode, "database imported");
    Ok(Json(ImportDatabaseResponse { message, result }))
}
