//! Key routes: `/keys/*` and `/api/keys/move`.
//!
//! Lists are ordered by project, then position. Creating, moving, and
//! copying append to the end of the target scope; names taken in that scope
//! get a numeric suffix instead of an error.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use keyshelf_core::vault::{KeyDraft, KeyUpdate};
use keyshelf_storage::{ApiKey, KeyPatch, KeyStatus};

use super::{CountResponse, MessageResponse};
use crate::error::AppError;
use crate::extract::{Path, Payload, Query, double_option, optional_id};
use crate::state::AppState;

/// `?project_id=` filter; blank means every key.
#[derive(Debug, Default, Deserialize)]
pub struct ProjectFilter {
    #[serde(default, deserialize_with = "optional_id")]
    pub project_id: Option<i64>,
}

/// Query for `GET /keys`: one project, the unassigned keys, or every key.
#[derive(Debug, Default, Deserialize)]
pub struct KeyListQuery {
    #[serde(default, deserialize_with = "optional_id")]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub unassigned: bool,
}

/// Request body for creating a key.
#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub name: Option<String>,
    pub key: Option<String>,
    pub description: Option<String>,
    pub used_with: Option<String>,
    pub project_id: Option<i64>,
}

/// Request body for a partial key update. `null` clears a nullable field;
/// `project_id` moves the key.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateKeyRequest {
    pub name: Option<String>,
    pub key: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub used_with: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub project_id: Option<Option<i64>>,
}

/// Request body for reordering a key, optionally into another scope.
#[derive(Debug, Deserialize)]
pub struct ReorderKeyRequest {
    pub new_position: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub project_id: Option<Option<i64>>,
}

/// Request body for `PATCH /keys/{id}/project`.
#[derive(Debug, Deserialize)]
pub struct SetProjectRequest {
    #[serde(default)]
    pub project_id: Option<i64>,
}

/// Request body for `POST /api/keys/move`.
#[derive(Debug, Deserialize)]
pub struct MoveKeyRequest {
    pub key_id: Option<i64>,
    #[serde(default)]
    pub target_project_id: Option<i64>,
    #[serde(default)]
    pub is_copy: bool,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MoveKeyResponse {
    pub message: &'static str,
    pub key: ApiKey,
}

/// Build the keys router.
///
/// Paths:
/// - `GET    /keys`              list (`?project_id=` or `?unassigned=true`)
/// - `POST   /keys`              create
/// - `DELETE /keys`              delete every key
/// - `GET    /keys/status`       encryption counts (`?project_id=`)
/// - `GET    /keys/{id}`         read
/// - `PUT    /keys/{id}`         partial update
/// - `DELETE /keys/{id}`         delete
/// - `PATCH  /keys/{id}/reorder` move within or across scopes
/// - `PATCH  /keys/{id}/project` move to the end of a project
/// - `POST   /api/keys/move`     move or copy
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/keys",
            get(list_keys).post(create_key).delete(delete_all_keys),
        )
        .route("/keys/status", get(key_status))
        .route("/keys/{id}", get(get_key).put(update_key).delete(delete_key))
        .route("/keys/{id}/reorder", patch(reorder_key))
        .route("/keys/{id}/project", patch(set_key_project))
        .route("/api/keys/move", post(move_key))
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::BadRequest(format!("missing required field '{field}'")))
}

/// `GET /keys`
async fn list_keys(
    State(state): State<Arc<AppState>>,
    Query(query): Query<KeyListQuery>,
) -> Result<Json<Vec<ApiKey>>, AppError> {
    let keys = match (query.unassigned, query.project_id) {
        (true, Some(_)) => {
            return Err(AppError::BadRequest(
                "'unassigned' and 'project_id' cannot be combined".to_owned(),
            ));
        }
        (true, None) => state.vault.list_unassigned_keys().await?,
        (false, project_id) => state.vault.list_keys(project_id).await?,
    };
    Ok(Json(keys))
}

/// `POST /keys`
async fn create_key(
    State(state): State<Arc<AppState>>,
    Payload(body): Payload<CreateKeyRequest>,
) -> Result<(StatusCode, Json<ApiKey>), AppError> {
    let draft = KeyDraft {
        name: required(body.name, "name")?,
        key: required(body.key, "key")?,
        description: body.description,
        used_with: body.used_with,
        project_id: body.project_id,
    };
    let key = state.vault.create_key(draft).await?;
    Ok((StatusCode::CREATED, Json(key)))
}

/// `DELETE /keys`
async fn delete_all_keys(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CountResponse>, AppError> {
    let count = state.vault.delete_all_keys().await?;
    Ok(Json(CountResponse {
        message: format!("deleted {count} keys"),
        count,
    }))
}

/// `GET /keys/status`
async fn key_status(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ProjectFilter>,
) -> Result<Json<KeyStatus>, AppError> {
    Ok(Json(state.vault.key_status(filter.project_id).await?))
}

/// `GET /keys/{id}`
async fn get_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiKey>, AppError> {
    Ok(Json(state.vault.get_key(id).await?))
}

/// `PUT /keys/{id}`
async fn update_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Payload(body): Payload<UpdateKeyRequest>,
) -> Result<Json<ApiKey>, AppError> {
    let update = KeyUpdate {
        patch: KeyPatch {
            name: body.name,
            key: body.key,
            description: body.description,
            used_with: body.used_with,
        },
        project: body.project_id,
    };
    Ok(Json(state.vault.update_key(id, update).await?))
}

/// `DELETE /keys/{id}`
async fn delete_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    let key = state.vault.delete_key(id).await?;
    Ok(Json(MessageResponse::new(format!("key '{}' deleted", key.name))))
}

/// `PATCH /keys/{id}/reorder`
///
/// An absent `project_id` keeps the key's scope; an explicit `null` targets
/// the unassigned keys.
async fn reorder_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Payload(body): Payload<ReorderKeyRequest>,
) -> Result<Json<ApiKey>, AppError> {
    let position = required(body.new_position, "new_position")?;
    Ok(Json(
        state
            .vault
            .reorder_key(id, position, body.project_id)
            .await?,
    ))
}

/// `PATCH /keys/{id}/project`
async fn set_key_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Payload(body): Payload<SetProjectRequest>,
) -> Result<Json<ApiKey>, AppError> {
    Ok(Json(state.vault.move_key(id, body.project_id).await?))
}

/// `POST /api/keys/move`
async fn move_key(
    State(state): State<Arc<AppState>>,
    Payload(body): Payload<MoveKeyRequest>,
) -> Result<Json<MoveKeyResponse>, AppError> {
    let id = required(body.key_id, "key_id")?;
    let key = state
        .vault
        .move_or_copy(
            id,
            body.target_project_id,
            body.is_copy,
            body.password.as_deref(),
        )
        .await?;
    let message = if body.is_copy {
        "key copied"
    } else {
        "key moved"
    };
    Ok(Json(MoveKeyResponse { message, key }))
}
