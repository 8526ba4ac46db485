//! Project routes: `/projects/*`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, patch};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use keyshelf_storage::{DeletePolicy, Project, ProjectRemoval};

use super::CountResponse;
use crate::error::AppError;
use crate::extract::{Path, Payload, Query};
use crate::state::AppState;

/// Request body for creating or renaming a project.
#[derive(Debug, Default, Deserialize)]
pub struct ProjectNameRequest {
    pub name: Option<String>,
}

/// Request body for reordering a project.
#[derive(Debug, Deserialize)]
pub struct ReorderProjectRequest {
    pub new_position: Option<i64>,
}

/// `?delete_keys=` on project delete. Keys are unassigned unless it is `true`.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteProjectQuery {
    #[serde(default)]
    pub delete_keys: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteProjectResponse {
    pub message: String,
    #[serde(flatten)]
    pub removal: ProjectRemoval,
}

/// Build the projects router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/projects/{id}/keys", delete(delete_project_keys))
        .route("/projects/{id}/reorder", patch(reorder_project))
}

/// `GET /projects`: every project by position.
async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Project>>, AppError> {
    Ok(Json(state.vault.list_projects().await?))
}

/// `POST /projects`: append a project. A taken name gets a numeric suffix.
async fn create_project(
    State(state): State<Arc<AppState>>,
    Payload(body): Payload<ProjectNameRequest>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    let name = body
        .name
        .ok_or_else(|| AppError::BadRequest("project name is required".to_owned()))?;
    let project = state.vault.create_project(&name).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(state.vault.get_project(id).await?))
}

/// `PUT /projects/{id}`: rename. Returns 409 if another project has the name.
async fn update_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Payload(body): Payload<ProjectNameRequest>,
) -> Result<Json<Project>, AppError> {
    let project = match body.name {
        Some(name) => state.vault.rename_project(id, &name).await?,
        None => state.vault.get_project(id).await?,
    };
    Ok(Json(project))
}

/// `DELETE /projects/{id}?delete_keys=bool`
async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<DeleteProjectQuery>,
) -> Result<Json<DeleteProjectResponse>, AppError> {
    let policy = if query.delete_keys {
        DeletePolicy::Cascade
    } else {
        DeletePolicy::Unassign
    };
    let removal = state.vault.delete_project(id, policy).await?;
    Ok(Json(DeleteProjectResponse {
        message: format!("project '{}' deleted", removal.project.name),
        removal,
    }))
}

/// `DELETE /projects/{id}/keys`
async fn delete_project_keys(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<CountResponse>, AppError> {
    let count = state.vault.delete_project_keys(id).await?;
    Ok(Json(CountResponse {
        message: format!("deleted {count} keys from project {id}"),
        count,
    }))
}

/// `PATCH /projects/{id}/reorder`
async fn reorder_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Payload(body): Payload<ReorderProjectRequest>,
) -> Result<Json<Project>, AppError> {
    let position = body
        .new_position
        .ok_or_else(|| AppError::BadRequest("missing required field 'new_position'".to_owned()))?;
    Ok(Json(state.vault.reorder_project(id, position).await?))
}
