//! Project repository.
//!
//! Every function takes a `&mut SqliteConnection` and returns
//! `Result<T, StorageError>`. Multi-statement mutations open a savepoint on
//! that connection.

use chrono::Utc;
use sqlx::{Connection, SqliteConnection};

use crate::models::{DeletePolicy, Project, ProjectRemoval};
use crate::naming::{resolve, validate_name};
use crate::ordering::{self, Placement, Scope};
use crate::{StorageError, keys};

/// List all projects in display order.
///
/// # Errors
///
/// Returns [`StorageError::Query`] on database failure.
pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Project>, StorageError> {
    let projects = sqlx::query_as::<_, Project>("SELECT * FROM project ORDER BY position, id")
        .fetch_all(&mut *conn)
        .await?;
    Ok(projects)
}

/// Get a project by id.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] if the project does not exist.
pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Project, StorageError> {
    sqlx::query_as::<_, Project>("SELECT * FROM project WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StorageError::not_found("project", id))
}

/// Find a project by exact name.
///
/// # Errors
///
/// Returns [`StorageError::Query`] on database failure.
pub async fn find_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<Project>, StorageError> {
    let project = sqlx::query_as::<_, Project>("SELECT * FROM project WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(project)
}

/// Fail with `NotFound` unless the project exists.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] if the project does not exist.
pub async fn ensure_exists(conn: &mut SqliteConnection, id: i64) -> Result<(), StorageError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM project WHERE id = ?)")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(StorageError::not_found("project", id))
    }
}

/// Create a project at the end of the list. A taken name gets a numeric suffix.
///
/// # Errors
///
/// Returns [`StorageError::InvalidName`] for an empty or overlong name.
pub async fn create(conn: &mut SqliteConnection, name: &str) -> Result<Project, StorageError> {
    let base = validate_name(name)?;
    let mut tx = conn.begin().await?;

    let name = resolve(&mut tx, &base, Scope::Projects).await?;
    let position = ordering::next_position(&mut tx, Scope::Projects, None).await?;
    let now = Utc::now();

    let project = sqlx::query_as::<_, Project>(
        r"INSERT INTO project (name, position, created_at, updated_at)
          VALUES (?, ?, ?, ?)
          RETURNING *",
    )
    .bind(&name)
    .bind(position)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(project_id = project.id, name = %project.name, position, "project created");
    Ok(project)
}

/// Rename a project. Renaming to its current name is a no-op.
///
/// # Errors
///
/// Returns [`StorageError::Conflict`] if another project already has the name,
/// [`StorageError::NotFound`] if the project does not exist.
pub async fn rename(
    conn: &mut SqliteConnection,
    id: i64,
    name: &str,
) -> Result<Project, StorageError> {
    let name = validate_name(name)?;
    let current = get(conn, id).await?;
    if current.name == name {
        return Ok(current);
    }
    if find_by_name(conn, &name).await?.is_some() {
        return Err(StorageError::Conflict {
            reason: format!("a project named '{name}' already exists"),
        });
    }

    let project = sqlx::query_as::<_, Project>(
        "UPDATE project SET name = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(&name)
    .bind(Utc::now())
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(project_id = id, name = %project.name, "project renamed");
    Ok(project)
}

/// Move a project to `new_position` in the global project order.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] if the project does not exist.
pub async fn reorder(
    conn: &mut SqliteConnection,
    id: i64,
    new_position: i64,
) -> Result<Project, StorageError> {
    let project = get(conn, id).await?;
    let current = Placement {
        id,
        scope: Scope::Projects,
        position: project.position,
    };
    ordering::reorder(conn, current, Scope::Projects, new_position, None).await?;
    get(conn, id).await
}

/// Delete a project, deleting or unassigning its keys per `policy`.
///
/// Unassigned keys are appended to the unassigned scope in their current
/// order, with names re-resolved there.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] if the project does not exist.
pub async fn delete(
    conn: &mut SqliteConnection,
    id: i64,
    policy: DeletePolicy,
) -> Result<ProjectRemoval, StorageError> {
    let mut tx = conn.begin().await?;
    let project = get(&mut tx, id).await?;

    let mut keys_deleted = 0;
    let mut keys_unassigned = 0;
    match policy {
        DeletePolicy::Cascade => {
            keys_deleted = sqlx::query("DELETE FROM api_key WHERE project_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        DeletePolicy::Unassign => {
            let orphans = keys::list(&mut tx, Some(id)).await?;
            for key in orphans {
                let name = resolve(&mut tx, &key.name, Scope::Keys(None)).await?;
                let position = ordering::next_position(&mut tx, Scope::Keys(None), None).await?;
                sqlx::query(
                    "UPDATE api_key SET project_id = NULL, name = ?, position = ?, updated_at = ? \
                     WHERE id = ?",
                )
                .bind(&name)
                .bind(position)
                .bind(Utc::now())
                .bind(key.id)
                .execute(&mut *tx)
                .await?;
                keys_unassigned += 1;
            }
        }
    }

    sqlx::query("DELETE FROM project WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    ordering::close_gap(&mut tx, Scope::Projects, project.position, id).await?;
    ordering::normalize(&mut tx, Scope::Projects).await?;
    tx.commit().await?;

    tracing::info!(
        project_id = id,
        name = %project.name,
        keys_deleted,
        keys_unassigned,
        "project deleted"
    );
    Ok(ProjectRemoval {
        project,
        keys_deleted,
        keys_unassigned,
    })
}
