//! Ordering engine.
//!
//! Every scope keeps its positions as the dense sequence `0..count`. The
//! incremental shifts below keep that true on the common paths; the
//! normalization pass at the end of [`reorder`] rewrites any row whose
//! position differs from its rank, so out-of-range targets and drift left by
//! older databases are repaired in the same savepoint.

use std::fmt;

use chrono::Utc;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::{Connection, Row, SqliteConnection};

use crate::StorageError;

/// An ordering domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// All projects.
    Projects,
    /// Keys of one project, or the unassigned keys when `None`.
    Keys(Option<i64>),
}

impl Scope {
    pub(crate) fn table(self) -> &'static str {
        match self {
            Self::Projects => "project",
            Self::Keys(_) => "api_key",
        }
    }

    /// SQL predicate selecting the scope's rows. Binds at most one
    /// parameter, which [`scoped`] supplies.
    pub(crate) fn predicate(self) -> &'static str {
        match self {
            Self::Projects => "1 = 1",
            Self::Keys(_) => "project_id IS ?",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Projects => f.write_str("projects"),
            Self::Keys(Some(id)) => write!(f, "keys of project {id}"),
            Self::Keys(None) => f.write_str("unassigned keys"),
        }
    }
}

/// Start a query whose first placeholder is the scope predicate.
pub(crate) fn scoped(sql: &str, scope: Scope) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    let query = sqlx::query(sql);
    match scope {
        Scope::Projects => query,
        Scope::Keys(project_id) => query.bind(project_id),
    }
}

/// Where an entity currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub id: i64,
    pub scope: Scope,
    pub position: i64,
}

/// Position one past the last entity of `scope`, ignoring `exclude`.
///
/// # Errors
///
/// Returns [`StorageError::Query`] on database failure.
pub async fn next_position(
    conn: &mut SqliteConnection,
    scope: Scope,
    exclude: Option<i64>,
) -> Result<i64, StorageError> {
    let sql = format!(
        "SELECT COALESCE(MAX(position), -1) + 1 FROM {} WHERE {} AND id IS NOT ?",
        scope.table(),
        scope.predicate(),
    );
    let row = scoped(&sql, scope).bind(exclude).fetch_one(&mut *conn).await?;
    Ok(row.try_get(0)?)
}

/// Shift every entity after `position` down by one, closing the hole left by
/// `exclude` leaving the scope.
///
/// # Errors
///
/// Returns [`StorageError::Query`] on database failure.
pub async fn close_gap(
    conn: &mut SqliteConnection,
    scope: Scope,
    position: i64,
    exclude: i64,
) -> Result<u64, StorageError> {
    let sql = format!(
        "UPDATE {} SET position = position - 1 WHERE {} AND position > ? AND id != ?",
        scope.table(),
        scope.predicate(),
    );
    let done = scoped(&sql, scope)
        .bind(position)
        .bind(exclude)
        .execute(&mut *conn)
        .await?;
    Ok(done.rows_affected())
}

/// Rewrite positions in `scope` to their rank, ordered by `(position, id)`.
///
/// Returns how many rows were repaired. Idempotent.
///
/// # Errors
///
/// Returns [`StorageError::Query`] on database failure.
pub async fn normalize(conn: &mut SqliteConnection, scope: Scope) -> Result<u64, StorageError> {
    let sql = format!(
        "SELECT id, position FROM {} WHERE {} ORDER BY position, id",
        scope.table(),
        scope.predicate(),
    );
    let rows = scoped(&sql, scope).fetch_all(&mut *conn).await?;

    let update = format!("UPDATE {} SET position = ? WHERE id = ?", scope.table());
    let mut repaired = 0;
    for (rank, row) in (0_i64..).zip(rows) {
        let id: i64 = row.try_get("id")?;
        let position: i64 = row.try_get("position")?;
        if position != rank {
            sqlx::query(&update)
                .bind(rank)
                .bind(id)
                .execute(&mut *conn)
                .await?;
            repaired += 1;
        }
    }

    if repaired > 0 {
        tracing::debug!(%scope, repaired, "positions normalized");
    }
    Ok(repaired)
}

/// Normalize the project scope and every key scope present in the store.
///
/// # Errors
///
/// Returns [`StorageError::Query`] on database failure.
pub async fn normalize_all(conn: &mut SqliteConnection) -> Result<u64, StorageError> {
    let mut repaired = normalize(conn, Scope::Projects).await?;

    let scopes: Vec<Option<i64>> = sqlx::query_scalar("SELECT DISTINCT project_id FROM api_key")
        .fetch_all(&mut *conn)
        .await?;
    for project_id in scopes {
        repaired += normalize(conn, Scope::Keys(project_id)).await?;
    }
    Ok(repaired)
}

/// Move an entity to `new_position` inside `target`.
///
/// Inside one scope a non-negative `new_position` shifts the entities in
/// between by one. A negative `new_position` or a different `target` closes
/// the gap in the old scope and appends the entity to the end of `target`.
/// `rename` is written together with the new scope, for keys whose name
/// collides in the target. Both touched scopes are normalized before the
/// savepoint is released.
///
/// Returns the entity's final position.
///
/// # Errors
///
/// Returns [`StorageError::Query`] on database failure; nothing is written
/// in that case.
pub async fn reorder(
    conn: &mut SqliteConnection,
    current: Placement,
    target: Scope,
    new_position: i64,
    rename: Option<&str>,
) -> Result<i64, StorageError> {
    let Placement {
        id,
        scope: from,
        position: old_position,
    } = current;
    let table = from.table();
    let mut tx = conn.begin().await?;

    let landing = if from == target && new_position >= 0 {
        if new_position > old_position {
            let sql = format!(
                "UPDATE {table} SET position = position - 1 \
                 WHERE {} AND position > ? AND position <= ? AND id != ?",
                from.predicate(),
            );
            scoped(&sql, from)
                .bind(old_position)
                .bind(new_position)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        } else if new_position < old_position {
            let sql = format!(
                "UPDATE {table} SET position = position + 1 \
                 WHERE {} AND position >= ? AND position < ? AND id != ?",
                from.predicate(),
            );
            scoped(&sql, from)
                .bind(new_position)
                .bind(old_position)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        new_position
    } else {
        close_gap(&mut tx, from, old_position, id).await?;
        next_position(&mut tx, target, Some(id)).await?
    };

    let now = Utc::now();
    match target {
        Scope::Projects => {
            sqlx::query(
                "UPDATE project SET position = ?, name = COALESCE(?, name), updated_at = ? \
                 WHERE id = ?",
            )
            .bind(landing)
            .bind(rename)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        Scope::Keys(project_id) => {
            sqlx::query(
                "UPDATE api_key SET position = ?, name = COALESCE(?, name), project_id = ?, \
                 updated_at = ? WHERE id = ?",
            )
            .bind(landing)
            .bind(rename)
            .bind(project_id)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
    }

    normalize(&mut tx, from).await?;
    if target != from {
        normalize(&mut tx, target).await?;
    }

    let final_position: i64 = sqlx::query_scalar(&format!("SELECT position FROM {table} WHERE id = ?"))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::debug!(id, %from, %target, old_position, final_position, "entity reordered");
    Ok(final_position)
}
