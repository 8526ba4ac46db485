//! Whole-database snapshots.
//!
//! [`read`] loads projects and keys from another SQLite file without
//! touching the live store. Files written by older releases may lack the
//! ordering, encryption or timestamp columns; those are filled with
//! defaults and the positions are repaired when the snapshot is applied.
//! [`replace`] swaps the live contents for a snapshot, [`merge`] adds a
//! snapshot's contents next to what is already there.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row, SqliteConnection};

use crate::models::{ApiKey, NewKey, Project};
use crate::naming::{resolve, validate_name};
use crate::ordering::{self, Scope};
use crate::schema::REQUIRED_TABLES;
use crate::{StorageError, keys, projects};

/// Projects and keys read from a database file.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// In position order.
    pub projects: Vec<Project>,
    /// Ordered by project, then position.
    pub keys: Vec<ApiKey>,
}

/// What [`replace`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplaceSummary {
    pub projects: u64,
    pub keys: u64,
}

/// What [`merge`] added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub projects_created: u64,
    pub keys_imported: u64,
}

fn invalid(reason: impl Into<String>) -> StorageError {
    StorageError::InvalidSnapshot {
        reason: reason.into(),
    }
}

/// Read a snapshot from the SQLite file at `path`, read-only.
///
/// # Errors
///
/// Returns [`StorageError::InvalidSnapshot`] if the file is not a SQLite
/// database, lacks the `project` or `api_key` table, or its rows cannot be
/// read.
pub async fn read(path: &Path) -> Result<Snapshot, StorageError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .foreign_keys(false);
    let mut conn = options
        .connect()
        .await
        .map_err(|e| invalid(format!("cannot open database: {e}")))?;

    let result = read_tables(&mut conn).await;
    // The snapshot is already in memory; a failed close changes nothing.
    let _ = conn.close().await;
    result
}

async fn read_tables(conn: &mut SqliteConnection) -> Result<Snapshot, StorageError> {
    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| invalid(format!("not a SQLite database: {e}")))?;
    for required in REQUIRED_TABLES {
        if !tables.iter().any(|t| t == required) {
            return Err(invalid(format!("missing table '{required}'")));
        }
    }

    let project_columns = columns(conn, "project").await?;
    let key_columns = columns(conn, "api_key").await?;
    let pick = |present: &HashSet<String>, column: &str, fallback: &str| {
        if present.contains(column) {
            format!("\"{column}\"")
        } else {
            fallback.to_owned()
        }
    };

    let project_sql = format!(
        "SELECT id, name, IFNULL({}, 0) AS position, \
         CAST({} AS TEXT) AS created_at, CAST({} AS TEXT) AS updated_at \
         FROM project ORDER BY position, id",
        pick(&project_columns, "position", "0"),
        pick(&project_columns, "created_at", "NULL"),
        pick(&project_columns, "updated_at", "NULL"),
    );
    let projects = sqlx::query(&project_sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| invalid(format!("unreadable project table: {e}")))?
        .iter()
        .map(project_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    let key_sql = format!(
        "SELECT id, name, \"key\", IFNULL({}, 0) AS encrypted, {} AS encryption_salt, \
         {} AS description, {} AS used_with, {} AS project_id, IFNULL({}, 0) AS position, \
         CAST({} AS TEXT) AS created_at, CAST({} AS TEXT) AS updated_at \
         FROM api_key ORDER BY project_id, position, id",
        pick(&key_columns, "encrypted", "0"),
        pick(&key_columns, "encryption_salt", "NULL"),
        pick(&key_columns, "description", "NULL"),
        pick(&key_columns, "used_with", "NULL"),
        pick(&key_columns, "project_id", "NULL"),
        pick(&key_columns, "position", "0"),
        pick(&key_columns, "created_at", "NULL"),
        pick(&key_columns, "updated_at", "NULL"),
    );
    let keys = sqlx::query(&key_sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| invalid(format!("unreadable api_key table: {e}")))?
        .iter()
        .map(key_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Snapshot { projects, keys })
}

async fn columns(conn: &mut SqliteConnection, table: &str) -> Result<HashSet<String>, StorageError> {
    let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| invalid(format!("cannot inspect table '{table}': {e}")))?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("name"))
        .collect::<Result<_, _>>()
        .map_err(|e| invalid(e.to_string()))
}

fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Utc::now();
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|t| t.and_utc()))
        .unwrap_or_else(|_| Utc::now())
}

fn project_from_row(row: &SqliteRow) -> Result<Project, StorageError> {
    let read = || -> Result<Project, sqlx::Error> {
        Ok(Project {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            position: row.try_get("position")?,
            created_at: parse_timestamp(row.try_get::<Option<String>, _>("created_at")?.as_deref()),
            updated_at: parse_timestamp(row.try_get::<Option<String>, _>("updated_at")?.as_deref()),
        })
    };
    read().map_err(|e| invalid(format!("bad project row: {e}")))
}

fn key_from_row(row: &SqliteRow) -> Result<ApiKey, StorageError> {
    let read = || -> Result<ApiKey, sqlx::Error> {
        Ok(ApiKey {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            key: row.try_get("key")?,
            encrypted: row.try_get("encrypted")?,
            encryption_salt: row.try_get("encryption_salt")?,
            description: row.try_get("description")?,
            used_with: row.try_get("used_with")?,
            project_id: row.try_get("project_id")?,
            position: row.try_get("position")?,
            created_at: parse_timestamp(row.try_get::<Option<String>, _>("created_at")?.as_deref()),
            updated_at: parse_timestamp(row.try_get::<Option<String>, _>("updated_at")?.as_deref()),
        })
    };
    read().map_err(|e| invalid(format!("bad api_key row: {e}")))
}

/// Replace every project and key with the snapshot's contents.
///
/// Ids are kept. Keys pointing at a project the snapshot lacks become
/// unassigned, clashing names get a numeric suffix, and every scope is
/// normalized before the savepoint is released.
///
/// # Errors
///
/// Returns [`StorageError::InvalidSnapshot`] for a row with an unusable
/// name; nothing is replaced in that case.
pub async fn replace(
    conn: &mut SqliteConnection,
    snapshot: &Snapshot,
) -> Result<ReplaceSummary, StorageError> {
    let mut tx = conn.begin().await?;
    sqlx::query("DELETE FROM api_key").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM project").execute(&mut *tx).await?;

    let mut project_ids = HashSet::new();
    for project in &snapshot.projects {
        let base = validate_name(&project.name)
            .map_err(|e| invalid(format!("project {}: {e}", project.id)))?;
        let name = resolve(&mut tx, &base, Scope::Projects).await?;
        sqlx::query(
            "INSERT INTO project (id, name, position, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(project.id)
        .bind(&name)
        .bind(project.position)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&mut *tx)
        .await?;
        project_ids.insert(project.id);
    }

    let mut unassigned = 0_u64;
    for key in &snapshot.keys {
        let base = validate_name(&key.name).map_err(|e| invalid(format!("key {}: {e}", key.id)))?;
        let project_id = key.project_id.filter(|id| project_ids.contains(id));
        if project_id != key.project_id {
            unassigned += 1;
        }
        let name = resolve(&mut tx, &base, Scope::Keys(project_id)).await?;
        sqlx::query(
            r#"INSERT INTO api_key
                 (id, name, "key", encrypted, encryption_salt, description, used_with,
                  project_id, position, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(key.id)
        .bind(&name)
        .bind(&key.key)
        .bind(key.encrypted && key.encryption_salt.is_some())
        .bind(key.encryption_salt.as_deref())
        .bind(key.description.as_deref())
        .bind(key.used_with.as_deref())
        .bind(project_id)
        .bind(key.position)
        .bind(key.created_at)
        .bind(key.updated_at)
        .execute(&mut *tx)
        .await?;
    }

    let repaired = ordering::normalize_all(&mut tx).await?;
    tx.commit().await?;

    let summary = ReplaceSummary {
        projects: snapshot.projects.len() as u64,
        keys: snapshot.keys.len() as u64,
    };
    tracing::info!(
        projects = summary.projects,
        keys = summary.keys,
        unassigned,
        repaired,
        "store contents replaced"
    );
    Ok(summary)
}

/// Add a snapshot's projects and keys to the store without touching
/// existing rows.
///
/// Projects are matched by name; missing ones are created at the end of the
/// list. Every key is inserted as a new row at the end of its target scope
/// with its name resolved there.
///
/// # Errors
///
/// Returns [`StorageError::InvalidSnapshot`] for a row with an unusable
/// name; nothing is merged in that case.
pub async fn merge(
    conn: &mut SqliteConnection,
    snapshot: &Snapshot,
) -> Result<MergeSummary, StorageError> {
    let mut tx = conn.begin().await?;

    let mut project_map = HashMap::new();
    let mut projects_created = 0_u64;
    for project in &snapshot.projects {
        let name = validate_name(&project.name)
            .map_err(|e| invalid(format!("project {}: {e}", project.id)))?;
        let target = match projects::find_by_name(&mut tx, &name).await? {
            Some(existing) => existing,
            None => {
                projects_created += 1;
                projects::create(&mut tx, &name).await?
            }
        };
        project_map.insert(project.id, target.id);
    }

    let mut keys_imported = 0_u64;
    for key in &snapshot.keys {
        validate_name(&key.name).map_err(|e| invalid(format!("key {}: {e}", key.id)))?;
        let encrypted = key.encrypted && key.encryption_salt.is_some();
        keys::create(
            &mut tx,
            &NewKey {
                name: key.name.clone(),
                key: key.key.clone(),
                description: key.description.clone(),
                used_with: key.used_with.clone(),
                project_id: key.project_id.and_then(|id| project_map.get(&id).copied()),
                encrypted,
                encryption_salt: encrypted.then(|| key.encryption_salt.clone()).flatten(),
            },
        )
        .await?;
        keys_imported += 1;
    }

    tx.commit().await?;
    tracing::info!(projects_created, keys_imported, "snapshot merged");
    Ok(MergeSummary {
        projects_created,
        keys_imported,
    })
}
