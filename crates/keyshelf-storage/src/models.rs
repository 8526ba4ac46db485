//! Store data models.
//!
//! Rows map one-to-one onto the `project` and `api_key` tables. Salts are
//! never serialized; the key payload is, since the API returns it.

use chrono::{DateTime, Utc};
use serde::Serialize;

// ── Projects ─────────────────────────────────────────────────────────

/// A named group of keys with a global display position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What happens to a project's keys when the project is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Move the keys to the unassigned scope.
    #[default]
    Unassign,
    /// Delete the keys together with the project.
    Cascade,
}

/// Outcome of a project deletion.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectRemoval {
    pub project: Project,
    pub keys_deleted: u64,
    pub keys_unassigned: u64,
}

// ── Keys ─────────────────────────────────────────────────────────────

/// A stored API key.
///
/// When `encrypted` is set, `key` holds base64 ciphertext and
/// `encryption_salt` the salt its key was derived with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ApiKey {
    pub id: i64,
    pub name: String,
    pub key: String,
    pub encrypted: bool,
    #[serde(skip)]
    pub encryption_salt: Option<Vec<u8>>,
    pub description: Option<String>,
    pub used_with: Option<String>,
    pub project_id: Option<i64>,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a key insert. Position and final name are assigned by the store.
#[derive(Debug, Clone, Default)]
pub struct NewKey {
    pub name: String,
    pub key: String,
    pub description: Option<String>,
    pub used_with: Option<String>,
    pub project_id: Option<i64>,
    pub encrypted: bool,
    pub encryption_salt: Option<Vec<u8>>,
}

/// Partial update of a key's own fields.
///
/// `None` leaves a field untouched; `Some(None)` clears a nullable field.
/// Moving between projects is not a patch, see [`crate::keys::relocate`].
#[derive(Debug, Clone, Default)]
pub struct KeyPatch {
    pub name: Option<String>,
    pub key: Option<String>,
    pub description: Option<Option<String>>,
    pub used_with: Option<Option<String>>,
}

/// Encryption counts for a set of keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyStatus {
    pub total: i64,
    pub encrypted: i64,
    pub unencrypted: i64,
}
