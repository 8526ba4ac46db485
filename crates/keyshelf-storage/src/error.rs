//! Storage error types.
//!
//! Every error variant carries enough context to diagnose the problem
//! without a debugger. Secret values never appear in error messages, only
//! entity kinds, identifiers, and names.

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to open or create the database.
    #[error("failed to open store at '{path}': {reason}")]
    Open { path: String, reason: String },

    /// The requested entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A write collided with an existing entity (duplicate project name,
    /// unique index violation).
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    /// A name was empty or too long.
    #[error("invalid name: {reason}")]
    InvalidName { reason: String },

    /// An uploaded database file is not a usable store snapshot.
    #[error("invalid database snapshot: {reason}")]
    InvalidSnapshot { reason: String },

    /// The underlying SQLite query failed.
    #[error("database error: {0}")]
    Query(sqlx::Error),

    /// Filesystem access around snapshot files failed.
    #[error("snapshot i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Self::Conflict {
                reason: format!("unique constraint violated: {db_err}"),
            },
            _ => Self::Query(err),
        }
    }
}
