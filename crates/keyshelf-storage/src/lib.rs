//! Entity store for `KeyShelf`.
//!
//! Persists projects and API keys in SQLite through `sqlx` and owns the two
//! invariants every mutation must leave behind:
//!
//! - positions inside each ordering scope form the dense sequence
//!   `0..count` (see [`ordering`]);
//! - names are unique per scope (see [`naming`]), backed by a unique index.
//!
//! Repository functions in [`projects`] and [`keys`] take a
//! `&mut SqliteConnection` so callers decide the transaction boundary. Each
//! multi-statement mutation opens its own savepoint on that connection, so
//! it stays atomic whether or not the caller already holds a transaction.
//!
//! The pool holds a single connection. SQLite has one writer anyway, and a
//! single connection serializes every transaction without application locks.

mod error;
pub mod keys;
mod models;
pub mod naming;
pub mod ordering;
pub mod projects;
mod schema;
pub mod snapshot;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, Transaction};

pub use error::StorageError;
pub use models::{ApiKey, DeletePolicy, KeyPatch, KeyStatus, NewKey, Project, ProjectRemoval};
pub use sqlx::SqliteConnection;

/// Handle to the SQLite store. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    location: String,
    // Backing directory of a scratch store, removed with the last handle.
    scratch: Option<Arc<tempfile::TempDir>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) a store backed by the file at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened or the
    /// schema cannot be applied.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::connect(file_options(path), path.display().to_string()).await
    }

    /// Open an empty scratch store that is discarded with its last handle.
    ///
    /// Backed by a private temporary file, not a `:memory:` connection:
    /// `VACUUM INTO` writes no file from an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the scratch directory cannot be
    /// created and [`StorageError::Open`] if `SQLite` cannot be initialized.
    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let scratch = tempfile::Builder::new().prefix("keyshelf-").tempdir()?;
        let options = file_options(&scratch.path().join("scratch.db"));
        let mut store = Self::connect(options, ":memory:".to_owned()).await?;
        store.scratch = Some(Arc::new(scratch));
        Ok(store)
    }

    async fn connect(options: SqliteConnectOptions, location: String) -> Result<Self, StorageError> {
        // One long-lived connection gives a single writer.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Open {
                path: location.clone(),
                reason: e.to_string(),
            })?;

        let store = Self {
            pool,
            location,
            scratch: None,
        };
        store.migrate().await.map_err(|e| StorageError::Open {
            path: store.location.clone(),
            reason: format!("schema setup failed: {e}"),
        })?;

        tracing::debug!(location = %store.location, "store opened");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::raw_sql(schema::SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Where the store lives (a file path, or `:memory:` for a scratch store).
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a top-level transaction. Dropping it without commit rolls back.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if `BEGIN` fails.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StorageError> {
        Ok(self.pool.begin().await?)
    }

    /// Check out the connection for read-only work outside a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if the pool is closed.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>, StorageError> {
        Ok(self.pool.acquire().await?)
    }

    /// Round-trip a trivial query.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if the database is unreachable.
    pub async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Write a consistent copy of the whole database to `dest`.
    ///
    /// `dest` must not exist yet. Uses `VACUUM INTO`, so the copy is compact
    /// and taken under a read lock.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if `SQLite` cannot write the copy and
    /// [`StorageError::Io`] if no file appeared at `dest`.
    pub async fn snapshot_into(&self, dest: &Path) -> Result<(), StorageError> {
        sqlx::query("VACUUM INTO ?")
            .bind(dest.display().to_string())
            .execute(&self.pool)
            .await?;
        if !dest.try_exists()? {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("snapshot was not written to '{}'", dest.display()),
            )));
        }
        tracing::debug!(dest = %dest.display(), "store snapshot written");
        Ok(())
    }
}

fn file_options(path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5))
}
