//! Whole-database download and import.
//!
//! Staging files live in `tempfile` directories, which are removed when
//! they go out of scope on every exit path.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use keyshelf_storage::snapshot::{self, MergeSummary, ReplaceSummary, Snapshot};
use serde::Serialize;

use crate::error::VaultError;
use crate::vault::Vault;

/// How an uploaded database is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Replace the whole store.
    #[default]
    Overwrite,
    /// Add the upload's projects and keys next to the existing ones.
    Merge,
}

impl FromStr for ImportMode {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "merge" => Ok(Self::Merge),
            other => Err(VaultError::validation(format!(
                "unknown import mode '{other}', expected 'overwrite' or 'merge'"
            ))),
        }
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Overwrite => "overwrite",
            Self::Merge => "merge",
        })
    }
}

/// What a database import did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DatabaseImport {
    Overwrite(ReplaceSummary),
    Merge(MergeSummary),
}

/// A full copy of the store.
#[derive(Debug, Clone)]
pub struct DatabaseDump {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Vault {
    /// Take a consistent copy of the whole store.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the snapshot cannot be written and
    /// [`VaultError::Internal`] if the staging file cannot be read.
    pub async fn download_database(&self) -> Result<DatabaseDump, VaultError> {
        let staging = tempfile::tempdir()?;
        let path = staging.path().join("snapshot.db");
        self.store().snapshot_into(&path).await?;
        let bytes = tokio::fs::read(&path).await?;

        tracing::info!(bytes = bytes.len(), "database snapshot taken");
        Ok(DatabaseDump {
            filename: format!("keyshelf_backup_{}.db", Utc::now().format("%Y%m%d_%H%M%S")),
            bytes,
        })
    }

    /// Apply the SQLite file at `upload` to the store.
    ///
    /// The upload is validated before anything is changed. In overwrite mode
    /// the current store is backed up first; if replacing fails, the backup
    /// is written back and the original error returned.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] if the upload is not a usable
    /// database.
    pub async fn import_database(
        &self,
        upload: &Path,
        mode: ImportMode,
    ) -> Result<DatabaseImport, VaultError> {
        let incoming = snapshot::read(upload).await?;
        tracing::debug!(
            %mode,
            projects = incoming.projects.len(),
            keys = incoming.keys.len(),
            "database upload validated"
        );

        match mode {
            ImportMode::Merge => {
                let mut tx = self.store().begin().await?;
                let summary = snapshot::merge(&mut tx, &incoming).await?;
                tx.commit().await?;
                Ok(DatabaseImport::Merge(summary))
            }
            ImportMode::Overwrite => {
                let staging = tempfile::tempdir()?;
                let backup_path = staging.path().join("backup.db");
                self.store().snapshot_into(&backup_path).await?;
                let backup = snapshot::read(&backup_path).await?;

                match self.replace_with(&incoming).await {
                    Ok(summary) => Ok(DatabaseImport::Overwrite(summary)),
                    Err(err) => {
                        tracing::warn!(error = %err, "database overwrite failed, restoring backup");
                        if let Err(restore_err) = self.replace_with(&backup).await {
                            tracing::error!(error = %restore_err, "restoring backup failed");
                        }
                        Err(err)
                    }
                }
            }
        }
    }

    async fn replace_with(&self, contents: &Snapshot) -> Result<ReplaceSummary, VaultError> {
        let mut tx = self.store().begin().await?;
        let summary = snapshot::replace(&mut tx, contents).await?;
        tx.commit().await?;
        Ok(summary)
    }
}
