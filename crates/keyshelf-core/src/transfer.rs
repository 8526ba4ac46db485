//! Bulk import and export of name/value pairs.

use std::collections::HashSet;

use chrono::Utc;
use keyshelf_storage::naming::{suffixed, validate_name};
use keyshelf_storage::{NewKey, projects};
use serde::Serialize;

use crate::codec::{self, Format};
use crate::crypto;
use crate::error::VaultError;
use crate::vault::Vault;

/// Keys created by an import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    /// Final names, after suffixes were applied to taken ones.
    pub names: Vec<String>,
    /// Entries left out because their name is unusable.
    pub skipped: Vec<SkippedEntry>,
}

/// An import entry that was not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: String,
}

/// Give every pair a distinct name, so formats keyed by name keep all of
/// them. Later duplicates get the first free `name`+N.
fn distinct_names(pairs: &mut [(String, String)]) {
    let mut seen = HashSet::with_capacity(pairs.len());
    for (name, _) in pairs.iter_mut() {
        if seen.insert(name.clone()) {
            continue;
        }
        let taken = name.clone();
        let mut suffix = 1_u64;
        while seen.contains(&suffixed(&taken, suffix)) {
            suffix += 1;
        }
        *name = suffixed(&taken, suffix);
        tracing::debug!(name = %taken, exported_as = %name, "duplicate export name renamed");
        seen.insert(name.clone());
    }
}

/// A rendered export, ready to be sent as a download.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub body: String,
}

impl Vault {
    /// Import an uploaded `.env`/JSON/YAML file into a project.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Codec`] for an unsupported extension or a
    /// malformed structured file, [`VaultError::Validation`] if the file is
    /// not UTF-8, [`VaultError::NotFound`] if the project does not exist.
    pub async fn import_file(
        &self,
        project_id: i64,
        filename: &str,
        contents: &[u8],
    ) -> Result<ImportSummary, VaultError> {
        let format = Format::for_filename(filename)?;
        let text = std::str::from_utf8(contents)
            .map_err(|_| VaultError::validation(format!("'{filename}' is not valid UTF-8")))?;
        let pairs = codec::decode(format, text)?;
        tracing::debug!(project_id, %format, pairs = pairs.len(), "import file decoded");
        self.import_pairs(Some(project_id), pairs).await
    }

    /// Import the given environment variables into a project.
    ///
    /// The caller decides which variables are exposed; this operation stores
    /// whatever it is handed.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if the project does not exist.
    pub async fn import_environment(
        &self,
        project_id: i64,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<ImportSummary, VaultError> {
        self.import_pairs(Some(project_id), vars.into_iter().collect())
            .await
    }

    /// Append each pair as a new plaintext key, in one transaction.
    ///
    /// Pairs with an unusable name (blank, or too long) are logged, left out,
    /// and listed in [`ImportSummary::skipped`].
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if the project does not exist.
    pub async fn import_pairs(
        &self,
        project_id: Option<i64>,
        pairs: Vec<(String, String)>,
    ) -> Result<ImportSummary, VaultError> {
        let mut tx = self.store().begin().await?;
        if let Some(id) = project_id {
            projects::ensure_exists(&mut tx, id).await?;
        }

        let mut names = Vec::with_capacity(pairs.len());
        let mut skipped = Vec::new();
        for (name, value) in pairs {
            if let Err(e) = validate_name(&name) {
                tracing::warn!(name = %name, error = %e, "import entry skipped");
                skipped.push(SkippedEntry {
                    name,
                    reason: e.to_string(),
                });
                continue;
            }
            let new = NewKey {
                name,
                key: value,
                project_id,
                ..NewKey::default()
            };
            let key = keyshelf_storage::keys::create(&mut tx, &new).await?;
            names.push(key.name);
        }
        tx.commit().await?;

        tracing::info!(
            project_id = ?project_id,
            imported = names.len(),
            skipped = skipped.len(),
            "keys imported"
        );
        Ok(ImportSummary {
            imported: names.len(),
            names,
            skipped,
        })
    }

    /// Render keys as a downloadable file.
    ///
    /// Encrypted keys are decrypted in memory with `password`; stored rows
    /// are never modified.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] if encrypted keys are present and
    /// no password was given, [`VaultError::Decryption`] if the password is
    /// wrong for any of them.
    pub async fn export(
        &self,
        format: Format,
        project_id: Option<i64>,
        password: Option<&str>,
    ) -> Result<ExportFile, VaultError> {
        if let Some(id) = project_id {
            self.get_project(id).await?;
        }
        let keys = self.list_keys(project_id).await?;
        let password = password.filter(|p| !p.is_empty());
        if password.is_none() && keys.iter().any(|k| k.encrypted) {
            return Err(VaultError::validation(
                "password is required to export encrypted keys",
            ));
        }

        let mut pairs = Vec::with_capacity(keys.len());
        for key in keys {
            let value = match (&key.encryption_salt, password) {
                (Some(salt), Some(password)) if key.encrypted => {
                    crypto::unseal(password, salt, &key.key).await?
                }
                _ => key.key,
            };
            pairs.push((key.name, value));
        }
        distinct_names(&mut pairs);

        let body = codec::encode(format, &pairs)?;
        let filename = format!(
            "api_keys_{}.{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            format.extension()
        );
        tracing::info!(%format, project_id = ?project_id, keys = pairs.len(), "keys exported");
        Ok(ExportFile {
            filename,
            content_type: format.content_type(),
            body,
        })
    }
}
