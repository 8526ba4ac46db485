//! The vault service.
//!
//! [`Vault`] is the injected store handle every operation runs through.
//! Mutations open one transaction, call into the storage repositories, and
//! commit; an error drops the transaction, which rolls it back.

use keyshelf_storage::{
    ApiKey, DeletePolicy, KeyPatch, KeyStatus, NewKey, Project, ProjectRemoval, Store, keys,
    projects,
};

use crate::error::VaultError;

/// Fields of a new key as supplied by a caller. Always stored as plaintext.
#[derive(Debug, Clone, Default)]
pub struct KeyDraft {
    pub name: String,
    pub key: String,
    pub description: Option<String>,
    pub used_with: Option<String>,
    pub project_id: Option<i64>,
}

/// A partial key update.
///
/// `project` of `Some(target)` moves the key to the end of `target`
/// (`Some(None)` is the unassigned scope) before the other fields apply.
#[derive(Debug, Clone, Default)]
pub struct KeyUpdate {
    pub patch: KeyPatch,
    pub project: Option<Option<i64>>,
}

/// Handle to the vault. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Vault {
    store: Store,
}

impl Vault {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    // ── Projects ─────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] on database failure.
    pub async fn list_projects(&self) -> Result<Vec<Project>, VaultError> {
        let mut conn = self.store.acquire().await?;
        Ok(projects::list(&mut conn).await?)
    }

    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if the project does not exist.
    pub async fn get_project(&self, id: i64) -> Result<Project, VaultError> {
        let mut conn = self.store.acquire().await?;
        Ok(projects::get(&mut conn, id).await?)
    }

    /// Create a project at the end of the list.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] for an empty or overlong name.
    pub async fn create_project(&self, name: &str) -> Result<Project, VaultError> {
        let mut tx = self.store.begin().await?;
        let project = projects::create(&mut tx, name).await?;
        tx.commit().await?;
        Ok(project)
    }

    /// # Errors
    ///
    /// Returns [`VaultError::Conflict`] if another project has the name.
    pub async fn rename_project(&self, id: i64, name: &str) -> Result<Project, VaultError> {
        let mut tx = self.store.begin().await?;
        let project = projects::rename(&mut tx, id, name).await?;
        tx.commit().await?;
        Ok(project)
    }

    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] for a negative position,
    /// [`VaultError::NotFound`] if the project does not exist.
    pub async fn reorder_project(&self, id: i64, new_position: i64) -> Result<Project, VaultError> {
        if new_position < 0 {
            return Err(VaultError::validation("new_position must be non-negative"));
        }
        let mut tx = self.store.begin().await?;
        let project = projects::reorder(&mut tx, id, new_position).await?;
        tx.commit().await?;
        tracing::info!(project_id = id, position = project.position, "project reordered");
        Ok(project)
    }

    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if the project does not exist.
    pub async fn delete_project(
        &self,
        id: i64,
        policy: DeletePolicy,
    ) -> Result<ProjectRemoval, VaultError> {
        let mut tx = self.store.begin().await?;
        let removal = projects::delete(&mut tx, id, policy).await?;
        tx.commit().await?;
        Ok(removal)
    }

    // ── Keys ─────────────────────────────────────────────────────────

    /// List keys, every key when `project_id` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] on database failure.
    pub async fn list_keys(&self, project_id: Option<i64>) -> Result<Vec<ApiKey>, VaultError> {
        let mut conn = self.store.acquire().await?;
        Ok(keys::list(&mut conn, project_id).await?)
    }

    /// List the unassigned keys only, in position order.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] on database failure.
    pub async fn list_unassigned_keys(&self) -> Result<Vec<ApiKey>, VaultError> {
        let mut conn = self.store.acquire().await?;
        Ok(keys::list_scope(&mut conn, None).await?)
    }

    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if the key does not exist.
    pub async fn get_key(&self, id: i64) -> Result<ApiKey, VaultError> {
        let mut conn = self.store.acquire().await?;
        Ok(keys::get(&mut conn, id).await?)
    }

    /// Create a plaintext key at the end of its scope.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] for an unusable name,
    /// [`VaultError::NotFound`] if the project does not exist.
    pub async fn create_key(&self, draft: KeyDraft) -> Result<ApiKey, VaultError> {
        let new = NewKey {
            name: draft.name,
            key: draft.key,
            description: draft.description,
            used_with: draft.used_with,
            project_id: draft.project_id,
            encrypted: false,
            encryption_salt: None,
        };
        let mut tx = self.store.begin().await?;
        let key = keys::create(&mut tx, &new).await?;
        tx.commit().await?;
        tracing::info!(key_id = key.id, project_id = ?key.project_id, "key created");
        Ok(key)
    }

    /// Apply a partial update; a project change runs as a move.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if the key or target project does
    /// not exist.
    pub async fn update_key(&self, id: i64, update: KeyUpdate) -> Result<ApiKey, VaultError> {
        let mut tx = self.store.begin().await?;
        if let Some(target) = update.project {
            keys::relocate(&mut tx, id, target).await?;
        }
        let key = keys::update(&mut tx, id, &update.patch).await?;
        tx.commit().await?;
        tracing::info!(key_id = id, "key updated");
        Ok(key)
    }

    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if the key does not exist.
    pub async fn delete_key(&self, id: i64) -> Result<ApiKey, VaultError> {
        let mut tx = self.store.begin().await?;
        let key = keys::delete(&mut tx, id).await?;
        tx.commit().await?;
        Ok(key)
    }

    /// Delete every key. Returns the count.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] on database failure.
    pub async fn delete_all_keys(&self) -> Result<u64, VaultError> {
        let mut tx = self.store.begin().await?;
        let deleted = keys::delete_all(&mut tx).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    /// Delete every key of one project. Returns the count.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if the project does not exist.
    pub async fn delete_project_keys(&self, project_id: i64) -> Result<u64, VaultError> {
        let mut tx = self.store.begin().await?;
        let deleted = keys::delete_in_project(&mut tx, project_id).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    /// Move a key to `new_position`, optionally into another scope.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] for a negative position,
    /// [`VaultError::NotFound`] if the key or target project does not exist.
    pub async fn reorder_key(
        &self,
        id: i64,
        new_position: i64,
        target: Option<Option<i64>>,
    ) -> Result<ApiKey, VaultError> {
        if new_position < 0 {
            return Err(VaultError::validation("new_position must be non-negative"));
        }
        let mut tx = self.store.begin().await?;
        let key = keys::reorder(&mut tx, id, new_position, target).await?;
        tx.commit().await?;
        tracing::info!(
            key_id = id,
            project_id = ?key.project_id,
            position = key.position,
            "key reordered"
        );
        Ok(key)
    }

    /// Move a key to the end of `target_project`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if the key or target project does
    /// not exist.
    pub async fn move_key(&self, id: i64, target_project: Option<i64>) -> Result<ApiKey, VaultError> {
        let mut tx = self.store.begin().await?;
        let key = keys::relocate(&mut tx, id, target_project).await?;
        tx.commit().await?;
        Ok(key)
    }

    /// Move or copy a key to the end of `target_project`.
    ///
    /// An encrypted source needs a password. The password is only checked
    /// for presence; the payload moves or copies still encrypted.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] if the key is encrypted and no
    /// password was given, [`VaultError::NotFound`] if the key or target
    /// project does not exist.
    pub async fn move_or_copy(
        &self,
        id: i64,
        target_project: Option<i64>,
        copy: bool,
        password: Option<&str>,
    ) -> Result<ApiKey, VaultError> {
        let mut tx = self.store.begin().await?;
        let source = keys::get(&mut tx, id).await?;
        // TODO: verify the password against the key's salt before moving, once
        // clients always send the password they encrypted with.
        if source.encrypted && password.is_none_or(str::is_empty) {
            return Err(VaultError::validation(
                "password is required to move or copy an encrypted key",
            ));
        }

        let key = if copy {
            keys::duplicate(&mut tx, id, target_project).await?
        } else {
            keys::relocate(&mut tx, id, target_project).await?
        };
        tx.commit().await?;
        Ok(key)
    }

    /// Encryption counts, for every key or one project.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] on database failure.
    pub async fn key_status(&self, project_id: Option<i64>) -> Result<KeyStatus, VaultError> {
        let mut conn = self.store.acquire().await?;
        Ok(keys::status(&mut conn, project_id).await?)
    }

    /// Round-trip the store.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the database is unreachable.
    pub async fn ping(&self) -> Result<(), VaultError> {
        Ok(self.store.ping().await?)
    }
}
