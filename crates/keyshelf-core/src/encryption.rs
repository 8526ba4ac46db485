//! Per-key encryption state machine.
//!
//! A key is either plain or encrypted. `encrypt` moves it from plain to
//! encrypted with a fresh salt, `decrypt` moves it back with the stored
//! salt. A failed transition leaves the key exactly as it was.
//!
//! Batch transitions process a filtered set of keys independently: keys
//! already in the target state are skipped, failures are collected, and all
//! successful transitions commit together.

use keyshelf_storage::{ApiKey, SqliteConnection, keys};
use serde::Serialize;

use crate::crypto;
use crate::error::VaultError;
use crate::vault::Vault;

/// Which keys a batch transition touches.
#[derive(Debug, Clone, Default)]
pub struct KeyFilter {
    /// Restrict to one project.
    pub project_id: Option<i64>,
    /// Restrict to these ids. Ids that do not exist are reported as failures.
    pub key_ids: Option<Vec<i64>>,
}

/// A key a batch transition could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedKey {
    pub id: i64,
    pub name: Option<String>,
    pub error: String,
}

/// Result of a batch transition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    /// Keys moved to the target state.
    pub processed: u64,
    /// Keys already in the target state.
    pub skipped: u64,
    pub failed_keys: Vec<FailedKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encrypt,
    Decrypt,
}

impl Direction {
    fn target_encrypted(self) -> bool {
        self == Self::Encrypt
    }
}

fn require_password(password: &str) -> Result<(), VaultError> {
    if password.is_empty() {
        Err(VaultError::validation("password is required"))
    } else {
        Ok(())
    }
}

async fn transition(
    conn: &mut SqliteConnection,
    key: &ApiKey,
    password: &str,
    direction: Direction,
) -> Result<ApiKey, VaultError> {
    let updated = match direction {
        Direction::Encrypt => {
            let sealed = crypto::seal(password, &key.key).await?;
            keys::set_secret(conn, key.id, &sealed.payload, Some(&sealed.salt)).await?
        }
        Direction::Decrypt => {
            let salt = key.encryption_salt.as_deref().ok_or_else(|| {
                VaultError::internal(format!("key {} is encrypted but has no salt", key.id))
            })?;
            let plain = crypto::unseal(password, salt, &key.key).await?;
            keys::set_secret(conn, key.id, &plain, None).await?
        }
    };
    Ok(updated)
}

impl Vault {
    /// Encrypt one plaintext key under `password`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] if the password is empty or the key
    /// is already encrypted, [`VaultError::NotFound`] if it does not exist.
    pub async fn encrypt_key(&self, id: i64, password: &str) -> Result<ApiKey, VaultError> {
        self.transition_one(id, password, Direction::Encrypt).await
    }

    /// Decrypt one encrypted key with `password`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Decryption`] on a wrong password (the key is
    /// unchanged), [`VaultError::Validation`] if the key is not encrypted.
    pub async fn decrypt_key(&self, id: i64, password: &str) -> Result<ApiKey, VaultError> {
        self.transition_one(id, password, Direction::Decrypt).await
    }

    /// Encrypt every plaintext key matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] if the password is empty. Per-key
    /// failures are reported in the outcome instead.
    pub async fn encrypt_keys(
        &self,
        filter: &KeyFilter,
        password: &str,
    ) -> Result<BatchOutcome, VaultError> {
        self.transition_many(filter, password, Direction::Encrypt).await
    }

    /// Decrypt every encrypted key matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] if the password is empty. Wrong
    /// passwords are reported per key in the outcome.
    pub async fn decrypt_keys(
        &self,
        filter: &KeyFilter,
        password: &str,
    ) -> Result<BatchOutcome, VaultError> {
        self.transition_many(filter, password, Direction::Decrypt).await
    }

    async fn transition_one(
        &self,
        id: i64,
        password: &str,
        direction: Direction,
    ) -> Result<ApiKey, VaultError> {
        require_password(password)?;
        let mut tx = self.store().begin().await?;
        let key = keys::get(&mut tx, id).await?;
        if key.encrypted == direction.target_encrypted() {
            let state = if key.encrypted { "already" } else { "not" };
            return Err(VaultError::validation(format!("key {id} is {state} encrypted")));
        }

        let updated = transition(&mut tx, &key, password, direction).await?;
        tx.commit().await?;
        tracing::info!(key_id = id, encrypted = updated.encrypted, "key encryption changed");
        Ok(updated)
    }

    async fn transition_many(
        &self,
        filter: &KeyFilter,
        password: &str,
        direction: Direction,
    ) -> Result<BatchOutcome, VaultError> {
        require_password(password)?;
        let mut tx = self.store().begin().await?;
        let mut candidates = keys::list(&mut tx, filter.project_id).await?;
        let mut outcome = BatchOutcome::default();

        if let Some(ids) = &filter.key_ids {
            candidates.retain(|k| ids.contains(&k.id));
            for id in ids {
                if !candidates.iter().any(|k| k.id == *id) {
                    outcome.failed_keys.push(FailedKey {
                        id: *id,
                        name: None,
                        error: "key not found".to_owned(),
                    });
                }
            }
        }

        for key in &candidates {
            if key.encrypted == direction.target_encrypted() {
                outcome.skipped += 1;
                continue;
            }
            match transition(&mut tx, key, password, direction).await {
                Ok(_) => outcome.processed += 1,
                Err(e) => {
                    tracing::warn!(key_id = key.id, error = %e, "key skipped in batch");
                    outcome.failed_keys.push(FailedKey {
                        id: key.id,
                        name: Some(key.name.clone()),
                        error: e.to_string(),
                    });
                }
            }
        }

        tx.commit().await?;
        tracing::info!(
            ?direction,
            processed = outcome.processed,
            skipped = outcome.skipped,
            failed = outcome.failed_keys.len(),
            "batch encryption finished"
        );
        Ok(outcome)
    }
}
