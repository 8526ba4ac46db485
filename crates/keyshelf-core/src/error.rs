//! Error types for `keyshelf-core`.
//!
//! Each error variant carries enough context to diagnose the problem without
//! a debugger. Crypto errors never include passwords, derived keys, or
//! plaintext secrets.

use keyshelf_storage::StorageError;

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// AES-256-GCM encryption failed.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// AES-256-GCM decryption failed (wrong password, corrupted ciphertext, or tampered tag).
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    /// PBKDF2 key derivation failed or could not be scheduled.
    #[error("key derivation failed: {reason}")]
    KeyDerivation { reason: String },

    /// The stored payload is not valid base64 or is too short to hold a nonce and tag.
    #[error("invalid encrypted payload: {reason}")]
    InvalidPayload { reason: String },
}

/// Errors from the import/export codecs.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The file extension or export format is not supported.
    #[error("unsupported format '{format}', expected one of: {expected}")]
    UnsupportedFormat { format: String, expected: String },

    /// The input is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The input is not valid YAML.
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A structured document whose top level is not a mapping.
    #[error("top-level value must be an object of name/value pairs")]
    NotAnObject,
}

/// Errors from vault operations. Each maps to one HTTP status class.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The requested project or key does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The request is missing a field or carries a malformed one.
    #[error("{reason}")]
    Validation { reason: String },

    /// The write collides with an existing entity.
    #[error("{reason}")]
    Conflict { reason: String },

    /// Wrong password or corrupted payload.
    #[error(transparent)]
    Decryption(CryptoError),

    /// An import file could not be decoded, or an export format is unknown.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The store failed underneath the operation.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// Anything else: encryption failure, staging-file I/O, task failure.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl VaultError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub(crate) fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }
}

impl From<StorageError> for VaultError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => Self::NotFound { entity, id },
            StorageError::Conflict { reason } => Self::Conflict { reason },
            StorageError::InvalidName { reason } | StorageError::InvalidSnapshot { reason } => {
                Self::Validation { reason }
            }
            other => Self::Storage(other),
        }
    }
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Decryption { .. } | CryptoError::InvalidPayload { .. } => {
                Self::Decryption(err)
            }
            CryptoError::Encryption { .. } | CryptoError::KeyDerivation { .. } => Self::Internal {
                reason: err.to_string(),
            },
        }
    }
}

impl From<sqlx::Error> for VaultError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::from(err).into()
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            reason: format!("staging file error: {err}"),
        }
    }
}
