//! Core library for `KeyShelf`.
//!
//! Contains the password-based cipher, the import/export codecs, and the
//! [`Vault`] service that runs every operation on the entity store inside
//! one transaction. This crate depends on `keyshelf-storage` for persistence
//! and knows nothing about HTTP.

pub mod backup;
pub mod codec;
pub mod crypto;
pub mod encryption;
pub mod error;
pub mod transfer;
pub mod vault;

pub use error::{CodecError, CryptoError, VaultError};
pub use vault::Vault;
