//! Cryptographic primitives for `KeyShelf`.
//!
//! Provides PBKDF2-HMAC-SHA256 password key derivation, AES-256-GCM
//! authenticated encryption, and a zeroize-on-drop key newtype. Derived keys
//! are cleared from memory when dropped.
//!
//! # Security model
//!
//! - Every encrypted key gets its own random 16-byte salt.
//! - Keys are derived with 100 000 PBKDF2 iterations into 32 bytes.
//! - Every encryption generates a fresh 96-bit nonce via `OsRng`.
//! - Stored payload: `base64(nonce (12 bytes) || ciphertext || tag (16 bytes))`.
//! - A wrong password fails the tag check; it never yields wrong plaintext.

use std::fmt;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Nonce length for AES-256-GCM (96 bits).
const NONCE_LEN: usize = 12;

/// Minimum ciphertext length: 12-byte nonce + 16-byte AES-GCM tag.
const MIN_CIPHERTEXT_LEN: usize = NONCE_LEN + 16;

/// A 256-bit encryption key that is zeroized on drop.
///
/// The inner bytes are never exposed in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Derive a key from a password and salt with PBKDF2-HMAC-SHA256.
    ///
    /// CPU-bound; async callers should go through [`derive_key`].
    #[must_use]
    pub fn derive(password: &str, salt: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut bytes);
        Self(bytes)
    }

    fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive a key on the blocking pool.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] if the blocking task panicked or
/// was cancelled.
pub async fn derive_key(password: &str, salt: &[u8]) -> Result<EncryptionKey, CryptoError> {
    let password = Zeroizing::new(password.to_owned());
    let salt = salt.to_vec();
    tokio::task::spawn_blocking(move || EncryptionKey::derive(&password, &salt))
        .await
        .map_err(|e| CryptoError::KeyDerivation {
            reason: e.to_string(),
        })
}

/// Fresh random salt from the OS CSPRNG.
#[must_use]
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// 32 random bytes as URL-safe base64, for use as a fresh secret.
#[must_use]
pub fn generate_secret() -> String {
    let mut bytes = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(&mut *bytes);
    URL_SAFE_NO_PAD.encode(bytes.as_slice())
}

/// Encrypt plaintext using AES-256-GCM with a fresh random nonce.
///
/// Returns `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if the AEAD operation fails.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;

    let mut combined = Vec::with_capacity(NONCE_LEN.saturating_add(ciphertext.len()));
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(combined)
}

/// Decrypt ciphertext produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`CryptoError::InvalidPayload`] if the input is shorter than
/// 28 bytes, [`CryptoError::Decryption`] if authentication fails (wrong
/// password, corrupted data, or tampered tag).
pub fn decrypt(key: &EncryptionKey, combined: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if combined.len() < MIN_CIPHERTEXT_LEN {
        return Err(CryptoError::InvalidPayload {
            reason: format!(
                "expected at least {MIN_CIPHERTEXT_LEN} bytes, got {}",
                combined.len()
            ),
        });
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::Decryption {
            reason: "wrong password or corrupted payload".to_owned(),
        })
}

/// A secret encrypted under a password: the stored payload and its salt.
#[derive(Debug, Clone)]
pub struct Sealed {
    pub payload: String,
    pub salt: Vec<u8>,
}

/// Encrypt `plaintext` under `password` with a fresh salt.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] or [`CryptoError::Encryption`].
pub async fn seal(password: &str, plaintext: &str) -> Result<Sealed, CryptoError> {
    let salt = generate_salt();
    let key = derive_key(password, &salt).await?;
    let combined = encrypt(&key, plaintext.as_bytes())?;
    Ok(Sealed {
        payload: STANDARD.encode(combined),
        salt: salt.to_vec(),
    })
}

/// Decrypt a stored payload with `password` and the key's salt.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidPayload`] if the payload is not base64 or
/// not UTF-8 after decryption, [`CryptoError::Decryption`] on a wrong
/// password.
pub async fn unseal(password: &str, salt: &[u8], payload: &str) -> Result<String, CryptoError> {
    let combined = STANDARD
        .decode(payload.trim())
        .map_err(|e| CryptoError::InvalidPayload {
            reason: format!("not base64: {e}"),
        })?;
    let key = derive_key(password, salt).await?;
    let plaintext = decrypt(&key, &combined)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidPayload {
        reason: "decrypted secret is not UTF-8".to_owned(),
    })
}
