// ABOUTME: AES-256-GCM cipher for credential encryption at rest
// ABOUTME: Owns the on-disk encryption key with create-if-absent, owner-only permissions
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Symmetric encryption for the token store
//!
//! The key is generated once per installation, persisted with owner-only
//! file permissions, and never rotated automatically. Ciphertexts carry the
//! random 12-byte nonce as a prefix.

use crate::errors::{ClientError, ClientResult};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit};
use base64::{engine::general_purpose, Engine};
use rand::RngCore;
use std::fs;
use std::path::Path;
use zeroize::Zeroize;

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;
/// Key length in bytes (AES-256)
const KEY_LEN: usize = 32;

/// Symmetric cipher bound to one installation's encryption key
pub struct TokenCipher {
    key: [u8; KEY_LEN],
}

impl TokenCipher {
    /// Create a cipher from raw key bytes - primarily for testing
    #[must_use]
    pub const fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Load the encryption key from disk, generating and persisting one if absent
    ///
    /// Idempotent across calls. A freshly generated key file is restricted to
    /// owner read/write before the key is ever used.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Persistence`] on I/O failure or a malformed
    /// existing key file.
    pub fn load_or_generate(key_path: &Path) -> ClientResult<Self> {
        if key_path.exists() {
            let encoded = fs::read_to_string(key_path).map_err(|e| {
                ClientError::persistence(format!("failed to read key file: {e}"))
            })?;
            let mut key_bytes = general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| {
                    ClientError::persistence(format!("key file is not valid base64: {e}"))
                })?;
            if key_bytes.len() != KEY_LEN {
                key_bytes.zeroize();
                return Err(ClientError::persistence(format!(
                    "encryption key must be {KEY_LEN} bytes, found {}",
                    key_bytes.len()
                )));
            }
            let mut key = [0u8; KEY_LEN];
            key.copy_from_slice(&key_bytes);
            key_bytes.zeroize();
            return Ok(Self { key });
        }

        if let Some(parent) = key_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ClientError::persistence(format!("failed to create storage directory: {e}"))
            })?;
        }

        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);

        let encoded = general_purpose::STANDARD.encode(key);
        fs::write(key_path, &encoded)
            .map_err(|e| ClientError::persistence(format!("failed to write key file: {e}")))?;
        restrict_permissions(key_path)?;

        tracing::info!(path = %key_path.display(), "Generated new token encryption key");
        Ok(Self { key })
    }

    /// Encrypt plaintext, returning nonce-prefixed ciphertext
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Persistence`] if encryption fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> ClientResult<Vec<u8>> {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = GenericArray::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| ClientError::persistence(format!("encryption failed: {e}")))?;

        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt nonce-prefixed ciphertext
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decryption`] if the input is too short or was
    /// not produced with this key.
    pub fn decrypt(&self, encrypted: &[u8]) -> ClientResult<Vec<u8>> {
        if encrypted.len() < NONCE_LEN {
            return Err(ClientError::decryption("ciphertext shorter than nonce"));
        }

        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));
        let nonce = GenericArray::from_slice(&encrypted[..NONCE_LEN]);

        cipher
            .decrypt(nonce, &encrypted[NONCE_LEN..])
            .map_err(|e| ClientError::decryption(format!("decryption failed: {e}")))
    }
}

impl Drop for TokenCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Restrict a file to owner read/write
pub(crate) fn restrict_permissions(path: &Path) -> ClientResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
            ClientError::persistence(format!("failed to restrict file permissions: {e}"))
        })?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
