//! AES-256-GCM sealing of blob contents.
//!
//! Sealed layout: 12-byte nonce followed by the ciphertext and tag.

use crate::errors::*;
use crate::types::DecryptionKey;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand_core::{OsRng, RngCore};

const NONCE_LEN: usize = 12;

pub fn generate_key() -> DecryptionKey {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    DecryptionKey::from_bytes(key)
}

pub fn seal(key: &DecryptionKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| StoreError::Crypto(format!("Cipher init failed: {}", e)))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| StoreError::Crypto(format!("Encryption failed: {}", e)))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

pub fn open(key: &DecryptionKey, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
        return Err(StoreError::Crypto("sealed blob shorter than nonce".into()));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| StoreError::Crypto(format!("Cipher init failed: {}", e)))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| StoreError::Crypto(format!("Decryption failed: {}", e)))
}
