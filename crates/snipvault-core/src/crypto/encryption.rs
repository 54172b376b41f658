//! AES-256-GCM authenticated encryption
//!
//! Envelope format: `version (1) || nonce (12) || auth tag (16) || ciphertext`
//! - Version: currently `1`
//! - Nonce: 12 random bytes (96 bits) - standard for GCM
//! - Auth tag: 16 bytes (128 bits)
//! - Ciphertext: same length as the plaintext

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};

use super::KeyMaterial;
use crate::error::{Result, VaultError};

const ENVELOPE_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + NONCE_LEN + TAG_LEN;

/// Encrypted payload with nonce and auth tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_LEN],
    pub auth_tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Serialize into the self-contained envelope
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        out.push(ENVELOPE_VERSION);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.auth_tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse an envelope produced by [`EncryptedData::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(VaultError::DecryptionFailed(format!(
                "Envelope too short: expected at least {} bytes, got {}",
                HEADER_LEN,
                bytes.len()
            )));
        }

        if bytes[0] != ENVELOPE_VERSION {
            return Err(VaultError::DecryptionFailed(format!(
                "Unsupported envelope version: {}",
                bytes[0]
            )));
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[1..1 + NONCE_LEN]);

        let mut auth_tag = [0u8; TAG_LEN];
        auth_tag.copy_from_slice(&bytes[1 + NONCE_LEN..HEADER_LEN]);

        Ok(Self {
            nonce,
            auth_tag,
            ciphertext: bytes[HEADER_LEN..].to_vec(),
        })
    }
}

fn cipher(key: &KeyMaterial) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))
}

/// Encrypt plaintext into a self-contained envelope
///
/// A fresh random nonce is drawn for every call, so encrypting the same
/// plaintext twice yields different output.
pub fn encrypt(plaintext: &[u8], key: &KeyMaterial) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    // aes-gcm appends the auth tag to the ciphertext
    let ciphertext_with_tag = cipher(key)?
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    if ciphertext_with_tag.len() < TAG_LEN {
        return Err(VaultError::EncryptionFailed(
            "Ciphertext too short".to_string(),
        ));
    }

    let tag_start = ciphertext_with_tag.len() - TAG_LEN;
    let mut auth_tag = [0u8; TAG_LEN];
    auth_tag.copy_from_slice(&ciphertext_with_tag[tag_start..]);

    let encrypted = EncryptedData {
        nonce,
        auth_tag,
        ciphertext: ciphertext_with_tag[..tag_start].to_vec(),
    };

    Ok(encrypted.to_bytes())
}

/// Decrypt an envelope
///
/// Fails with `DecryptionFailed` on a malformed envelope, a tag mismatch,
/// or the wrong key; never returns corrupted plaintext.
pub fn decrypt(envelope: &[u8], key: &KeyMaterial) -> Result<Vec<u8>> {
    let encrypted = EncryptedData::from_bytes(envelope)?;

    let mut ciphertext_with_tag = Vec::with_capacity(encrypted.ciphertext.len() + TAG_LEN);
    ciphertext_with_tag.extend_from_slice(&encrypted.ciphertext);
    ciphertext_with_tag.extend_from_slice(&encrypted.auth_tag);

    cipher(key)?
        .decrypt(Nonce::from_slice(&encrypted.nonce), ciphertext_with_tag.as_slice())
        .map_err(|_| VaultError::DecryptionFailed("Authentication tag mismatch".to_string()))
}

/// Decrypt an envelope holding UTF-8 text
pub fn decrypt_to_string(envelope: &[u8], key: &KeyMaterial) -> Result<String> {
    let plaintext = decrypt(envelope, key)?;
    String::from_utf8(plaintext)
        .map_err(|e| VaultError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
}
