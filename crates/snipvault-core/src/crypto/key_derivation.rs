//! Password-based key derivation using Argon2id

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use super::KeyMaterial;
use crate::error::{Result, VaultError};

/// Key derivation algorithm identifier (persisted in the key file)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KdfAlgorithm {
    #[default]
    Argon2id,
}

/// Parameters for Argon2id
///
/// Used both for deriving the encryption key and for hashing the master
/// password; the two are configured independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    #[serde(default)]
    pub algorithm: KdfAlgorithm,
    /// Memory cost in KiB (default: 65536 = 64MB)
    pub memory_cost: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2id,
            memory_cost: 65536, // 64 MB
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Build an Argon2 instance for these parameters
    pub(crate) fn hasher(&self, output_len: Option<usize>) -> Result<Argon2<'static>> {
        let params = Params::new(self.memory_cost, self.time_cost, self.parallelism, output_len)
            .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

        let algorithm = match self.algorithm {
            KdfAlgorithm::Argon2id => Algorithm::Argon2id,
        };

        Ok(Argon2::new(algorithm, Version::V0x13, params))
    }
}

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> String {
    SaltString::generate(&mut OsRng).to_string()
}

/// Derive a 256-bit key from a password
///
/// Pure function of its inputs: the same password, salt, and parameters
/// always yield the same key.
pub fn derive_key(password: &str, salt: &str, params: &KdfParams) -> Result<KeyMaterial> {
    let argon2 = params.hasher(Some(32))?;

    let salt = SaltString::from_b64(salt)
        .map_err(|e| VaultError::KeyDerivation(format!("Invalid salt: {}", e)))?;

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

    let hash = password_hash
        .hash
        .ok_or_else(|| VaultError::KeyDerivation("No hash output".to_string()))?;

    KeyMaterial::from_slice(hash.as_bytes())
        .ok_or_else(|| VaultError::KeyDerivation("Unexpected hash output length".to_string()))
}
