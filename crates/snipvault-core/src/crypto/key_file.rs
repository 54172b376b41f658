//! External key-material file
//!
//! Holds the KDF salt and parameters outside the structured store so they
//! can be read before any sensitive content is decrypted. The derived key
//! itself is never written anywhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{derive_key, generate_salt, KdfParams, KeyMaterial};
use crate::error::Result;

/// Salt and derivation parameters for the encryption key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFile {
    pub version: u32,
    pub salt: String,
    pub params: KdfParams,
    pub created_at: DateTime<Utc>,
}

impl KeyFile {
    const VERSION: u32 = 1;

    /// Generate fresh key material parameters with a random salt
    pub fn generate(params: KdfParams) -> Self {
        Self {
            version: Self::VERSION,
            salt: generate_salt(),
            params,
            created_at: Utc::now(),
        }
    }

    /// Derive the encryption key for `password`
    pub fn derive(&self, password: &str) -> Result<KeyMaterial> {
        derive_key(password, &self.salt, &self.params)
    }

    /// Path of the staging file used while a password change is in flight
    pub fn pending_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".pending");
        PathBuf::from(name)
    }

    /// Load a key file, `None` if it does not exist
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(None);
        }

        let contents = tokio::fs::read_to_string(path).await?;
        let key_file: KeyFile = serde_json::from_str(&contents)?;
        debug!("Loaded key file from {:?}", path);
        Ok(Some(key_file))
    }

    /// Write the key file atomically
    pub async fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, path).await?;

        debug!("Saved key file to {:?}", path);
        Ok(())
    }

    /// Replace `path` with the file at `from`
    pub async fn promote(from: &Path, path: &Path) -> Result<()> {
        tokio::fs::rename(from, path).await?;
        debug!("Promoted key file {:?} to {:?}", from, path);
        Ok(())
    }

    /// Remove a key file if present
    pub async fn remove(path: &Path) -> Result<()> {
        if tokio::fs::try_exists(path).await? {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }
}
