//! Credential store backed by the credentials table

use argon2::password_hash::{
    Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use rand::rngs::OsRng;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use tracing::{info, warn};

use super::types::{Credential, KeyRotation, PasswordChange};
use crate::crypto::KdfParams;
use crate::error::{Result, VaultError};
use crate::storage::row::{parse_timestamp, timestamp};
use crate::storage::{KeyCheck, Store};

/// Verifies and rotates the master password
///
/// Hashing is deliberately slow; async callers should run these methods on
/// a blocking thread.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<Store>,
    params: KdfParams,
}

impl CredentialStore {
    /// `params` sets the work factor for newly written hashes; existing
    /// hashes carry their own.
    pub fn new(store: Arc<Store>, params: KdfParams) -> Self {
        Self { store, params }
    }

    /// Work factor for hashes written from now on
    pub fn set_params(&mut self, params: KdfParams) {
        self.params = params;
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .params
            .hasher(None)?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;
        Ok(hash.to_string())
    }

    fn validate_password(password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(VaultError::Validation(
                "Master password cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The stored credential, if any
    pub fn get(&self) -> Result<Option<Credential>> {
        let row: Option<(String, String, String)> = self.store.database().read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT password_hash, created_at, updated_at FROM credentials WHERE id = 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?)
        })?;

        row.map(|(password_hash, created_at, updated_at)| {
            Ok(Credential {
                password_hash,
                created_at: parse_timestamp(&created_at)?,
                updated_at: parse_timestamp(&updated_at)?,
            })
        })
        .transpose()
    }

    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.get()?.is_some())
    }

    /// Establish the master password on first run
    pub fn initialize(&self, password: &str) -> Result<Credential> {
        Self::validate_password(password)?;
        if self.is_initialized()? {
            return Err(VaultError::AlreadyInitialized);
        }

        let password_hash = self.hash_password(password)?;
        let now = self.store.clock().now();
        let stored_at = timestamp(now);

        self.store.database().transaction(|tx| {
            let exists: Option<i64> = tx
                .query_row("SELECT id FROM credentials WHERE id = 1", [], |row| row.get(0))
                .optional()?;
            if exists.is_some() {
                return Err(VaultError::AlreadyInitialized);
            }

            tx.execute(
                "INSERT INTO credentials (id, password_hash, created_at, updated_at)
                 VALUES (1, ?1, ?2, ?2)",
                params![password_hash, stored_at],
            )?;
            Ok(())
        })?;

        info!("Master password initialized");
        Ok(Credential {
            password_hash,
            created_at: now,
            updated_at: now,
        })
    }

    /// Check a candidate password against the stored hash
    ///
    /// Returns `false` on mismatch. The digest comparison is constant time.
    pub fn verify(&self, password: &str) -> Result<bool> {
        let credential = self.get()?.ok_or(VaultError::NotInitialized)?;

        let parsed = PasswordHash::new(&credential.password_hash)
            .map_err(|e| VaultError::Storage(format!("Invalid stored password hash: {}", e)))?;

        // Cost parameters come from the PHC string, not from `self.params`
        match argon2::Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(PasswordHashError::Password) => Ok(false),
            Err(e) => Err(VaultError::KeyDerivation(e.to_string())),
        }
    }

    /// Change the master password and rotate the encryption key
    ///
    /// Every sensitive item is re-encrypted from the key of
    /// `rotation.current` to the key of `rotation.next`, and the new hash is
    /// written, all in one transaction. On any failure nothing changes.
    pub fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
        rotation: &KeyRotation<'_>,
    ) -> Result<PasswordChange> {
        Self::validate_password(new_password)?;
        if !self.verify(old_password)? {
            warn!("Password change rejected: current password did not verify");
            return Err(VaultError::AuthenticationFailed);
        }

        let old_key = rotation.current.derive(old_password)?;
        if self.store.check_key(&old_key)? == KeyCheck::Mismatch {
            return Err(VaultError::RotationAborted(
                "Current key file does not match the stored content".to_string(),
            ));
        }

        let new_key = rotation.next.derive(new_password)?;
        let password_hash = self.hash_password(new_password)?;
        let updated_at = timestamp(self.store.clock().now());

        let rekeyed_items = self.store.rekey_sensitive_items(&old_key, &new_key, |tx| {
            let changed = tx.execute(
                "UPDATE credentials SET password_hash = ?1, updated_at = ?2 WHERE id = 1",
                params![password_hash, updated_at],
            )?;
            if changed == 0 {
                return Err(VaultError::NotInitialized);
            }
            Ok(())
        })?;

        let credential = self.get()?.ok_or(VaultError::NotInitialized)?;
        info!("Master password changed");

        Ok(PasswordChange {
            credential,
            key: new_key,
            rekeyed_items,
        })
    }
}
