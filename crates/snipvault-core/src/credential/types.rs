//! Credential types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{KeyFile, KeyMaterial};

/// The single credential record of an installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Argon2id PHC string (algorithm, cost, salt and digest)
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Key files on both sides of a password change
#[derive(Debug, Clone, Copy)]
pub struct KeyRotation<'a> {
    /// Key file the store is currently sealed under
    pub current: &'a KeyFile,
    /// Freshly generated key file for the new password
    pub next: &'a KeyFile,
}

/// Result of a successful password change
#[derive(Debug)]
pub struct PasswordChange {
    pub credential: Credential,
    /// Key derived from the new password and the next key file
    pub key: KeyMaterial,
    /// Number of sensitive items re-encrypted
    pub rekeyed_items: usize,
}
