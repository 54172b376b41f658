//! Authentication context handed to operations that touch sensitive content

use crate::crypto::KeyMaterial;
use crate::error::{Result, VaultError};
use crate::session::Session;

/// Proof of authentication for the lifetime of one unlock
///
/// Created by the vault after a successful password check (with key
/// material) or after a valid persisted session (without). Dropping it
/// zeroizes the key.
#[derive(Debug, Clone)]
pub struct AuthContext {
    session: Session,
    key: Option<KeyMaterial>,
}

impl AuthContext {
    pub fn new(session: Session, key: Option<KeyMaterial>) -> Self {
        Self { session, key }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Key material for sensitive content
    ///
    /// Fails with `VaultLocked` when the context was restored from a session
    /// and the password has not been entered in this process.
    pub fn key(&self) -> Result<&KeyMaterial> {
        self.key.as_ref().ok_or(VaultError::VaultLocked)
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }
}
