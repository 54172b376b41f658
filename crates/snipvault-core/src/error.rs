//! Error types for snipvault-core

use thiserror::Error;

use crate::session::SessionInvalidReason;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Vault error types
///
/// Messages never carry password, key, or sensitive plaintext bytes.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Vault is not initialized - set a master password first")]
    NotInitialized,

    #[error("Vault is already initialized")]
    AlreadyInitialized,

    #[error("Vault is locked - unlock with the master password first")]
    VaultLocked,

    #[error("Session invalid: {0}")]
    SessionInvalid(SessionInvalidReason),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Item {0} is corrupted and could not be decrypted")]
    CorruptedItem(i64),

    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Password rotation aborted: {0}")]
    RotationAborted(String),

    #[error("Migration {version} failed: {reason}")]
    MigrationFailed { version: u32, reason: String },

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        VaultError::Storage(format!("SQLite error: {}", err))
    }
}

impl VaultError {
    /// Map an error raised inside a write transaction to what the caller sees
    /// after rollback.
    pub(crate) fn into_aborted(self) -> Self {
        match self {
            VaultError::Storage(reason) => VaultError::TransactionAborted(reason),
            VaultError::Validation(reason) => {
                VaultError::TransactionAborted(format!("Validation error: {}", reason))
            }
            VaultError::EncryptionFailed(reason) => {
                VaultError::TransactionAborted(format!("Encryption failed: {}", reason))
            }
            other => other,
        }
    }
}
