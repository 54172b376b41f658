//! Master password credential
//!
//! Stores only an Argon2id verification hash of the master password and
//! drives the password change, which rotates the encryption key.

mod store;
mod types;

pub use store::CredentialStore;
pub use types::*;
