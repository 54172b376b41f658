//! Cryptographic primitives for sensitive snippet content
//!
//! This module provides:
//! - AES-256-GCM authenticated encryption with a self-contained envelope
//! - Argon2id key derivation from the master password
//! - Key material that is zeroed on drop
//! - The external key-material file (salt + derivation parameters)

mod encryption;
mod key_derivation;
mod key_file;
mod secure_memory;

pub use encryption::{decrypt, decrypt_to_string, encrypt, EncryptedData};
pub use key_derivation::{derive_key, generate_salt, KdfAlgorithm, KdfParams};
pub use key_file::KeyFile;
pub use secure_memory::KeyMaterial;
