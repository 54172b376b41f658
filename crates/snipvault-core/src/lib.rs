//! # snipvault-core
//!
//! Core of SnipVault, a local snippet vault, including:
//! - Master password verification with Argon2id hashes
//! - AES-256-GCM encryption of sensitive snippet content
//! - Time-bounded sessions persisted next to the data
//! - A transactional SQLite store for categories, items, tags, lists and
//!   clipboard history
//! - A memoized category filter engine invalidated on every write

pub mod clock;
pub mod context;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod filter;
pub mod session;
pub mod settings;
pub mod storage;
mod vault;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::AuthContext;
pub use credential::{Credential, CredentialStore, KeyRotation, PasswordChange};
pub use crypto::{KdfAlgorithm, KdfParams, KeyFile, KeyMaterial};
pub use error::{Result, VaultError};
pub use filter::{CacheStats, FilterCriteria, FilterEngine, FilterResult, SortKey, SortOrder};
pub use session::{Session, SessionInvalidReason, SessionStore, SessionSweeper, SessionValidation};
pub use settings::{Settings, SettingsManager};
pub use storage::{
    Category, CategorySummary, CategoryUpdate, ClipboardEntry, Item, ItemList, ItemPlaceholder,
    ItemType, ItemUpdate, ListStep, LoadedItem, NewCategory, NewItem, NewList, Store, Tag,
    TagGroup,
};
pub use vault::{Vault, VaultPaths, VaultState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
