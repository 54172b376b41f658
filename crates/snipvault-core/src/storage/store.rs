//! The data access layer
//!
//! `Store` is the only component that opens transactions. Record-specific
//! operations live in sibling modules as further `impl Store` blocks; this
//! file holds the shared plumbing: the write choke point that fires cache
//! invalidation, settings rows, the key check, and key rotation.

use rusqlite::{params, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::codec::seal;
use super::database::Database;
use crate::clock::{Clock, SystemClock};
use crate::crypto::{decrypt_to_string, KeyMaterial};
use crate::error::{Result, VaultError};

/// Plaintext sealed under the current key to detect a mismatched key file
const KEY_CHECK_PLAINTEXT: &str = "snipvault-key-check";
const KEY_CHECK_SETTING: &str = "key_check";

/// Default number of clipboard history rows kept
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Receiver of the "something changed" signal fired after every committed
/// mutation of categories, items, tags or lists
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self);
}

/// Outcome of comparing a key against the stored key check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCheck {
    Match,
    Mismatch,
    /// No key check has been written yet
    Missing,
}

/// Transactional store over the SQLite database
pub struct Store {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    history_limit: AtomicUsize,
    listeners: RwLock<Vec<Arc<dyn CacheInvalidator>>>,
}

impl Store {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            db: Arc::new(db),
            clock,
            history_limit: AtomicUsize::new(DEFAULT_HISTORY_LIMIT),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Open the store file at `path`, running migrations
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self::new(Database::open(path)?, clock))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?, Arc::new(SystemClock)))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit.load(Ordering::Relaxed)
    }

    pub fn set_history_limit(&self, limit: usize) {
        self.history_limit.store(limit, Ordering::Relaxed);
    }

    /// Register a listener for mutation notifications
    pub fn subscribe(&self, listener: Arc<dyn CacheInvalidator>) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }

    /// Fire invalidation on every listener
    ///
    /// Called automatically after each committed mutation. Callers that
    /// modify the database file directly must call it themselves.
    pub fn notify_invalidation(&self) {
        let listeners = match self.listeners.read() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        };
        for listener in listeners.iter() {
            listener.invalidate();
        }
    }

    pub(crate) fn read<T>(
        &self,
        f: impl FnOnce(&rusqlite::Connection) -> Result<T>,
    ) -> Result<T> {
        self.db.read(f)
    }

    /// Run a transaction that does not touch filterable records
    pub(crate) fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        self.db.transaction(f)
    }

    /// Run a mutation and notify listeners once it has committed
    pub(crate) fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let value = self.db.transaction(f)?;
        self.notify_invalidation();
        Ok(value)
    }

    /// Read a value from the settings table
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    /// Insert or replace a value in the settings table
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.transaction(|tx| put_setting(tx, key, value))
    }

    /// Seal the key check under `key`, replacing any previous one
    pub fn write_key_check(&self, key: &KeyMaterial) -> Result<()> {
        self.transaction(|tx| put_key_check(tx, key))
    }

    /// Compare `key` against the stored key check
    pub fn check_key(&self, key: &KeyMaterial) -> Result<KeyCheck> {
        let Some(stored) = self.get_setting(KEY_CHECK_SETTING)? else {
            return Ok(KeyCheck::Missing);
        };

        let envelope = hex::decode(&stored)
            .map_err(|e| VaultError::Storage(format!("Invalid key check encoding: {}", e)))?;

        match decrypt_to_string(&envelope, key) {
            Ok(plaintext) if plaintext == KEY_CHECK_PLAINTEXT => Ok(KeyCheck::Match),
            Ok(_) | Err(VaultError::DecryptionFailed(_)) => Ok(KeyCheck::Mismatch),
            Err(e) => Err(e),
        }
    }

    /// Re-seal every sensitive item from `old` to `new` in one transaction
    ///
    /// `finalize` runs inside the same transaction after the items and the
    /// key check have been rewritten, so callers can persist their own
    /// rotation state atomically with the content. Any failure rolls back
    /// everything and surfaces as `RotationAborted`. Returns the number of
    /// items re-sealed.
    pub fn rekey_sensitive_items<F>(
        &self,
        old: &KeyMaterial,
        new: &KeyMaterial,
        finalize: F,
    ) -> Result<usize>
    where
        F: FnOnce(&Transaction<'_>) -> Result<()>,
    {
        let result = self.write(|tx| {
            let rows = {
                let mut stmt = tx.prepare("SELECT id, content FROM items WHERE is_sensitive = 1")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };

            for (id, content) in &rows {
                let plaintext = Zeroizing::new(decrypt_to_string(content, old).map_err(|_| {
                    VaultError::RotationAborted(format!(
                        "Item {} could not be decrypted with the current key",
                        id
                    ))
                })?);
                let sealed = seal(&plaintext, new)
                    .map_err(|e| VaultError::RotationAborted(format!("Item {}: {}", id, e)))?;

                tx.execute(
                    "UPDATE items SET content = ?1 WHERE id = ?2",
                    params![sealed, id],
                )?;
            }

            put_key_check(tx, new)?;
            finalize(tx)?;
            Ok(rows.len())
        });

        match result {
            Ok(count) => {
                info!("Re-encrypted {} sensitive items under the new key", count);
                Ok(count)
            }
            Err(VaultError::TransactionAborted(reason)) => Err(VaultError::RotationAborted(reason)),
            Err(e) => Err(e),
        }
    }
}

pub(crate) fn put_setting(tx: &Transaction<'_>, key: &str, value: &str) -> Result<()> {
    tx.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub(crate) fn put_key_check(tx: &Transaction<'_>, key: &KeyMaterial) -> Result<()> {
    let envelope = seal(KEY_CHECK_PLAINTEXT, key)?;
    put_setting(tx, KEY_CHECK_SETTING, &hex::encode(envelope))?;
    debug!("Wrote key check");
    Ok(())
}
