//! SQLite connection owner and transaction boundary

use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use super::migrations;
use crate::error::{Result, VaultError};

/// Standard I/O timeout while waiting on a locked database file
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQL name of the Unicode-aware lowercase function
pub(crate) const FOLD_FUNCTION: &str = "fold_case";

/// Register `fold_case(text)`, lowercasing with full Unicode rules
///
/// SQLite's own `lower()` and `LIKE` only fold ASCII letters.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        FOLD_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            Ok(match ctx.get_raw(0) {
                ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                    Some(String::from_utf8_lossy(bytes).to_lowercase())
                }
                ValueRef::Null => None,
                ValueRef::Integer(i) => Some(i.to_string()),
                ValueRef::Real(f) => Some(f.to_string()),
            })
        },
    )?;
    Ok(())
}

/// The single owned connection to the structured store
///
/// Every read and write funnels through one connection guarded by a mutex,
/// so at most one writer is ever active and no reader observes a partially
/// committed transaction.
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) the store at `path` and bring its schema up to date
    ///
    /// Fails with `MigrationFailed` if any migration cannot be applied; the
    /// store must not be used with a partially migrated schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let db = Self::init(conn, Some(path.to_path_buf()))?;
        info!("Opened store at {:?}", path);
        Ok(db)
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(mut conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            PRAGMA secure_delete = ON;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;
        register_functions(&conn)?;

        migrations::run(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Location of the store file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VaultError::Storage("Database connection lock poisoned".to_string()))
    }

    /// Run a read-only closure against the connection
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock_conn()?;
        f(&conn)
    }

    /// Run `f` inside one atomic write transaction
    ///
    /// Commits if `f` returns `Ok`, rolls back otherwise. Storage and
    /// validation failures surface as `TransactionAborted`.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| VaultError::TransactionAborted(format!("Could not begin: {}", e)))?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()
                    .map_err(|e| VaultError::TransactionAborted(format!("Commit failed: {}", e)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    debug!("Rollback reported an error: {}", rollback_err);
                }
                Err(err.into_aborted())
            }
        }
    }

    /// Highest applied schema version
    pub fn schema_version(&self) -> Result<u32> {
        self.read(|conn| migrations::current_version(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn count(db: &Database, table: &str) -> i64 {
        db.read(|conn| {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?)
        })
        .unwrap()
    }

    #[test]
    fn test_open_applies_all_migrations() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_version().unwrap(), migrations::LATEST_VERSION);
    }

    #[test]
    fn test_reopen_on_disk_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("store.db");

        {
            let db = Database::open(&path).unwrap();
            db.transaction(|tx| {
                tx.execute(
                    "INSERT INTO settings (key, value) VALUES ('theme', 'dark')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.path(), Some(path.as_path()));
        assert_eq!(db.schema_version().unwrap(), migrations::LATEST_VERSION);
        assert_eq!(count(&db, "settings"), 1);
    }

    #[test]
    fn test_transaction_commits() {
        let db = Database::open_in_memory().unwrap();

        db.transaction(|tx| {
            tx.execute("INSERT INTO settings (key, value) VALUES ('a', '1')", [])?;
            tx.execute("INSERT INTO settings (key, value) VALUES ('b', '2')", [])?;
            Ok(())
        })
        .unwrap();

        assert_eq!(count(&db, "settings"), 2);
    }

    #[test]
    fn test_transaction_rolls_back_every_statement() {
        let db = Database::open_in_memory().unwrap();

        let result: Result<()> = db.transaction(|tx| {
            tx.execute("INSERT INTO settings (key, value) VALUES ('a', '1')", [])?;
            // Duplicate primary key
            tx.execute("INSERT INTO settings (key, value) VALUES ('a', '2')", [])?;
            Ok(())
        });

        assert!(matches!(result, Err(VaultError::TransactionAborted(_))));
        assert_eq!(count(&db, "settings"), 0);
    }

    #[test]
    fn test_semantic_errors_pass_through() {
        let db = Database::open_in_memory().unwrap();

        let result: Result<()> = db.transaction(|tx| {
            tx.execute("INSERT INTO settings (key, value) VALUES ('a', '1')", [])?;
            Err(VaultError::NotFound("item 7".to_string()))
        });

        assert!(matches!(result, Err(VaultError::NotFound(_))));
        assert_eq!(count(&db, "settings"), 0);
    }

    #[test]
    fn test_fold_case_handles_non_ascii() {
        let db = Database::open_in_memory().unwrap();
        let folded: String = db
            .read(|conn| {
                Ok(conn.query_row("SELECT fold_case('ÉXITO Ñandú')", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(folded, "éxito ñandú");
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let db = Database::open_in_memory().unwrap();

        let result = db.transaction(|tx| {
            tx.execute(
                "INSERT INTO items (category_id, label, content, created_at, updated_at)
                 VALUES (999, 'orphan', x'00', '', '')",
                [],
            )?;
            Ok(())
        });

        assert!(matches!(result, Err(VaultError::TransactionAborted(_))));
    }
}
