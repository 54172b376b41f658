//! Main vault orchestration
//!
//! Wires the startup flow: the credential store verifies the password, the
//! key file yields the working key, the session store issues a session, and
//! the data access layer becomes usable through an [`AuthContext`].

use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::clock::{Clock, SystemClock};
use crate::context::AuthContext;
use crate::credential::{CredentialStore, KeyRotation};
use crate::crypto::{KeyFile, KeyMaterial};
use crate::error::{Result, VaultError};
use crate::filter::FilterEngine;
use crate::session::{SessionInvalidReason, SessionStore, SessionSweeper};
use crate::settings::{Settings, SettingsManager};
use crate::storage::{KeyCheck, Store};

/// Vault state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// No master password has been set yet
    NotInitialized,
    /// Password or valid session required
    Locked,
    /// An authentication context is held
    Unlocked,
}

/// Files making up one vault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultPaths {
    pub dir: PathBuf,
    pub database: PathBuf,
    pub key_file: PathBuf,
    pub pending_key_file: PathBuf,
    pub settings: PathBuf,
}

impl VaultPaths {
    pub fn new(dir: &Path) -> Self {
        let key_file = dir.join("key.json");
        Self {
            dir: dir.to_path_buf(),
            database: dir.join("snipvault.db"),
            pending_key_file: KeyFile::pending_path(&key_file),
            key_file,
            settings: dir.join("settings.json"),
        }
    }

    /// Get the default data directory
    pub fn default_dir() -> Result<PathBuf> {
        ProjectDirs::from("com", "snipvault", "snipvault")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| VaultError::Storage("Could not determine data directory".to_string()))
    }
}

/// Run slow hashing off the async runtime
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| VaultError::Storage(format!("Background task failed: {}", e)))?
}

/// Main vault struct that orchestrates all functionality
pub struct Vault {
    paths: VaultPaths,
    store: Arc<Store>,
    credentials: CredentialStore,
    sessions: SessionStore,
    filter: FilterEngine,
    settings_manager: SettingsManager,
    /// Present only while unlocked
    context: Option<AuthContext>,
    state: VaultState,
}

impl Vault {
    /// Open the vault in the default data directory
    pub fn open_default() -> Result<Self> {
        Self::open(&VaultPaths::default_dir()?)
    }

    /// Open the vault in `dir` with its saved settings and the system clock
    pub fn open(dir: &Path) -> Result<Self> {
        let settings = SettingsManager::new(dir).get().clone();
        Self::open_with(dir, settings, Arc::new(SystemClock))
    }

    /// Open the vault in `dir` with explicit settings and time source
    ///
    /// Fails with `MigrationFailed` if the schema cannot be brought up to
    /// date.
    pub fn open_with(dir: &Path, settings: Settings, clock: Arc<dyn Clock>) -> Result<Self> {
        settings.validate()?;
        let paths = VaultPaths::new(dir);

        let store = Arc::new(Store::open(&paths.database, clock.clone())?);
        store.set_history_limit(settings.clipboard_history_limit);

        let credentials = CredentialStore::new(store.clone(), settings.password_hashing.clone());
        let sessions = SessionStore::new(store.clone(), clock);
        let filter = FilterEngine::new(store.clone(), settings.filter_cache_capacity);

        let state = if credentials.is_initialized()? {
            VaultState::Locked
        } else {
            VaultState::NotInitialized
        };

        debug!("Opened vault at {:?} ({:?})", paths.dir, state);
        Ok(Self {
            settings_manager: SettingsManager::with_settings(dir, settings),
            paths,
            store,
            credentials,
            sessions,
            filter,
            context: None,
            state,
        })
    }

    /// Get the current vault state
    pub fn state(&self) -> VaultState {
        self.state
    }

    pub fn is_unlocked(&self) -> bool {
        self.state == VaultState::Unlocked
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    fn require_initialized(&self) -> Result<()> {
        if self.state == VaultState::NotInitialized {
            return Err(VaultError::NotInitialized);
        }
        Ok(())
    }

    fn establish(&mut self, key: Option<KeyMaterial>) -> Result<()> {
        let session = self.sessions.issue(self.settings().session_ttl())?;
        self.context = Some(AuthContext::new(session, key));
        self.state = VaultState::Unlocked;
        Ok(())
    }

    /// Set the master password on first run and unlock
    pub async fn initialize(&mut self, password: &str) -> Result<()> {
        if self.state != VaultState::NotInitialized {
            return Err(VaultError::AlreadyInitialized);
        }

        info!("Initializing new vault");

        // Key material goes outside the store first so it is readable before
        // anything sealed under it exists
        let key_file = KeyFile::generate(self.settings().key_derivation.clone());
        key_file.save(&self.paths.key_file).await?;

        let credentials = self.credentials.clone();
        let password = Zeroizing::new(password.to_string());
        let key = blocking(move || {
            credentials.initialize(&password)?;
            key_file.derive(&password)
        })
        .await?;

        self.store.write_key_check(&key)?;
        self.establish(Some(key))?;

        info!("Vault initialized successfully");
        Ok(())
    }

    /// Unlock with the master password
    ///
    /// Recovers from an interrupted password change: if the key file does
    /// not match the store but the pending key file does, the pending file
    /// is promoted.
    pub async fn unlock(&mut self, password: &str) -> Result<()> {
        self.require_initialized()?;

        let credentials = self.credentials.clone();
        let candidate = Zeroizing::new(password.to_string());
        let verified = blocking(move || credentials.verify(&candidate)).await?;
        if !verified {
            warn!("Unlock rejected: wrong master password");
            return Err(VaultError::AuthenticationFailed);
        }

        let key = self.resolve_key(password).await?;
        self.establish(Some(key))?;

        info!("Vault unlocked");
        Ok(())
    }

    async fn derive_from(key_file: KeyFile, password: &str) -> Result<KeyMaterial> {
        let password = Zeroizing::new(password.to_string());
        blocking(move || key_file.derive(&password)).await
    }

    async fn resolve_key(&self, password: &str) -> Result<KeyMaterial> {
        let key_file = KeyFile::load(&self.paths.key_file)
            .await?
            .ok_or_else(|| VaultError::NotFound("key material file".to_string()))?;
        let key = Self::derive_from(key_file, password).await?;

        match self.store.check_key(&key)? {
            KeyCheck::Match => {
                // Leftover from a rotation that never committed
                KeyFile::remove(&self.paths.pending_key_file).await?;
                Ok(key)
            }
            KeyCheck::Missing => {
                self.store.write_key_check(&key)?;
                Ok(key)
            }
            KeyCheck::Mismatch => {
                let Some(pending) = KeyFile::load(&self.paths.pending_key_file).await? else {
                    return Err(VaultError::DecryptionFailed(
                        "Key file does not match the stored content".to_string(),
                    ));
                };

                let pending_key = Self::derive_from(pending, password).await?;
                if self.store.check_key(&pending_key)? != KeyCheck::Match {
                    return Err(VaultError::DecryptionFailed(
                        "Neither key file matches the stored content".to_string(),
                    ));
                }

                KeyFile::promote(&self.paths.pending_key_file, &self.paths.key_file).await?;
                warn!("Recovered key file from an interrupted password change");
                Ok(pending_key)
            }
        }
    }

    /// Unlock from a still-valid persisted session
    ///
    /// No password is entered, so the context holds no key material:
    /// sensitive items read as `Locked` and sensitive writes fail with
    /// `VaultLocked`.
    pub fn unlock_with_session(&mut self) -> Result<()> {
        self.require_initialized()?;

        let session = self.sessions.validate()?.into_result()?;
        info!("Vault unlocked from session {}", session.short_id());

        self.context = Some(AuthContext::new(session, None));
        self.state = VaultState::Unlocked;
        Ok(())
    }

    /// Revoke the session and drop the key
    pub fn lock(&mut self) -> Result<()> {
        self.require_initialized()?;

        self.context = None;
        self.state = VaultState::Locked;
        self.sessions.revoke()?;

        info!("Vault locked");
        Ok(())
    }

    /// Change the master password, re-encrypting every sensitive item
    ///
    /// The new key file is staged next to the current one and promoted only
    /// after the rotation transaction commits.
    pub async fn change_password(&mut self, old_password: &str, new_password: &str) -> Result<()> {
        self.require_initialized()?;

        let current = KeyFile::load(&self.paths.key_file)
            .await?
            .ok_or_else(|| VaultError::NotFound("key material file".to_string()))?;
        let next = KeyFile::generate(self.settings().key_derivation.clone());
        next.save(&self.paths.pending_key_file).await?;

        let credentials = self.credentials.clone();
        let old_password = Zeroizing::new(old_password.to_string());
        let new_password = Zeroizing::new(new_password.to_string());
        let rotated = blocking(move || {
            credentials.change_password(
                &old_password,
                &new_password,
                &KeyRotation {
                    current: &current,
                    next: &next,
                },
            )
        })
        .await;

        let change = match rotated {
            Ok(change) => change,
            Err(e) => {
                if let Err(cleanup) = KeyFile::remove(&self.paths.pending_key_file).await {
                    warn!("Could not remove pending key file: {}", cleanup);
                }
                return Err(e);
            }
        };

        KeyFile::promote(&self.paths.pending_key_file, &self.paths.key_file).await?;
        self.establish(Some(change.key))?;

        info!(
            "Password changed successfully ({} items re-encrypted)",
            change.rekeyed_items
        );
        Ok(())
    }

    /// The authentication context of the current unlock
    ///
    /// Fails with `VaultLocked` while locked and with `SessionInvalid` once
    /// the session behind the context has expired.
    pub fn context(&self) -> Result<&AuthContext> {
        let context = self.context.as_ref().ok_or(VaultError::VaultLocked)?;
        if !context.session().is_valid_at(self.store.clock().now()) {
            return Err(VaultError::SessionInvalid(SessionInvalidReason::Expired));
        }
        Ok(context)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn filter(&self) -> &FilterEngine {
        &self.filter
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Start the background session sweeper, `None` if disabled in settings
    pub fn spawn_session_sweeper(&self) -> Option<JoinHandle<()>> {
        let interval = self.settings().session_sweep_interval_secs;
        if interval == 0 {
            return None;
        }
        Some(SessionSweeper::spawn(
            self.sessions.clone(),
            std::time::Duration::from_secs(interval),
        ))
    }

    pub fn settings(&self) -> &Settings {
        self.settings_manager.get()
    }

    /// Validate, save and apply new settings
    ///
    /// The history limit and password hashing parameters apply immediately;
    /// key derivation parameters apply to the next generated key file and the
    /// filter cache capacity to the next opened vault.
    pub async fn update_settings(&mut self, settings: Settings) -> Result<()> {
        let history_limit = settings.clipboard_history_limit;
        let password_hashing = settings.password_hashing.clone();
        self.settings_manager.update(settings).await?;
        self.store.set_history_limit(history_limit);
        self.credentials.set_params(password_hashing);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::crypto::{KdfAlgorithm, KdfParams};
    use crate::storage::{LoadedItem, NewCategory, NewItem};
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn fast_settings() -> Settings {
        let fast = KdfParams {
            algorithm: KdfAlgorithm::Argon2id,
            memory_cost: 8192,
            time_cost: 1,
            parallelism: 1,
        };
        Settings {
            key_derivation: fast.clone(),
            password_hashing: fast,
            ..Settings::new()
        }
    }

    fn open(dir: &Path, clock: Arc<ManualClock>) -> Vault {
        Vault::open_with(dir, fast_settings(), clock).unwrap()
    }

    fn test_vault() -> (Vault, Arc<ManualClock>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (open(temp_dir.path(), clock.clone()), clock, temp_dir)
    }

    #[tokio::test]
    async fn test_initialize_and_unlock() {
        let (mut vault, _clock, _temp) = test_vault();

        assert_eq!(vault.state(), VaultState::NotInitialized);
        assert!(matches!(vault.unlock("x").await, Err(VaultError::NotInitialized)));

        vault.initialize("test-password").await.unwrap();
        assert_eq!(vault.state(), VaultState::Unlocked);
        assert!(vault.context().unwrap().has_key());
        assert!(vault.paths().key_file.exists());

        assert!(matches!(
            vault.initialize("again").await,
            Err(VaultError::AlreadyInitialized)
        ));

        vault.lock().unwrap();
        assert_eq!(vault.state(), VaultState::Locked);
        assert!(matches!(vault.context(), Err(VaultError::VaultLocked)));

        vault.unlock("test-password").await.unwrap();
        assert_eq!(vault.state(), VaultState::Unlocked);
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let (mut vault, _clock, _temp) = test_vault();

        vault.initialize("correct-password").await.unwrap();
        vault.lock().unwrap();

        let result = vault.unlock("wrong-password").await;
        assert!(matches!(result, Err(VaultError::AuthenticationFailed)));
        assert_eq!(vault.state(), VaultState::Locked);
    }

    #[tokio::test]
    async fn test_reopen_is_locked() {
        let (mut vault, clock, temp) = test_vault();
        vault.initialize("pw").await.unwrap();
        drop(vault);

        let reopened = open(temp.path(), clock);
        assert_eq!(reopened.state(), VaultState::Locked);
    }

    #[tokio::test]
    async fn test_change_password() {
        let (mut vault, _clock, _temp) = test_vault();

        vault.initialize("old-password").await.unwrap();
        let ctx = vault.context().unwrap().clone();
        let category = vault.store().add_category(NewCategory::new("keys")).unwrap();
        let item = vault
            .store()
            .add_item(&ctx, NewItem::new(category, "api", "sk-123").sensitive())
            .unwrap();

        vault
            .change_password("old-password", "new-password")
            .await
            .unwrap();
        assert!(!vault.paths().pending_key_file.exists());
        vault.lock().unwrap();

        let result = vault.unlock("old-password").await;
        assert!(matches!(result, Err(VaultError::AuthenticationFailed)));

        vault.unlock("new-password").await.unwrap();
        let loaded = vault
            .store()
            .get_item(vault.context().unwrap(), item)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.ready().unwrap().content, "sk-123");
    }

    #[tokio::test]
    async fn test_change_password_wrong_old_keeps_key_file() {
        let (mut vault, _clock, _temp) = test_vault();
        vault.initialize("old").await.unwrap();
        let before = KeyFile::load(&vault.paths().key_file).await.unwrap();

        let result = vault.change_password("nope", "new").await;

        assert!(matches!(result, Err(VaultError::AuthenticationFailed)));
        assert_eq!(KeyFile::load(&vault.paths().key_file).await.unwrap(), before);
        assert!(!vault.paths().pending_key_file.exists());
    }

    #[tokio::test]
    async fn test_unlock_recovers_unpromoted_key_file() {
        let (mut vault, _clock, _temp) = test_vault();
        vault.initialize("old").await.unwrap();
        let old_key_file = KeyFile::load(&vault.paths().key_file).await.unwrap().unwrap();

        vault.change_password("old", "new").await.unwrap();
        let new_key_file = KeyFile::load(&vault.paths().key_file).await.unwrap().unwrap();

        // Crash after the rotation committed but before the promote
        new_key_file.save(&vault.paths().pending_key_file).await.unwrap();
        old_key_file.save(&vault.paths().key_file).await.unwrap();
        vault.lock().unwrap();

        vault.unlock("new").await.unwrap();

        assert_eq!(
            KeyFile::load(&vault.paths().key_file).await.unwrap(),
            Some(new_key_file)
        );
        assert!(!vault.paths().pending_key_file.exists());
    }

    #[tokio::test]
    async fn test_unlock_discards_uncommitted_pending_file() {
        let (mut vault, _clock, _temp) = test_vault();
        vault.initialize("pw").await.unwrap();
        vault.lock().unwrap();

        KeyFile::generate(fast_settings().key_derivation)
            .save(&vault.paths().pending_key_file)
            .await
            .unwrap();

        vault.unlock("pw").await.unwrap();
        assert!(!vault.paths().pending_key_file.exists());
    }

    #[tokio::test]
    async fn test_unlock_with_session() {
        let (mut vault, clock, temp) = test_vault();
        vault.initialize("pw").await.unwrap();
        let ctx = vault.context().unwrap().clone();
        let category = vault.store().add_category(NewCategory::new("c")).unwrap();
        vault
            .store()
            .add_item(&ctx, NewItem::new(category, "secret", "s").sensitive())
            .unwrap();
        vault
            .store()
            .add_item(&ctx, NewItem::new(category, "plain", "p"))
            .unwrap();
        drop(vault);

        // A new process picks up the persisted session
        let mut vault = open(temp.path(), clock.clone());
        vault.unlock_with_session().unwrap();
        let ctx = vault.context().unwrap();
        assert!(!ctx.has_key());

        let items = vault.store().get_items_by_category(ctx, category).unwrap();
        assert!(matches!(items[0], LoadedItem::Locked(_)));
        assert!(items[1].is_ready());

        clock.advance(Duration::hours(25));
        assert!(matches!(
            vault.context(),
            Err(VaultError::SessionInvalid(SessionInvalidReason::Expired))
        ));
        assert!(matches!(
            vault.unlock_with_session(),
            Err(VaultError::SessionInvalid(SessionInvalidReason::Expired))
        ));
    }

    #[tokio::test]
    async fn test_lock_revokes_session() {
        let (mut vault, _clock, _temp) = test_vault();
        vault.initialize("pw").await.unwrap();
        vault.lock().unwrap();

        assert!(matches!(
            vault.unlock_with_session(),
            Err(VaultError::SessionInvalid(SessionInvalidReason::Revoked))
        ));
    }

    #[tokio::test]
    async fn test_update_settings_applies_history_limit() {
        let (mut vault, _clock, temp) = test_vault();

        vault
            .update_settings(Settings {
                clipboard_history_limit: 2,
                ..fast_settings()
            })
            .await
            .unwrap();

        for text in ["a", "b", "c"] {
            vault.store().record_clipboard_text(text).unwrap();
        }
        assert_eq!(vault.store().clipboard_history(10).unwrap().len(), 2);
        assert!(temp.path().join("settings.json").exists());
        assert_eq!(vault.settings().clipboard_history_limit, 2);
    }

    #[tokio::test]
    async fn test_update_settings_applies_password_hashing() {
        let (mut vault, _clock, _temp) = test_vault();
        vault.initialize("old-pw").await.unwrap();

        let mut settings = fast_settings();
        settings.password_hashing.memory_cost = 16384;
        vault.update_settings(settings).await.unwrap();
        vault.change_password("old-pw", "new-pw").await.unwrap();

        let credential = vault.credentials().get().unwrap().unwrap();
        assert!(credential.password_hash.contains("m=16384,"));
    }

    #[tokio::test]
    async fn test_session_sweeper_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let vault = Vault::open_with(
            temp_dir.path(),
            Settings {
                session_sweep_interval_secs: 0,
                ..fast_settings()
            },
            Arc::new(SystemClock),
        )
        .unwrap();

        assert!(vault.spawn_session_sweeper().is_none());
    }
}
