//! Application settings management
//!
//! Stores non-sensitive configuration in a plain JSON file next to the
//! database. Settings are readable before the vault is unlocked.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::crypto::KdfParams;
use crate::error::{Result, VaultError};
use crate::session::DEFAULT_SESSION_TTL_HOURS;
use crate::storage::DEFAULT_HISTORY_LIMIT;

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Settings file version
    pub version: u32,
    /// Lifetime of an issued session in hours
    pub session_ttl_hours: u32,
    /// How often the background sweeper clears stale sessions (0 = never)
    pub session_sweep_interval_secs: u64,
    /// Maximum number of memoized filter results
    pub filter_cache_capacity: usize,
    /// Maximum number of clipboard history rows kept
    pub clipboard_history_limit: usize,
    /// Argon2id parameters for a newly generated encryption key file
    pub key_derivation: KdfParams,
    /// Argon2id parameters for the master password hash
    pub password_hashing: KdfParams,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self {
            version: 1,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS as u32,
            session_sweep_interval_secs: 300,
            filter_cache_capacity: 64,
            clipboard_history_limit: DEFAULT_HISTORY_LIMIT,
            key_derivation: KdfParams::default(),
            password_hashing: KdfParams::default(),
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.session_ttl_hours))
    }

    /// Reject values the vault cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.session_ttl_hours == 0 {
            return Err(VaultError::Validation(
                "sessionTtlHours must be at least 1".to_string(),
            ));
        }
        if self.filter_cache_capacity == 0 {
            return Err(VaultError::Validation(
                "filterCacheCapacity must be at least 1".to_string(),
            ));
        }
        self.key_derivation.hasher(Some(32))?;
        self.password_hashing.hasher(None)?;
        Ok(())
    }
}

/// Settings manager
pub struct SettingsManager {
    settings_file: PathBuf,
    settings: Settings,
}

impl SettingsManager {
    /// Load settings from `storage_dir`, falling back to defaults
    pub fn new(storage_dir: &Path) -> Self {
        let settings_file = storage_dir.join("settings.json");
        let settings = Self::load_from_file(&settings_file).unwrap_or_else(|e| {
            warn!("Could not read settings, using defaults: {}", e);
            Settings::new()
        });

        Self {
            settings_file,
            settings,
        }
    }

    /// Manager for `storage_dir` holding the given settings, not yet saved
    pub fn with_settings(storage_dir: &Path, settings: Settings) -> Self {
        Self {
            settings_file: storage_dir.join("settings.json"),
            settings,
        }
    }

    fn load_from_file(path: &Path) -> Result<Settings> {
        if !path.exists() {
            debug!("No settings file found, using defaults");
            return Ok(Settings::new());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&contents)?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    pub fn path(&self) -> &Path {
        &self.settings_file
    }

    /// Save settings to file
    pub async fn save(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.settings)?;

        if let Some(parent) = self.settings_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write atomically using temp file
        let temp_path = self.settings_file.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &self.settings_file).await?;

        debug!("Saved settings to {:?}", self.settings_file);
        Ok(())
    }

    /// Get current settings
    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Validate, replace and save settings
    pub async fn update(&mut self, settings: Settings) -> Result<()> {
        settings.validate()?;
        self.settings = settings;
        self.save().await
    }
}
