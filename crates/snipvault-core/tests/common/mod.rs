//! Fixtures shared by the integration tests

use chrono::Utc;
use snipvault_core::{KdfAlgorithm, KdfParams, ManualClock, Settings, Vault};
use std::sync::Arc;
use tempfile::TempDir;

pub fn fast_settings() -> Settings {
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

pub struct Fixture {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            clock: Arc::new(ManualClock::new(Utc::now())),
        }
    }

    /// Open a fresh handle on the same directory, as a new process would
    pub fn open(&self) -> Vault {
        Vault::open_with(self.dir.path(), fast_settings(), self.clock.clone()).unwrap()
    }

    pub async fn initialized(&self, password: &str) -> Vault {
        let mut vault = self.open();
        vault.initialize(password).await.unwrap();
        vault
    }
}
