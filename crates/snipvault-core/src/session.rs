//! Session issuance, validation and expiry
//!
//! A session is a time-bounded proof that the master password was verified,
//! persisted in the `sessions` table so it survives process restarts. Only
//! the most recently issued row is meaningful; older rows are tolerated and
//! cleared by [`SessionStore::purge_stale`].

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Result, VaultError};
use crate::storage::row::{parse_optional_timestamp, parse_timestamp, timestamp};
use crate::storage::Store;

/// Default session lifetime: 24 hours
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// How long an ended session row is kept before the sweeper removes it
pub const SESSION_RETENTION_DAYS: i64 = 7;

/// A persisted session record
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// 32 random bytes, hex encoded
    pub session_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Leading characters of the id, safe for logs
    pub fn short_id(&self) -> &str {
        self.session_id.get(..8).unwrap_or(&self.session_id)
    }

    /// Valid iff not revoked and `at` is before the expiry
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && at < self.expires_at
    }

    /// Time left at `at`, zero once expired
    pub fn remaining_at(&self, at: DateTime<Utc>) -> Duration {
        (self.expires_at - at).max(Duration::zero())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &format_args!("{}…", self.short_id()))
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("revoked_at", &self.revoked_at)
            .finish()
    }
}

/// Why a session check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionInvalidReason {
    NoSession,
    Expired,
    Revoked,
}

impl fmt::Display for SessionInvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionInvalidReason::NoSession => write!(f, "no session"),
            SessionInvalidReason::Expired => write!(f, "session expired"),
            SessionInvalidReason::Revoked => write!(f, "session revoked"),
        }
    }
}

/// Outcome of [`SessionStore::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionValidation {
    Valid(Session),
    Invalid(SessionInvalidReason),
}

impl SessionValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionValidation::Valid(_))
    }

    /// Convert into a result, mapping an invalid session to `SessionInvalid`
    pub fn into_result(self) -> Result<Session> {
        match self {
            SessionValidation::Valid(session) => Ok(session),
            SessionValidation::Invalid(reason) => Err(VaultError::SessionInvalid(reason)),
        }
    }
}

fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Persists and checks sessions through the store
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Issue a new session valid for `ttl`
    ///
    /// Replaces every previously stored session.
    pub fn issue(&self, ttl: Duration) -> Result<Session> {
        if ttl <= Duration::zero() {
            return Err(VaultError::Validation(
                "Session lifetime must be positive".to_string(),
            ));
        }

        let issued_at = self.clock.now();
        let session = Session {
            session_id: generate_session_id(),
            issued_at,
            expires_at: issued_at + ttl,
            revoked_at: None,
        };

        self.store.database().transaction(|tx| {
            tx.execute("DELETE FROM sessions", [])?;
            tx.execute(
                "INSERT INTO sessions (session_id, issued_at, expires_at) VALUES (?1, ?2, ?3)",
                params![
                    session.session_id,
                    timestamp(session.issued_at),
                    timestamp(session.expires_at)
                ],
            )?;
            Ok(())
        })?;

        info!(
            "Issued session {} expiring at {}",
            session.short_id(),
            session.expires_at
        );
        Ok(session)
    }

    /// Most recently issued session row, whatever its state
    pub fn current(&self) -> Result<Option<Session>> {
        let row: Option<(String, String, String, Option<String>)> =
            self.store.database().read(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT session_id, issued_at, expires_at, revoked_at
                         FROM sessions ORDER BY id DESC LIMIT 1",
                        [],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                    )
                    .optional()?)
            })?;

        row.map(|(session_id, issued_at, expires_at, revoked_at)| {
            Ok(Session {
                session_id,
                issued_at: parse_timestamp(&issued_at)?,
                expires_at: parse_timestamp(&expires_at)?,
                revoked_at: parse_optional_timestamp(revoked_at.as_deref())?,
            })
        })
        .transpose()
    }

    /// Check the current session against the clock
    ///
    /// Read-only; never extends the expiry.
    pub fn validate(&self) -> Result<SessionValidation> {
        let Some(session) = self.current()? else {
            return Ok(SessionValidation::Invalid(SessionInvalidReason::NoSession));
        };

        if session.revoked_at.is_some() {
            return Ok(SessionValidation::Invalid(SessionInvalidReason::Revoked));
        }
        if self.clock.now() >= session.expires_at {
            debug!("Session {} has expired", session.short_id());
            return Ok(SessionValidation::Invalid(SessionInvalidReason::Expired));
        }

        Ok(SessionValidation::Valid(session))
    }

    /// Mark the current session revoked; a no-op if already revoked or absent
    pub fn revoke(&self) -> Result<()> {
        let now = timestamp(self.clock.now());
        let revoked = self.store.database().transaction(|tx| {
            Ok(tx.execute(
                "UPDATE sessions SET revoked_at = ?1 WHERE revoked_at IS NULL",
                params![now],
            )?)
        })?;

        if revoked > 0 {
            info!("Session revoked");
        }
        Ok(())
    }

    /// Delete every session row except the most recent one, and the most
    /// recent one too once it has been expired or revoked for longer than
    /// [`SESSION_RETENTION_DAYS`]
    ///
    /// Returns the number of rows removed.
    pub fn purge_stale(&self) -> Result<usize> {
        let cutoff = timestamp(self.clock.now() - Duration::days(SESSION_RETENTION_DAYS));
        let removed = self.store.database().transaction(|tx| {
            let older = tx.execute(
                "DELETE FROM sessions WHERE id < (SELECT MAX(id) FROM sessions)",
                [],
            )?;
            let ended = tx.execute(
                "DELETE FROM sessions WHERE expires_at < ?1 OR revoked_at < ?1",
                params![cutoff],
            )?;
            Ok(older + ended)
        })?;

        if removed > 0 {
            debug!("Purged {} stale session rows", removed);
        }
        Ok(removed)
    }
}

/// Background task that periodically purges stale session rows
pub struct SessionSweeper;

impl SessionSweeper {
    /// Spawn the sweeper on the current tokio runtime
    ///
    /// Runs until the returned handle is aborted.
    pub fn spawn(sessions: SessionStore, every: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let sessions = sessions.clone();
                match tokio::task::spawn_blocking(move || sessions.purge_stale()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("Session sweep failed: {}", e),
                    Err(e) => warn!("Session sweep task failed: {}", e),
                }
            }
        })
    }
}
