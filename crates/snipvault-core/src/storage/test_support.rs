//! Fixtures shared by the storage tests

use chrono::{Duration, Utc};

use super::Store;
use crate::context::AuthContext;
use crate::crypto::KeyMaterial;
use crate::session::Session;

pub(crate) fn test_store() -> Store {
    Store::open_in_memory().unwrap()
}

fn session() -> Session {
    let now = Utc::now();
    Session {
        session_id: "0f".repeat(32),
        issued_at: now,
        expires_at: now + Duration::hours(24),
        revoked_at: None,
    }
}

pub(crate) fn context_with_key(key: KeyMaterial) -> AuthContext {
    AuthContext::new(session(), Some(key))
}

pub(crate) fn keyed_context() -> AuthContext {
    context_with_key(KeyMaterial::new([0x42; 32]))
}

pub(crate) fn keyless_context() -> AuthContext {
    AuthContext::new(session(), None)
}
