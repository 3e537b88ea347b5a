//! Credential and session persistence seams.
//!
//! The authenticator only talks to these traits. `MemoryStore` backs tests and
//! local runs; `PgStore` is the production adapter.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// An authenticated identity record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub identifier: String,
    pub secret_hash: String,
    pub roles: Vec<String>,
}

#[derive(Debug)]
pub enum InsertOutcome {
    Created(Principal),
    Conflict,
}

/// Lifecycle of an authenticated session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Authenticated,
    Refreshed,
    Revoked,
    Expired,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub principal_id: Uuid,
    pub created_at: i64,
    pub revoked_at: Option<i64>,
    pub rotations: u32,
}

impl Session {
    /// Derive the session state from the freshest refresh token's expiry.
    #[must_use]
    pub fn state(&self, refresh_expires_at: i64, now: i64) -> SessionState {
        if self.revoked_at.is_some() {
            SessionState::Revoked
        } else if refresh_expires_at <= now {
            SessionState::Expired
        } else if self.rotations > 0 {
            SessionState::Refreshed
        } else {
            SessionState::Authenticated
        }
    }
}

/// A stored refresh token. Only the SHA-256 of the raw value is kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshRecord {
    pub token_hash: Vec<u8>,
    pub session_id: String,
    pub principal_id: Uuid,
    pub expires_at: i64,
    pub used_at: Option<i64>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RotateOutcome {
    Rotated,
    /// The old token was already consumed (by a replay or a concurrent rotation).
    AlreadyUsed,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Principal>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>>;

    async fn insert_principal(
        &self,
        identifier: &str,
        secret_hash: &str,
        roles: &[String],
    ) -> Result<InsertOutcome>;

    /// Returns false when the principal no longer exists.
    async fn update_secret(&self, id: Uuid, secret_hash: &str) -> Result<bool>;

    async fn delete_principal(&self, id: Uuid) -> Result<bool>;

    async fn health(&self) -> Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session together with its first refresh token.
    async fn create_session(&self, session: &Session, refresh: &RefreshRecord) -> Result<()>;

    async fn find_session(&self, session_id: &str) -> Result<Option<Session>>;

    async fn find_refresh(&self, token_hash: &[u8]) -> Result<Option<RefreshRecord>>;

    /// Atomically mark `old_hash` used and insert `next`, only if `old_hash` is unused.
    async fn rotate_refresh(
        &self,
        old_hash: &[u8],
        next: &RefreshRecord,
        now: i64,
    ) -> Result<RotateOutcome>;

    /// Returns false if the session was unknown or already revoked.
    async fn revoke_session(&self, session_id: &str, now: i64) -> Result<bool>;

    /// Revoke every live session of a principal and return how many were revoked.
    async fn revoke_principal_sessions(&self, principal_id: Uuid, now: i64) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(revoked_at: Option<i64>, rotations: u32) -> Session {
        Session {
            id: "s".to_string(),
            principal_id: Uuid::nil(),
            created_at: 0,
            revoked_at,
            rotations,
        }
    }

    #[test]
    fn session_state_transitions() {
        assert_eq!(session(None, 0).state(100, 10), SessionState::Authenticated);
        assert_eq!(session(None, 2).state(100, 10), SessionState::Refreshed);
        assert_eq!(session(None, 2).state(100, 100), SessionState::Expired);
        assert_eq!(session(Some(5), 0).state(100, 10), SessionState::Revoked);
        assert_eq!(session(Some(5), 0).state(1, 10), SessionState::Revoked);
    }
}
