//! In-process store. A single lock guards all maps so rotation and revocation
//! are atomic with respect to each other.
//!
//! Nothing is ever evicted: used and expired refresh records stay so replays are
//! still recognized. Meant for development and tests, not long-running deployments.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CredentialStore, InsertOutcome, Principal, RefreshRecord, RotateOutcome, Session, SessionStore,
};

#[derive(Default)]
struct Inner {
    principals: HashMap<Uuid, Principal>,
    identifiers: HashMap<String, Uuid>,
    sessions: HashMap<String, Session>,
    // Grows with every rotation; see the module docs.
    refresh: HashMap<Vec<u8>, RefreshRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Principal>> {
        let inner = self.inner.read().await;
        Ok(inner
            .identifiers
            .get(identifier)
            .and_then(|id| inner.principals.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>> {
        Ok(self.inner.read().await.principals.get(&id).cloned())
    }

    async fn insert_principal(
        &self,
        identifier: &str,
        secret_hash: &str,
        roles: &[String],
    ) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().await;
        if inner.identifiers.contains_key(identifier) {
            return Ok(InsertOutcome::Conflict);
        }
        let principal = Principal {
            id: Uuid::now_v7(),
            identifier: identifier.to_string(),
            secret_hash: secret_hash.to_string(),
            roles: roles.to_vec(),
        };
        inner
            .identifiers
            .insert(principal.identifier.clone(), principal.id);
        inner.principals.insert(principal.id, principal.clone());
        Ok(InsertOutcome::Created(principal))
    }

    async fn update_secret(&self, id: Uuid, secret_hash: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.principals.get_mut(&id).map_or(false, |principal| {
            principal.secret_hash = secret_hash.to_string();
            true
        }))
    }

    async fn delete_principal(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(principal) = inner.principals.remove(&id) else {
            return Ok(false);
        };
        inner.identifiers.remove(&principal.identifier);
        Ok(true)
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &Session, refresh: &RefreshRecord) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.sessions.insert(session.id.clone(), session.clone());
        inner
            .refresh
            .insert(refresh.token_hash.clone(), refresh.clone());
        Ok(())
    }

    async fn find_session(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.inner.read().await.sessions.get(session_id).cloned())
    }

    async fn find_refresh(&self, token_hash: &[u8]) -> Result<Option<RefreshRecord>> {
        Ok(self.inner.read().await.refresh.get(token_hash).cloned())
    }

    async fn rotate_refresh(
        &self,
        old_hash: &[u8],
        next: &RefreshRecord,
        now: i64,
    ) -> Result<RotateOutcome> {
        let mut inner = self.inner.write().await;
        match inner.refresh.get_mut(old_hash) {
            Some(old) if old.used_at.is_none() => old.used_at = Some(now),
            _ => return Ok(RotateOutcome::AlreadyUsed),
        }
        if let Some(session) = inner.sessions.get_mut(&next.session_id) {
            session.rotations += 1;
        }
        inner.refresh.insert(next.token_hash.clone(), next.clone());
        Ok(RotateOutcome::Rotated)
    }

    async fn revoke_session(&self, session_id: &str, now: i64) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.sessions.get_mut(session_id) {
            Some(session) if session.revoked_at.is_none() => {
                session.revoked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_principal_sessions(&self, principal_id: Uuid, now: i64) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let mut revoked = 0;
        for session in inner
            .sessions
            .values_mut()
            .filter(|s| s.principal_id == principal_id && s.revoked_at.is_none())
        {
            session.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }
}
