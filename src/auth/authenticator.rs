//! Credential checks, token issuance, refresh rotation and revocation.
//!
//! Flow Overview:
//! 1) `authenticate` verifies a secret and opens a session with its first refresh token.
//! 2) `validate` is a pure signature/expiry check; `authorize` also requires a live session.
//! 3) `refresh` consumes a refresh token exactly once and hands out a new pair.
//!    Presenting a consumed token revokes the whole session.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use ulid::Ulid;
use uuid::Uuid;

use super::{
    config::AuthConfig,
    error::{AuthError, Result},
    lockout::Lockout,
    password::SecretHasher,
    store::{
        CredentialStore, InsertOutcome, Principal, RefreshRecord, RotateOutcome, Session,
        SessionState, SessionStore,
    },
    token::{self, AccessToken, Claims},
    unix_now,
    utils::{
        generate_opaque_token, hash_opaque_token, normalize_identifier, valid_email,
        valid_secret, MAX_SECRET_LEN, MIN_SECRET_LEN,
    },
};

const DEFAULT_ROLE: &str = "user";

/// Access token plus the refresh token that can renew it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub access_expires_at: i64,
    pub refresh_token: String,
    pub refresh_expires_at: i64,
    pub session_id: String,
}

pub struct Authenticator {
    config: AuthConfig,
    hasher: SecretHasher,
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    lockout: Lockout,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("config", &self.config)
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: AuthConfig,
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let (memory_kib, iterations, parallelism) = config.hash_cost();
        let hasher = SecretHasher::new(memory_kib, iterations, parallelism)?;
        let lockout = Lockout::new(config.max_failed_logins(), config.lockout_seconds());
        Ok(Self {
            config,
            hasher,
            credentials,
            sessions,
            lockout,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn hasher(&self) -> &SecretHasher {
        &self.hasher
    }

    /// Check the credential store's health.
    ///
    /// # Errors
    /// Returns the store error when it is unreachable.
    pub async fn health(&self) -> anyhow::Result<()> {
        self.credentials.health().await
    }

    /// Create a principal with the default role.
    ///
    /// # Errors
    /// `InvalidInput` for a bad e-mail or secret length, `Conflict` for a duplicate identifier.
    #[instrument(skip(self, secret))]
    pub async fn register(&self, identifier: &str, secret: &str) -> Result<Principal> {
        let identifier = normalize_identifier(identifier);
        if !valid_email(&identifier) {
            return Err(AuthError::InvalidInput("invalid email".to_string()));
        }
        if !valid_secret(secret) {
            return Err(AuthError::InvalidInput(format!(
                "password must be {MIN_SECRET_LEN}-{MAX_SECRET_LEN} characters"
            )));
        }
        let secret_hash = self.hasher.hash_blocking(secret.to_string()).await?;
        match self
            .credentials
            .insert_principal(&identifier, &secret_hash, &[DEFAULT_ROLE.to_string()])
            .await?
        {
            InsertOutcome::Created(principal) => {
                info!(principal_id = %principal.id, "principal registered");
                Ok(principal)
            }
            InsertOutcome::Conflict => Err(AuthError::Conflict),
        }
    }

    /// Verify `secret` for `identifier` and open a new session.
    ///
    /// # Errors
    /// `AccountLocked` while the lockout cooldown runs, `InvalidCredentials` otherwise on failure.
    #[instrument(skip(self, secret))]
    pub async fn authenticate(&self, identifier: &str, secret: &str) -> Result<TokenPair> {
        let identifier = normalize_identifier(identifier);
        let now = unix_now();

        if let Some(retry_after_seconds) = self.lockout.check(&identifier, now).await {
            debug!("login refused while locked");
            return Err(AuthError::AccountLocked {
                retry_after_seconds,
            });
        }

        let principal = self.credentials.find_by_identifier(&identifier).await?;
        let verified = match &principal {
            Some(principal) => {
                self.hasher
                    .verify_blocking(secret.to_string(), principal.secret_hash.clone())
                    .await?
            }
            None => {
                // Same cost as a real verification so unknown identifiers are not distinguishable.
                let _ = self.hasher.hash_blocking(secret.to_string()).await?;
                false
            }
        };

        let principal = match principal {
            Some(principal) if verified => principal,
            _ => {
                if let Some(locked_for) = self.lockout.record_failure(&identifier, now).await {
                    warn!(locked_for, "identifier locked after repeated failures");
                }
                return Err(AuthError::InvalidCredentials);
            }
        };
        self.lockout.record_success(&identifier).await;

        if self.hasher.needs_rehash(&principal.secret_hash) {
            self.rehash(&principal, secret).await;
        }

        let pair = self.open_session(&principal, now).await?;
        info!(principal_id = %principal.id, session_id = %pair.session_id, "authenticated");
        Ok(pair)
    }

    async fn rehash(&self, principal: &Principal, secret: &str) {
        let upgraded = match self.hasher.hash_blocking(secret.to_string()).await {
            Ok(hash) => self.credentials.update_secret(principal.id, &hash).await,
            Err(err) => Err(err),
        };
        match upgraded {
            Ok(_) => debug!(principal_id = %principal.id, "secret hash upgraded"),
            Err(err) => warn!(principal_id = %principal.id, "failed to upgrade secret hash: {err}"),
        }
    }

    async fn open_session(&self, principal: &Principal, now: i64) -> Result<TokenPair> {
        let session = Session {
            id: Ulid::new().to_string(),
            principal_id: principal.id,
            created_at: now,
            revoked_at: None,
            rotations: 0,
        };
        let refresh_token = generate_opaque_token()?;
        let refresh = RefreshRecord {
            token_hash: hash_opaque_token(&refresh_token),
            session_id: session.id.clone(),
            principal_id: principal.id,
            expires_at: now + self.config.refresh_ttl_seconds(),
            used_at: None,
        };
        self.sessions.create_session(&session, &refresh).await?;

        let access = self.issue_access(principal, &session.id, now)?;
        Ok(TokenPair {
            access_token: access.token,
            access_expires_at: access.expires_at,
            refresh_token,
            refresh_expires_at: refresh.expires_at,
            session_id: session.id,
        })
    }

    fn issue_access(&self, principal: &Principal, session_id: &str, now: i64) -> Result<AccessToken> {
        let claims = Claims::new(
            principal.id.to_string(),
            principal.identifier.clone(),
            principal.roles.clone(),
            session_id,
            now,
            self.config.access_ttl_seconds(),
        );
        token::sign(self.config.signing_key(), &claims)
    }

    /// Verify an access token's structure, expiry and signature. No store access.
    ///
    /// # Errors
    /// `Malformed`, `TokenExpired` or `InvalidSignature`.
    pub fn validate(&self, token: &str) -> Result<Claims> {
        self.validate_at(token, unix_now())
    }

    /// [`Authenticator::validate`] against an explicit clock.
    ///
    /// # Errors
    /// `Malformed`, `TokenExpired` or `InvalidSignature`.
    pub fn validate_at(&self, token: &str, now: i64) -> Result<Claims> {
        token::verify(self.config.signing_key(), token, now)
    }

    /// Validate the token and require that its session has not been revoked.
    ///
    /// # Errors
    /// Any `validate` error, or `SessionRevoked`.
    #[instrument(skip_all)]
    pub async fn authorize(&self, token: &str) -> Result<Claims> {
        let claims = self.validate(token)?;
        match self.sessions.find_session(&claims.sid).await? {
            Some(session) if session.revoked_at.is_none() => Ok(claims),
            _ => Err(AuthError::SessionRevoked),
        }
    }

    /// Sliding renewal: a fresh access token for an already authorized request.
    ///
    /// # Errors
    /// `Internal` if signing fails.
    pub fn reissue(&self, claims: &Claims) -> Result<AccessToken> {
        let now = unix_now();
        let renewed = Claims::new(
            claims.sub.clone(),
            claims.email.clone(),
            claims.roles.clone(),
            claims.sid.clone(),
            now,
            self.config.access_ttl_seconds(),
        );
        token::sign(self.config.signing_key(), &renewed)
    }

    /// Exchange a refresh token for a new pair, consuming it.
    ///
    /// # Errors
    /// `InvalidCredentials` (unknown token or principal), `SessionRevoked`, `RefreshReused`,
    /// or `TokenExpired`. A consumed token is always `RefreshReused`, even on a revoked or
    /// expired session.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        self.refresh_at(refresh_token, unix_now()).await
    }

    /// [`Authenticator::refresh`] against an explicit clock.
    ///
    /// # Errors
    /// See [`Authenticator::refresh`].
    pub async fn refresh_at(&self, refresh_token: &str, now: i64) -> Result<TokenPair> {
        let token_hash = hash_opaque_token(refresh_token);
        let Some(record) = self.sessions.find_refresh(&token_hash).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        let Some(session) = self.sessions.find_session(&record.session_id).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        if record.used_at.is_some() {
            return Err(self.reuse_detected(&session, now).await);
        }
        match session.state(record.expires_at, now) {
            SessionState::Revoked => {
                // A concurrent rotation may have consumed the token after it was read.
                let consumed = self
                    .sessions
                    .find_refresh(&token_hash)
                    .await?
                    .is_some_and(|record| record.used_at.is_some());
                if consumed {
                    return Err(self.reuse_detected(&session, now).await);
                }
                return Err(AuthError::SessionRevoked);
            }
            SessionState::Expired => return Err(AuthError::TokenExpired),
            SessionState::Authenticated | SessionState::Refreshed => {}
        }

        let Some(principal) = self.credentials.find_by_id(record.principal_id).await? else {
            self.sessions.revoke_session(&session.id, now).await?;
            return Err(AuthError::InvalidCredentials);
        };

        let next_token = generate_opaque_token()?;
        let next = RefreshRecord {
            token_hash: hash_opaque_token(&next_token),
            session_id: session.id.clone(),
            principal_id: principal.id,
            expires_at: now + self.config.refresh_ttl_seconds(),
            used_at: None,
        };
        match self.sessions.rotate_refresh(&token_hash, &next, now).await? {
            RotateOutcome::Rotated => {}
            // Lost a race against a concurrent rotation of the same token.
            RotateOutcome::AlreadyUsed => return Err(self.reuse_detected(&session, now).await),
        }

        let access = self.issue_access(&principal, &session.id, now)?;
        debug!(session_id = %session.id, "refresh token rotated");
        Ok(TokenPair {
            access_token: access.token,
            access_expires_at: access.expires_at,
            refresh_token: next_token,
            refresh_expires_at: next.expires_at,
            session_id: session.id,
        })
    }

    async fn reuse_detected(&self, session: &Session, now: i64) -> AuthError {
        warn!(
            session_id = %session.id,
            principal_id = %session.principal_id,
            "refresh token replayed"
        );
        if self.config.revoke_on_reuse() && session.revoked_at.is_none() {
            if let Err(err) = self.sessions.revoke_session(&session.id, now).await {
                return AuthError::Internal(err);
            }
        }
        AuthError::RefreshReused
    }

    /// Revoke a session. Revoking an unknown or already revoked session is a no-op.
    ///
    /// # Errors
    /// `Internal` on store failure.
    #[instrument(skip(self))]
    pub async fn logout(&self, session_id: &str) -> Result<()> {
        if self.sessions.revoke_session(session_id, unix_now()).await? {
            info!("session revoked");
        }
        Ok(())
    }

    /// Revoke the session that owns `refresh_token`, if any.
    ///
    /// # Errors
    /// `Internal` on store failure.
    pub async fn revoke_refresh(&self, refresh_token: &str) -> Result<()> {
        match self
            .sessions
            .find_refresh(&hash_opaque_token(refresh_token))
            .await?
        {
            Some(record) => self.logout(&record.session_id).await,
            None => Ok(()),
        }
    }

    /// Rotate a principal's secret and revoke every session it holds.
    ///
    /// # Errors
    /// `InvalidCredentials` if `current` does not match, `InvalidInput` for a bad new secret.
    #[instrument(skip(self, current, new))]
    pub async fn change_secret(&self, principal_id: Uuid, current: &str, new: &str) -> Result<()> {
        let principal = self.verified_principal(principal_id, current).await?;
        if !valid_secret(new) {
            return Err(AuthError::InvalidInput(format!(
                "password must be {MIN_SECRET_LEN}-{MAX_SECRET_LEN} characters"
            )));
        }
        let secret_hash = self.hasher.hash_blocking(new.to_string()).await?;
        if !self
            .credentials
            .update_secret(principal.id, &secret_hash)
            .await?
        {
            return Err(AuthError::InvalidCredentials);
        }
        let revoked = self
            .sessions
            .revoke_principal_sessions(principal.id, unix_now())
            .await?;
        info!(revoked, "secret rotated");
        Ok(())
    }

    /// Delete a principal after re-checking its secret.
    ///
    /// # Errors
    /// `InvalidCredentials` if the secret does not match.
    #[instrument(skip(self, secret))]
    pub async fn delete_account(&self, principal_id: Uuid, secret: &str) -> Result<()> {
        let principal = self.verified_principal(principal_id, secret).await?;
        self.sessions
            .revoke_principal_sessions(principal.id, unix_now())
            .await?;
        self.credentials.delete_principal(principal.id).await?;
        info!("principal deleted");
        Ok(())
    }

    async fn verified_principal(&self, principal_id: Uuid, secret: &str) -> Result<Principal> {
        let principal = self
            .credentials
            .find_by_id(principal_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if self
            .hasher
            .verify_blocking(secret.to_string(), principal.secret_hash.clone())
            .await?
        {
            Ok(principal)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryStore;
    use anyhow::Context;
    use secrecy::SecretString;

    const SIGNING_KEY: &str = "signing-key-signing-key-signing-key!";
    const CSRF_KEY: &str = "csrf-key-csrf-key-csrf-key-csrf-key!";

    fn config() -> AuthConfig {
        AuthConfig::new(
            SecretString::from(SIGNING_KEY),
            SecretString::from(CSRF_KEY),
        )
        .with_hash_cost(8, 1, 1)
        .with_lockout(3, 60)
    }

    fn authenticator_with(config: AuthConfig) -> anyhow::Result<(Authenticator, Arc<MemoryStore>)> {
        let store = Arc::new(MemoryStore::new());
        let auth = Authenticator::new(config, store.clone(), store.clone())?;
        Ok((auth, store))
    }

    /// Seed a principal straight into the store, bypassing signup policy.
    async fn seed(auth: &Authenticator, store: &MemoryStore, identifier: &str, secret: &str) -> anyhow::Result<Principal> {
        let hash = auth.hasher().hash(secret)?;
        match store
            .insert_principal(identifier, &hash, &["user".to_string()])
            .await?
        {
            InsertOutcome::Created(principal) => Ok(principal),
            InsertOutcome::Conflict => anyhow::bail!("principal already seeded"),
        }
    }

    fn tamper_signature(token: &str) -> anyhow::Result<String> {
        let (head, signature) = token.rsplit_once('.').context("token has no signature")?;
        let mut bytes = signature.as_bytes().to_vec();
        let first = bytes.first_mut().context("empty signature")?;
        *first = if *first == b'A' { b'B' } else { b'A' };
        Ok(format!("{head}.{}", String::from_utf8(bytes)?))
    }

    #[tokio::test]
    async fn u1_scenario() -> anyhow::Result<()> {
        let (auth, store) = authenticator_with(config())?;
        let principal = seed(&auth, &store, "u1", "pw1").await?;

        let pair = auth.authenticate("u1", "pw1").await?;
        let claims = auth.validate(&pair.access_token)?;
        assert_eq!(claims.sub, principal.id.to_string());
        assert_eq!(claims.roles, vec!["user".to_string()]);
        assert_eq!(claims.sid, pair.session_id);

        assert!(matches!(
            auth.authenticate("u1", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));

        let tampered = tamper_signature(&pair.access_token)?;
        assert!(matches!(
            auth.validate(&tampered),
            Err(AuthError::InvalidSignature)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_identifier_is_invalid_credentials() -> anyhow::Result<()> {
        let (auth, _) = authenticator_with(config())?;
        assert!(matches!(
            auth.authenticate("ghost@example.com", "whatever1").await,
            Err(AuthError::InvalidCredentials)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn expired_token_reports_expiry() -> anyhow::Result<()> {
        let (auth, store) = authenticator_with(config())?;
        seed(&auth, &store, "u1", "pw1").await?;
        let pair = auth.authenticate("u1", "pw1").await?;

        let later = pair.access_expires_at;
        assert!(matches!(
            auth.validate_at(&pair.access_token, later),
            Err(AuthError::TokenExpired)
        ));
        let tampered = tamper_signature(&pair.access_token)?;
        assert!(matches!(
            auth.validate_at(&tampered, later + 1),
            Err(AuthError::TokenExpired)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn lockout_after_repeated_failures() -> anyhow::Result<()> {
        let (auth, store) = authenticator_with(config())?;
        seed(&auth, &store, "u1", "pw1").await?;

        for _ in 0..3 {
            assert!(matches!(
                auth.authenticate("u1", "wrong").await,
                Err(AuthError::InvalidCredentials)
            ));
        }
        match auth.authenticate("u1", "pw1").await {
            Err(AuthError::AccountLocked {
                retry_after_seconds,
            }) => assert!(retry_after_seconds > 0 && retry_after_seconds <= 60),
            other => anyhow::bail!("expected lockout, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn refresh_rotates_and_detects_replay() -> anyhow::Result<()> {
        let (auth, store) = authenticator_with(config())?;
        seed(&auth, &store, "u1", "pw1").await?;
        let first = auth.authenticate("u1", "pw1").await?;

        let second = auth.refresh(&first.refresh_token).await?;
        assert_ne!(second.refresh_token, first.refresh_token);
        assert_eq!(second.session_id, first.session_id);
        auth.authorize(&second.access_token).await?;

        let session = store
            .find_session(&first.session_id)
            .await?
            .context("session missing")?;
        assert_eq!(session.rotations, 1);

        // Replaying the rotated-away token never yields a new pair.
        assert!(matches!(
            auth.refresh(&first.refresh_token).await,
            Err(AuthError::RefreshReused)
        ));
        // The whole chain is revoked, including the latest token.
        assert!(matches!(
            auth.refresh(&second.refresh_token).await,
            Err(AuthError::SessionRevoked)
        ));
        assert!(matches!(
            auth.authorize(&second.access_token).await,
            Err(AuthError::SessionRevoked)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn replay_without_revocation_keeps_chain() -> anyhow::Result<()> {
        let (auth, store) = authenticator_with(config().with_revoke_on_reuse(false))?;
        seed(&auth, &store, "u1", "pw1").await?;
        let first = auth.authenticate("u1", "pw1").await?;
        let second = auth.refresh(&first.refresh_token).await?;

        assert!(matches!(
            auth.refresh(&first.refresh_token).await,
            Err(AuthError::RefreshReused)
        ));
        auth.refresh(&second.refresh_token).await?;
        Ok(())
    }

    #[tokio::test]
    async fn replay_is_reported_on_revoked_session() -> anyhow::Result<()> {
        let (auth, store) = authenticator_with(config())?;
        seed(&auth, &store, "u1", "pw1").await?;
        let first = auth.authenticate("u1", "pw1").await?;
        auth.refresh(&first.refresh_token).await?;

        for _ in 0..2 {
            assert!(matches!(
                auth.refresh(&first.refresh_token).await,
                Err(AuthError::RefreshReused)
            ));
        }

        let other = auth.authenticate("u1", "pw1").await?;
        let rotated = auth.refresh(&other.refresh_token).await?;
        auth.logout(&other.session_id).await?;
        assert!(matches!(
            auth.refresh(&other.refresh_token).await,
            Err(AuthError::RefreshReused)
        ));
        // The unused token of a logged-out session is merely revoked.
        assert!(matches!(
            auth.refresh(&rotated.refresh_token).await,
            Err(AuthError::SessionRevoked)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn replay_after_expiry_is_still_reuse() -> anyhow::Result<()> {
        let (auth, store) = authenticator_with(config())?;
        seed(&auth, &store, "u1", "pw1").await?;
        let first = auth.authenticate("u1", "pw1").await?;
        auth.refresh(&first.refresh_token).await?;
        assert!(matches!(
            auth.refresh_at(&first.refresh_token, first.refresh_expires_at + 10).await,
            Err(AuthError::RefreshReused)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_refresh_has_one_winner() -> anyhow::Result<()> {
        let (auth, store) = authenticator_with(config())?;
        seed(&auth, &store, "u1", "pw1").await?;
        let auth = Arc::new(auth);
        let pair = auth.authenticate("u1", "pw1").await?;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let auth = auth.clone();
            let token = pair.refresh_token.clone();
            handles.push(tokio::spawn(async move { auth.refresh(&token).await }));
        }
        let mut winners = 0;
        for handle in handles {
            match handle.await? {
                Ok(_) => winners += 1,
                Err(AuthError::RefreshReused) => {}
                Err(other) => anyhow::bail!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners, 1);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_rejects_unknown_and_expired() -> anyhow::Result<()> {
        let (auth, store) = authenticator_with(config())?;
        seed(&auth, &store, "u1", "pw1").await?;
        assert!(matches!(
            auth.refresh("not-a-real-token").await,
            Err(AuthError::InvalidCredentials)
        ));

        let pair = auth.authenticate("u1", "pw1").await?;
        assert!(matches!(
            auth.refresh_at(&pair.refresh_token, pair.refresh_expires_at).await,
            Err(AuthError::TokenExpired)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn logout_revokes_session() -> anyhow::Result<()> {
        let (auth, store) = authenticator_with(config())?;
        seed(&auth, &store, "u1", "pw1").await?;
        let pair = auth.authenticate("u1", "pw1").await?;

        auth.logout(&pair.session_id).await?;
        auth.logout(&pair.session_id).await?;

        // Stateless validation still passes; authorization does not.
        auth.validate(&pair.access_token)?;
        assert!(matches!(
            auth.authorize(&pair.access_token).await,
            Err(AuthError::SessionRevoked)
        ));
        assert!(matches!(
            auth.refresh(&pair.refresh_token).await,
            Err(AuthError::SessionRevoked)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn revoke_refresh_ends_owning_session() -> anyhow::Result<()> {
        let (auth, store) = authenticator_with(config())?;
        seed(&auth, &store, "u1", "pw1").await?;
        let pair = auth.authenticate("u1", "pw1").await?;

        auth.revoke_refresh(&pair.refresh_token).await?;
        auth.revoke_refresh("unknown").await?;
        assert!(matches!(
            auth.authorize(&pair.access_token).await,
            Err(AuthError::SessionRevoked)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn register_applies_policy() -> anyhow::Result<()> {
        let (auth, _) = authenticator_with(config())?;

        let principal = auth.register(" Alice@Example.com ", "correct horse").await?;
        assert_eq!(principal.identifier, "alice@example.com");
        assert_eq!(principal.roles, vec!["user".to_string()]);

        assert!(matches!(
            auth.register("alice@example.com", "another secret").await,
            Err(AuthError::Conflict)
        ));
        assert!(matches!(
            auth.register("not-an-email", "correct horse").await,
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            auth.register("bob@example.com", "short").await,
            Err(AuthError::InvalidInput(_))
        ));

        let pair = auth.authenticate("ALICE@example.com", "correct horse").await?;
        assert_eq!(auth.validate(&pair.access_token)?.email, "alice@example.com");
        Ok(())
    }

    #[tokio::test]
    async fn change_secret_revokes_every_session() -> anyhow::Result<()> {
        let (auth, _) = authenticator_with(config())?;
        let principal = auth.register("carol@example.com", "first secret").await?;
        let one = auth.authenticate("carol@example.com", "first secret").await?;
        let two = auth.authenticate("carol@example.com", "first secret").await?;

        assert!(matches!(
            auth.change_secret(principal.id, "not it", "second secret").await,
            Err(AuthError::InvalidCredentials)
        ));
        auth.change_secret(principal.id, "first secret", "second secret")
            .await?;

        for pair in [&one, &two] {
            assert!(matches!(
                auth.authorize(&pair.access_token).await,
                Err(AuthError::SessionRevoked)
            ));
        }
        assert!(matches!(
            auth.authenticate("carol@example.com", "first secret").await,
            Err(AuthError::InvalidCredentials)
        ));
        auth.authenticate("carol@example.com", "second secret")
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn delete_account_removes_principal() -> anyhow::Result<()> {
        let (auth, store) = authenticator_with(config())?;
        let principal = auth.register("dave@example.com", "dave secret").await?;
        let pair = auth.authenticate("dave@example.com", "dave secret").await?;

        assert!(matches!(
            auth.delete_account(principal.id, "wrong secret").await,
            Err(AuthError::InvalidCredentials)
        ));
        auth.delete_account(principal.id, "dave secret").await?;

        assert!(store.find_by_id(principal.id).await?.is_none());
        assert!(matches!(
            auth.authorize(&pair.access_token).await,
            Err(AuthError::SessionRevoked)
        ));
        assert!(matches!(
            auth.authenticate("dave@example.com", "dave secret").await,
            Err(AuthError::InvalidCredentials)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn login_upgrades_stale_hash() -> anyhow::Result<()> {
        let (auth, store) = authenticator_with(config())?;
        let stale = SecretHasher::new(8, 2, 1)?.hash("pw1")?;
        let InsertOutcome::Created(principal) = store
            .insert_principal("u1", &stale, &["user".to_string()])
            .await?
        else {
            anyhow::bail!("seed failed");
        };

        auth.authenticate("u1", "pw1").await?;
        let upgraded = store
            .find_by_id(principal.id)
            .await?
            .context("principal missing")?;
        assert_ne!(upgraded.secret_hash, stale);
        assert!(!auth.hasher().needs_rehash(&upgraded.secret_hash));
        auth.authenticate("u1", "pw1").await?;
        Ok(())
    }

    #[tokio::test]
    async fn reissue_extends_same_session() -> anyhow::Result<()> {
        let (auth, store) = authenticator_with(config())?;
        seed(&auth, &store, "u1", "pw1").await?;
        let pair = auth.authenticate("u1", "pw1").await?;
        let claims = auth.authorize(&pair.access_token).await?;

        let renewed = auth.reissue(&claims)?;
        let renewed_claims = auth.validate(&renewed.token)?;
        assert_eq!(renewed_claims.sub, claims.sub);
        assert_eq!(renewed_claims.sid, claims.sid);
        assert_ne!(renewed_claims.jti, claims.jti);
        Ok(())
    }

    #[test]
    fn rejects_invalid_config() {
        let short = AuthConfig::new(SecretString::from("short"), SecretString::from(CSRF_KEY));
        assert!(authenticator_with(short).is_err());
    }
}
