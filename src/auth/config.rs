//! Auth configuration, loaded once at startup and immutable afterwards.

use anyhow::{bail, Result};
use secrecy::{ExposeSecret, SecretString};

pub const MIN_KEY_BYTES: usize = 32;

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_CSRF_TTL_SECONDS: i64 = 60 * 60;
// OWASP minimum for Argon2id.
const DEFAULT_HASH_MEMORY_KIB: u32 = 19 * 1024;
const DEFAULT_HASH_ITERATIONS: u32 = 2;
const DEFAULT_HASH_PARALLELISM: u32 = 1;
const DEFAULT_MAX_FAILED_LOGINS: u32 = 5;
const DEFAULT_LOCKOUT_SECONDS: u64 = 15 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    signing_key: SecretString,
    csrf_key: SecretString,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    csrf_ttl_seconds: i64,
    hash_memory_kib: u32,
    hash_iterations: u32,
    hash_parallelism: u32,
    max_failed_logins: u32,
    lockout_seconds: u64,
    revoke_on_reuse: bool,
    cookie_secure: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new(signing_key: SecretString, csrf_key: SecretString) -> Self {
        Self {
            signing_key,
            csrf_key,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            csrf_ttl_seconds: DEFAULT_CSRF_TTL_SECONDS,
            hash_memory_kib: DEFAULT_HASH_MEMORY_KIB,
            hash_iterations: DEFAULT_HASH_ITERATIONS,
            hash_parallelism: DEFAULT_HASH_PARALLELISM,
            max_failed_logins: DEFAULT_MAX_FAILED_LOGINS,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
            revoke_on_reuse: true,
            cookie_secure: true,
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_csrf_ttl_seconds(mut self, seconds: i64) -> Self {
        self.csrf_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_hash_cost(mut self, memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        self.hash_memory_kib = memory_kib;
        self.hash_iterations = iterations;
        self.hash_parallelism = parallelism;
        self
    }

    #[must_use]
    pub fn with_lockout(mut self, max_failed_logins: u32, lockout_seconds: u64) -> Self {
        self.max_failed_logins = max_failed_logins;
        self.lockout_seconds = lockout_seconds;
        self
    }

    #[must_use]
    pub fn with_revoke_on_reuse(mut self, revoke: bool) -> Self {
        self.revoke_on_reuse = revoke;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    /// Reject configurations that would weaken tokens or never let a session live.
    ///
    /// # Errors
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.signing_key.expose_secret().len() < MIN_KEY_BYTES {
            bail!("signing key must be at least {MIN_KEY_BYTES} bytes");
        }
        if self.csrf_key.expose_secret().len() < MIN_KEY_BYTES {
            bail!("csrf key must be at least {MIN_KEY_BYTES} bytes");
        }
        if self.signing_key.expose_secret() == self.csrf_key.expose_secret() {
            bail!("signing key and csrf key must differ");
        }
        if self.access_ttl_seconds <= 0 {
            bail!("access token ttl must be positive");
        }
        if self.refresh_ttl_seconds <= self.access_ttl_seconds {
            bail!("refresh token ttl must exceed the access token ttl");
        }
        if self.csrf_ttl_seconds <= 0 {
            bail!("csrf token ttl must be positive");
        }
        if argon2::Params::new(
            self.hash_memory_kib,
            self.hash_iterations,
            self.hash_parallelism,
            None,
        )
        .is_err()
        {
            bail!(
                "invalid hash cost: memory={}KiB iterations={} parallelism={}",
                self.hash_memory_kib,
                self.hash_iterations,
                self.hash_parallelism
            );
        }
        Ok(())
    }

    pub(crate) fn signing_key(&self) -> &[u8] {
        self.signing_key.expose_secret().as_bytes()
    }

    pub(crate) fn csrf_key(&self) -> &[u8] {
        self.csrf_key.expose_secret().as_bytes()
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub fn csrf_ttl_seconds(&self) -> i64 {
        self.csrf_ttl_seconds
    }

    #[must_use]
    pub fn hash_cost(&self) -> (u32, u32, u32) {
        (
            self.hash_memory_kib,
            self.hash_iterations,
            self.hash_parallelism,
        )
    }

    #[must_use]
    pub fn max_failed_logins(&self) -> u32 {
        self.max_failed_logins
    }

    #[must_use]
    pub fn lockout_seconds(&self) -> u64 {
        self.lockout_seconds
    }

    #[must_use]
    pub fn revoke_on_reuse(&self) -> bool {
        self.revoke_on_reuse
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }
}
