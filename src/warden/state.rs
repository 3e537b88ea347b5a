use std::sync::Arc;

use crate::auth::{
    store::MemoryStore, AuthConfig, Authenticator, CsrfGuard,
};

/// Shared per-process state handed to every handler through an `Extension`.
#[derive(Debug)]
pub struct WardenState {
    authenticator: Authenticator,
    csrf: CsrfGuard,
}

impl WardenState {
    #[must_use]
    pub fn new(authenticator: Authenticator) -> Self {
        let config = authenticator.config();
        let csrf = CsrfGuard::new(config.csrf_key(), config.csrf_ttl_seconds());
        Self {
            authenticator,
            csrf,
        }
    }

    /// State backed by a fresh [`MemoryStore`].
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn in_memory(config: AuthConfig) -> anyhow::Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let authenticator = Authenticator::new(config, store.clone(), store)?;
        Ok(Self::new(authenticator))
    }

    #[must_use]
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    #[must_use]
    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        self.authenticator.config()
    }
}
