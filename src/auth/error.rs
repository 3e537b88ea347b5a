//! Authentication error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account locked: retry in {retry_after_seconds}s")]
    AccountLocked { retry_after_seconds: u64 },
    #[error("token expired")]
    TokenExpired,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("malformed token")]
    Malformed,
    #[error("refresh token reused")]
    RefreshReused,
    #[error("csrf token mismatch")]
    CsrfMismatch,
    #[error("session revoked")]
    SessionRevoked,
    #[error("principal already exists")]
    Conflict,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Short machine-readable code used in rejection bodies and log fields.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountLocked { .. } => "account_locked",
            Self::TokenExpired => "token_expired",
            Self::InvalidSignature => "invalid_signature",
            Self::Malformed => "malformed",
            Self::RefreshReused => "refresh_reused",
            Self::CsrfMismatch => "csrf_mismatch",
            Self::SessionRevoked => "session_revoked",
            Self::Conflict => "conflict",
            Self::InvalidInput(_) => "invalid_input",
            Self::Internal(_) => "internal",
        }
    }
}

pub type Result<T, E = AuthError> = std::result::Result<T, E>;
