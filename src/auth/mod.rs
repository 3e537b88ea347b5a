//! Token-based authentication and session layer with CSRF protection.
//!
//! The pieces:
//! - [`Authenticator`]: secret verification, access/refresh issuance, rotation, revocation.
//! - [`CsrfGuard`]: stateless anti-forgery tokens bound to a session value.
//! - [`store`]: persistence seams (`CredentialStore`, `SessionStore`) and their adapters.
//!
//! Configuration is passed in explicitly through [`AuthConfig`]; nothing here reads
//! process-wide state except the clock.

pub mod authenticator;
pub mod config;
pub mod csrf;
pub mod error;
pub mod lockout;
pub mod password;
pub mod store;
pub mod token;
pub(crate) mod utils;

pub use authenticator::{Authenticator, TokenPair};
pub use config::AuthConfig;
pub use csrf::{CsrfGuard, CsrfToken};
pub use error::AuthError;
pub use token::{AccessToken, Claims};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}
