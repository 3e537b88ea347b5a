//! Stateless anti-forgery tokens bound to a session value.
//!
//! Token layout: `nonce.issued_at.mac`, with
//! `mac = HMAC-SHA256(key, "csrf" | session | nonce | issued_at)`.
//! Nothing is stored server-side; the caller supplies the session value on
//! every call.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

use super::unix_now;

type HmacSha256 = Hmac<Sha256>;

const NONCE_BYTES: usize = 16;
const DOMAIN: &[u8] = b"csrf";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CsrfToken(String);

impl CsrfToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CsrfToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub struct CsrfGuard {
    key: Vec<u8>,
    ttl_seconds: i64,
}

impl std::fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfGuard")
            .field("key", &"***")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

impl CsrfGuard {
    #[must_use]
    pub fn new(key: &[u8], ttl_seconds: i64) -> Self {
        Self {
            key: key.to_vec(),
            ttl_seconds,
        }
    }

    #[must_use]
    pub fn issue(&self, session: &str) -> CsrfToken {
        self.issue_at(session, unix_now())
    }

    #[must_use]
    pub fn issue_at(&self, session: &str, now: i64) -> CsrfToken {
        let mut nonce = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);
        let nonce_b64 = Base64UrlUnpadded::encode_string(&nonce);
        let mac_b64 = Base64UrlUnpadded::encode_string(&self.mac(session, &nonce_b64, now));
        CsrfToken(format!("{nonce_b64}.{now}.{mac_b64}"))
    }

    /// Constant-time check of `submitted` against `session`. Never errors.
    #[must_use]
    pub fn verify(&self, session: &str, submitted: &str) -> bool {
        self.verify_at(session, submitted, unix_now())
    }

    #[must_use]
    pub fn verify_at(&self, session: &str, submitted: &str, now: i64) -> bool {
        if session.is_empty() {
            return false;
        }
        let mut parts = submitted.split('.');
        let (Some(nonce_b64), Some(issued_at), Some(mac_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            debug!("csrf token has wrong shape");
            return false;
        };
        let Ok(issued_at) = issued_at.parse::<i64>() else {
            return false;
        };
        let expired = now
            .checked_sub(issued_at)
            .map_or(true, |age| age >= self.ttl_seconds);
        if issued_at > now || expired {
            debug!("csrf token outside its validity window");
            return false;
        }
        let Ok(submitted_mac) = Base64UrlUnpadded::decode_vec(mac_b64) else {
            return false;
        };
        let expected = self.mac(session, nonce_b64, issued_at);
        expected.ct_eq(submitted_mac.as_slice()).into()
    }

    fn mac(&self, session: &str, nonce_b64: &str, issued_at: i64) -> Vec<u8> {
        // Any key length is accepted by HMAC.
        let mut mac = match HmacSha256::new_from_slice(&self.key) {
            Ok(mac) => mac,
            Err(_) => return Vec::new(),
        };
        mac.update(DOMAIN);
        for field in [session.as_bytes(), nonce_b64.as_bytes()] {
            mac.update(&(field.len() as u64).to_be_bytes());
            mac.update(field);
        }
        mac.update(&issued_at.to_be_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}
