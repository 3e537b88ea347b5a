//! HS256 access tokens.
//!
//! Compact JWS (`header.claims.signature`, base64url without padding). Only
//! `HS256` is accepted; anything else, including `none`, is `Malformed`.
//! Expiry is checked before the signature so a stale token always reports
//! `TokenExpired`.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use ulid::Ulid;

use super::error::{AuthError, Result};

type HmacSha256 = Hmac<Sha256>;

const ALG: &str = "HS256";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: ALG.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub sid: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    #[must_use]
    pub fn new(
        sub: impl Into<String>,
        email: impl Into<String>,
        roles: Vec<String>,
        sid: impl Into<String>,
        now: i64,
        ttl_seconds: i64,
    ) -> Self {
        Self {
            sub: sub.into(),
            email: email.into(),
            roles,
            sid: sid.into(),
            jti: Ulid::new().to_string(),
            iat: now,
            exp: now + ttl_seconds,
        }
    }
}

/// A signed access token and the instant it stops being valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: i64,
}

fn mac(key: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key)
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("invalid signing key: {e}")))
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("failed to encode token: {e}")))?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T> {
    let bytes = Base64UrlUnpadded::decode_vec(segment).map_err(|_| AuthError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::Malformed)
}

/// Sign claims into a compact HS256 token.
///
/// # Errors
/// Returns `AuthError::Internal` if the claims cannot be encoded.
pub fn sign(key: &[u8], claims: &Claims) -> Result<AccessToken> {
    let header_b64 = b64e_json(&TokenHeader::hs256())?;
    let claims_b64 = b64e_json(claims)?;
    let signing_input = format!("{header_b64}.{claims_b64}");

    let mut mac = mac(key)?;
    mac.update(signing_input.as_bytes());
    let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

    Ok(AccessToken {
        token: format!("{signing_input}.{signature_b64}"),
        expires_at: claims.exp,
    })
}

/// Verify a compact HS256 token at `now_unix_seconds` and return its claims.
///
/// # Errors
///
/// - `Malformed` if the token is not three base64url JSON segments or uses another algorithm,
/// - `TokenExpired` if `exp <= now`,
/// - `InvalidSignature` if the MAC does not match.
pub fn verify(key: &[u8], token: &str, now_unix_seconds: i64) -> Result<Claims> {
    let mut parts = token.trim().split('.');
    let header_b64 = parts.next().ok_or(AuthError::Malformed)?;
    let claims_b64 = parts.next().ok_or(AuthError::Malformed)?;
    let signature_b64 = parts.next().ok_or(AuthError::Malformed)?;
    if parts.next().is_some() {
        return Err(AuthError::Malformed);
    }

    let header: TokenHeader = b64d_json(header_b64)?;
    if header.alg != ALG {
        return Err(AuthError::Malformed);
    }

    let claims: Claims = b64d_json(claims_b64)?;
    if claims.exp <= now_unix_seconds {
        return Err(AuthError::TokenExpired);
    }

    let signature =
        Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| AuthError::InvalidSignature)?;
    let mut mac = mac(key)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(claims_b64.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| AuthError::InvalidSignature)?;

    Ok(claims)
}
