//! Cookie and header plumbing shared by the handlers.

use anyhow::{Context, Result};
use axum::http::{
    header::{AUTHORIZATION, COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};

use crate::auth::{AuthConfig, AuthError};
use crate::warden::state::WardenState;

pub const ACCESS_COOKIE_NAME: &str = "access_token";
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";
pub const CSRF_COOKIE_NAME: &str = "warden_csrf";
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";

/// Build an `HttpOnly` cookie.
pub fn cookie(config: &AuthConfig, name: &str, value: &str, max_age: i64) -> Result<HeaderValue> {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).with_context(|| format!("invalid {name} cookie value"))
}

pub fn clear_cookie(config: &AuthConfig, name: &str) -> Result<HeaderValue> {
    cookie(config, name, "", 0)
}

/// Append `Set-Cookie` headers for a fresh access/refresh pair.
pub fn set_token_cookies(
    headers: &mut HeaderMap,
    config: &AuthConfig,
    access_token: &str,
    refresh_token: &str,
) -> Result<()> {
    headers.append(
        SET_COOKIE,
        cookie(
            config,
            ACCESS_COOKIE_NAME,
            access_token,
            config.access_ttl_seconds(),
        )?,
    );
    headers.append(
        SET_COOKIE,
        cookie(
            config,
            REFRESH_COOKIE_NAME,
            refresh_token,
            config.refresh_ttl_seconds(),
        )?,
    );
    Ok(())
}

/// Append `Set-Cookie` headers that expire both token cookies.
pub fn clear_token_cookies(headers: &mut HeaderMap, config: &AuthConfig) -> Result<()> {
    headers.append(SET_COOKIE, clear_cookie(config, ACCESS_COOKIE_NAME)?);
    headers.append(SET_COOKIE, clear_cookie(config, REFRESH_COOKIE_NAME)?);
    Ok(())
}

pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Access token from the `Authorization` header, falling back to the cookie.
pub fn access_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| read_cookie(headers, ACCESS_COOKIE_NAME))
}

/// Check the `X-CSRF-Token` header against the CSRF session cookie.
///
/// # Errors
/// `CsrfMismatch` when either value is missing or the token does not verify.
pub fn require_csrf(headers: &HeaderMap, state: &WardenState) -> Result<(), AuthError> {
    let session = read_cookie(headers, CSRF_COOKIE_NAME).unwrap_or_default();
    let submitted = headers
        .get(CSRF_HEADER_NAME)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if state.csrf().verify(&session, submitted) {
        Ok(())
    } else {
        Err(AuthError::CsrfMismatch)
    }
}
