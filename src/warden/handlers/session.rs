//! Login, refresh and logout. Tokens travel as `HttpOnly` cookies.

use axum::{
    extract::Extension,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{error, instrument};

use super::{
    cookies::{
        access_token, clear_token_cookies, read_cookie, require_csrf, set_token_cookies,
        REFRESH_COOKIE_NAME,
    },
    error::ErrorResponse,
    types::{CredentialsRequest, MessageResponse},
};
use crate::{
    auth::{error::Result, AuthError},
    warden::state::WardenState,
};

#[utoipa::path(
    post,
    path = "/api/login",
    request_body = CredentialsRequest,
    params(("X-CSRF-Token" = String, Header, description = "Token from /api/csrftoken")),
    responses(
        (status = 200, description = "Access and refresh cookies set", body = MessageResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "CSRF token missing or invalid", body = ErrorResponse),
        (status = 423, description = "Too many failed attempts", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    headers: HeaderMap,
    state: Extension<Arc<WardenState>>,
    payload: Option<Json<CredentialsRequest>>,
) -> Result<impl IntoResponse> {
    require_csrf(&headers, &state)?;
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("missing payload".to_string()));
    };

    let pair = state
        .authenticator()
        .authenticate(&request.email, &request.password)
        .await?;

    let mut response_headers = HeaderMap::new();
    set_token_cookies(
        &mut response_headers,
        state.config(),
        &pair.access_token,
        &pair.refresh_token,
    )?;
    Ok((
        response_headers,
        Json(MessageResponse::new("Logged in successfully.")),
    ))
}

#[utoipa::path(
    post,
    path = "/api/refresh",
    params(("X-CSRF-Token" = String, Header, description = "Token from /api/csrftoken")),
    responses(
        (status = 200, description = "Tokens rotated, cookies replaced", body = MessageResponse),
        (status = 401, description = "Refresh token unknown, expired, reused or revoked", body = ErrorResponse),
        (status = 403, description = "CSRF token missing or invalid", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn refresh(
    headers: HeaderMap,
    state: Extension<Arc<WardenState>>,
) -> Result<impl IntoResponse> {
    require_csrf(&headers, &state)?;
    let refresh_token =
        read_cookie(&headers, REFRESH_COOKIE_NAME).ok_or(AuthError::InvalidCredentials)?;

    let pair = state.authenticator().refresh(&refresh_token).await?;

    let mut response_headers = HeaderMap::new();
    set_token_cookies(
        &mut response_headers,
        state.config(),
        &pair.access_token,
        &pair.refresh_token,
    )?;
    Ok((
        response_headers,
        Json(MessageResponse::new("Token refreshed.")),
    ))
}

#[utoipa::path(
    post,
    path = "/api/logout",
    params(("X-CSRF-Token" = String, Header, description = "Token from /api/csrftoken")),
    responses(
        (status = 200, description = "Session revoked and cookies cleared", body = MessageResponse),
        (status = 403, description = "CSRF token missing or invalid", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout(
    headers: HeaderMap,
    state: Extension<Arc<WardenState>>,
) -> Result<impl IntoResponse> {
    require_csrf(&headers, &state)?;
    let authenticator = state.authenticator();

    // Without a valid access token the refresh cookie still identifies the session.
    let revoked = match access_token(&headers).map(|token| authenticator.validate(&token)) {
        Some(Ok(claims)) => authenticator.logout(&claims.sid).await,
        _ => match read_cookie(&headers, REFRESH_COOKIE_NAME) {
            Some(refresh_token) => authenticator.revoke_refresh(&refresh_token).await,
            None => Ok(()),
        },
    };
    if let Err(err) = revoked {
        error!("Failed to revoke session: {err}");
    }

    // Always clear the cookies, even if there was nothing to revoke.
    let mut response_headers = HeaderMap::new();
    clear_token_cookies(&mut response_headers, state.config())?;
    Ok((
        response_headers,
        Json(MessageResponse::new("Logged out successfully.")),
    ))
}
