//! Endpoints for the authenticated principal.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use super::{
    cookies::{access_token, clear_token_cookies, cookie, require_csrf, ACCESS_COOKIE_NAME},
    error::ErrorResponse,
    types::{ChangePasswordRequest, DeleteAccountRequest, MessageResponse, UserResponse},
};
use crate::{
    auth::{error::Result, AuthError, Claims},
    warden::state::WardenState,
};

async fn authorized(headers: &HeaderMap, state: &WardenState) -> Result<Claims> {
    let token = access_token(headers).ok_or(AuthError::InvalidCredentials)?;
    state.authenticator().authorize(&token).await
}

fn principal_id(claims: &Claims) -> Result<Uuid> {
    Uuid::parse_str(&claims.sub).map_err(|_| AuthError::Malformed)
}

#[utoipa::path(
    get,
    path = "/api/user",
    responses(
        (status = 200, description = "Current principal; the access cookie is renewed", body = UserResponse),
        (status = 401, description = "Missing, expired, invalid or revoked access token", body = ErrorResponse),
    ),
    security(("bearer" = []), ("cookie" = [])),
    tag = "user"
)]
#[instrument(skip_all)]
pub async fn get_user(
    headers: HeaderMap,
    state: Extension<Arc<WardenState>>,
) -> Result<impl IntoResponse> {
    let claims = authorized(&headers, &state).await?;

    // Sliding expiry for cookie clients.
    let renewed = state.authenticator().reissue(&claims)?;
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        SET_COOKIE,
        cookie(
            state.config(),
            ACCESS_COOKIE_NAME,
            &renewed.token,
            state.config().access_ttl_seconds(),
        )?,
    );

    Ok((
        response_headers,
        Json(UserResponse {
            id: claims.sub,
            email: claims.email,
            roles: claims.roles,
        }),
    ))
}

#[utoipa::path(
    put,
    path = "/api/user/password",
    request_body = ChangePasswordRequest,
    params(("X-CSRF-Token" = String, Header, description = "Token from /api/csrftoken")),
    responses(
        (status = 200, description = "Password changed; every session was revoked", body = MessageResponse),
        (status = 400, description = "New password rejected", body = ErrorResponse),
        (status = 401, description = "Not authenticated or wrong current password", body = ErrorResponse),
        (status = 403, description = "CSRF token missing or invalid", body = ErrorResponse),
    ),
    security(("bearer" = []), ("cookie" = [])),
    tag = "user"
)]
#[instrument(skip_all)]
pub async fn change_password(
    headers: HeaderMap,
    state: Extension<Arc<WardenState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Result<impl IntoResponse> {
    require_csrf(&headers, &state)?;
    let claims = authorized(&headers, &state).await?;
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("missing payload".to_string()));
    };

    state
        .authenticator()
        .change_secret(
            principal_id(&claims)?,
            &request.current_password,
            &request.new_password,
        )
        .await?;

    let mut response_headers = HeaderMap::new();
    clear_token_cookies(&mut response_headers, state.config())?;
    Ok((
        response_headers,
        Json(MessageResponse::new("Password changed. Please log in again.")),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/user",
    request_body = DeleteAccountRequest,
    params(("X-CSRF-Token" = String, Header, description = "Token from /api/csrftoken")),
    responses(
        (status = 200, description = "Account deleted", body = MessageResponse),
        (status = 401, description = "Not authenticated or wrong password", body = ErrorResponse),
        (status = 403, description = "CSRF token missing or invalid", body = ErrorResponse),
    ),
    security(("bearer" = []), ("cookie" = [])),
    tag = "user"
)]
#[instrument(skip_all)]
pub async fn delete_user(
    headers: HeaderMap,
    state: Extension<Arc<WardenState>>,
    payload: Option<Json<DeleteAccountRequest>>,
) -> Result<impl IntoResponse> {
    require_csrf(&headers, &state)?;
    let claims = authorized(&headers, &state).await?;
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("missing payload".to_string()));
    };

    state
        .authenticator()
        .delete_account(principal_id(&claims)?, &request.password)
        .await?;

    let mut response_headers = HeaderMap::new();
    clear_token_cookies(&mut response_headers, state.config())?;
    Ok((
        response_headers,
        Json(MessageResponse::new("Account deleted.")),
    ))
}
