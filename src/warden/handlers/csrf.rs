use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap},
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::instrument;

use super::{
    cookies::{cookie, read_cookie, CSRF_COOKIE_NAME},
    types::CsrfTokenResponse,
};
use crate::{
    auth::{error::Result, utils::generate_opaque_token},
    warden::state::WardenState,
};

#[utoipa::path(
    get,
    path = "/api/csrftoken",
    responses(
        (status = 200, description = "CSRF token bound to the caller's CSRF session cookie", body = CsrfTokenResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn csrf_token(
    headers: HeaderMap,
    state: Extension<Arc<WardenState>>,
) -> Result<impl IntoResponse> {
    let session = match read_cookie(&headers, CSRF_COOKIE_NAME) {
        Some(session) => session,
        None => generate_opaque_token()?,
    };

    // Re-sent every time so the cookie outlives the token handed out with it.
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        SET_COOKIE,
        cookie(
            state.config(),
            CSRF_COOKIE_NAME,
            &session,
            state.config().csrf_ttl_seconds(),
        )?,
    );

    let token = state.csrf().issue(&session);
    Ok((
        response_headers,
        Json(CsrfTokenResponse {
            csrf_token: token.as_str().to_string(),
        }),
    ))
}
