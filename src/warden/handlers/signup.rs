use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::{
    cookies::require_csrf,
    error::ErrorResponse,
    types::{CredentialsRequest, SignupResponse},
};
use crate::{
    auth::{error::Result, AuthError},
    warden::state::WardenState,
};

#[utoipa::path(
    post,
    path = "/api/signup",
    request_body = CredentialsRequest,
    params(("X-CSRF-Token" = String, Header, description = "Token from /api/csrftoken")),
    responses(
        (status = 201, description = "Principal created", body = SignupResponse),
        (status = 400, description = "Invalid email or password", body = ErrorResponse),
        (status = 403, description = "CSRF token missing or invalid", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn signup(
    headers: HeaderMap,
    state: Extension<Arc<WardenState>>,
    payload: Option<Json<CredentialsRequest>>,
) -> Result<impl IntoResponse> {
    require_csrf(&headers, &state)?;
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("missing payload".to_string()));
    };

    let principal = state
        .authenticator()
        .register(&request.email, &request.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            id: principal.id.to_string(),
            email: principal.identifier,
        }),
    ))
}
