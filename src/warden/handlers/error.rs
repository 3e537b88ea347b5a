//! Rejection responses for [`AuthError`].

use axum::{
    http::{
        header::{RETRY_AFTER, WWW_AUTHENTICATE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::auth::AuthError;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    /// Machine-readable code, e.g. `invalid_credentials`.
    pub error: String,
    pub message: String,
}

#[must_use]
pub fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidCredentials
        | AuthError::TokenExpired
        | AuthError::InvalidSignature
        | AuthError::Malformed
        | AuthError::RefreshReused
        | AuthError::SessionRevoked => StatusCode::UNAUTHORIZED,
        AuthError::AccountLocked { .. } => StatusCode::LOCKED,
        AuthError::CsrfMismatch => StatusCode::FORBIDDEN,
        AuthError::Conflict => StatusCode::CONFLICT,
        AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let message = match &self {
            Self::Internal(err) => {
                error!("request failed: {err:#}");
                "Internal server error".to_string()
            }
            other => {
                debug!(code = other.code(), "request rejected");
                other.to_string()
            }
        };
        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
        });

        let mut response = (status, body).into_response();
        match &self {
            Self::AccountLocked {
                retry_after_seconds,
            } => {
                if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                    response.headers_mut().insert(RETRY_AFTER, value);
                }
            }
            _ if status == StatusCode::UNAUTHORIZED => {
                response
                    .headers_mut()
                    .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            _ => {}
        }
        response
    }
}
