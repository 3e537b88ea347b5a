use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::handlers::{self, cookies::ACCESS_COOKIE_NAME};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::csrf::csrf_token,
        handlers::signup::signup,
        handlers::session::login,
        handlers::session::refresh,
        handlers::session::logout,
        handlers::user::get_user,
        handlers::user::change_password,
        handlers::user::delete_user,
    ),
    components(schemas(
        handlers::health::Health,
        handlers::error::ErrorResponse,
        handlers::types::CredentialsRequest,
        handlers::types::ChangePasswordRequest,
        handlers::types::DeleteAccountRequest,
        handlers::types::CsrfTokenResponse,
        handlers::types::SignupResponse,
        handlers::types::MessageResponse,
        handlers::types::UserResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Service health"),
        (name = "auth", description = "Signup, login, token refresh and logout"),
        (name = "user", description = "Authenticated principal"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "cookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(ACCESS_COOKIE_NAME))),
        );
    }
}
