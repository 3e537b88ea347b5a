//! HTTP boundary: maps the auth operations onto cookies, headers and rejection responses.

pub mod handlers;
pub mod openapi;
pub mod state;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug_span, info, warn, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{
    store::{MemoryStore, PgStore},
    AuthConfig, Authenticator,
};

use self::{
    handlers::cookies::CSRF_HEADER_NAME, openapi::ApiDoc, state::WardenState,
};

/// Application routes with their shared state. No middleware besides the state extension.
pub fn router(state: Arc<WardenState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/csrftoken", get(handlers::csrf_token))
        .route("/api/signup", post(handlers::signup))
        .route("/api/login", post(handlers::login))
        .route("/api/refresh", post(handlers::refresh))
        .route("/api/logout", post(handlers::logout))
        .route(
            "/api/user",
            get(handlers::get_user).delete(handlers::delete_user),
        )
        .route("/api/user/password", put(handlers::change_password))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(Extension(state))
}

fn cors(frontend_base_url: Option<&str>) -> Result<CorsLayer> {
    let Some(origin) = frontend_base_url else {
        return Ok(CorsLayer::new()
            .allow_methods([Method::GET])
            .allow_origin(Any));
    };
    let origin = HeaderValue::from_str(origin.trim_end_matches('/'))
        .context("invalid frontend base url")?;
    // Credentialed requests need an explicit origin, never `*`.
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(CSRF_HEADER_NAME),
        ])
        .allow_credentials(true))
}

async fn authenticator(dsn: Option<String>, config: AuthConfig) -> Result<Authenticator> {
    if let Some(dsn) = dsn {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(&dsn)
            .await
            .context("Failed to connect to database")?;
        let store = Arc::new(PgStore::new(pool));
        Authenticator::new(config, store.clone(), store)
    } else {
        warn!("no dsn configured, using the in-memory store");
        let store = Arc::new(MemoryStore::new());
        Authenticator::new(config, store.clone(), store)
    }
}

/// Start the server.
///
/// # Errors
/// Returns an error if the store cannot be reached or the listener fails.
pub async fn new(
    port: u16,
    dsn: Option<String>,
    config: AuthConfig,
    frontend_base_url: Option<String>,
) -> Result<()> {
    let authenticator = authenticator(dsn, config).await?;
    let state = Arc::new(WardenState::new(authenticator));
    let cors = cors(frontend_base_url.as_deref())?;

    let app = router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for shutdown signal: {err}");
                std::future::pending::<()>().await;
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

// Headers are left out of the span: they carry cookies and bearer tokens.
fn make_span(request: &Request<Body>) -> Span {
    let path = request.uri().path();
    let method = request.method().as_str();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", method, path, request_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_accepts_origin() {
        assert!(cors(None).is_ok());
        assert!(cors(Some("https://app.example.com/")).is_ok());
        assert!(cors(Some("bad\norigin")).is_err());
    }
}
