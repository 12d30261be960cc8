//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: job queue, stores, and background lanes
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;
use tracing::warn;

use payrun_infra::PayrunConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, Workers};

const DEV_JWT_SECRET: &str = "dev-secret";

/// A ready-to-serve router plus the background lanes feeding it.
pub struct App {
    pub router: Router,
    pub workers: Workers,
}

/// Build the full application from configuration (public entrypoint used by `main.rs`).
pub async fn build_app(config: &PayrunConfig) -> anyhow::Result<App> {
    let jwt_secret = config.jwt_secret.clone().unwrap_or_else(|| {
        warn!("JWT_SECRET not set; using insecure dev default");
        DEV_JWT_SECRET.to_string()
    });

    let (services, workers) = services::build_services(config).await?;

    Ok(App {
        router: router(services, jwt_secret),
        workers,
    })
}

/// Route tree over already-built services.
pub fn router(services: Arc<AppServices>, jwt_secret: String) -> Router {
    let jwt = Arc::new(payrun_auth::Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: require a verified bearer token.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
