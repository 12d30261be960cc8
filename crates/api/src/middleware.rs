use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::debug;

use payrun_auth::JwtValidator;

use crate::app::errors::json_error;
use crate::context::UserContext;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Verify the bearer token and attach a [`UserContext`] to the request.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers()).map_err(|message| {
        json_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
    })?;

    let claims = state.jwt.validate(token, Utc::now()).map_err(|e| {
        debug!(error = %e, "rejected bearer token");
        json_error(StatusCode::UNAUTHORIZED, "invalid_token", e.to_string())
    })?;

    req.extensions_mut().insert(UserContext::from_claims(claims));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, &'static str> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or("access token required")?;

    let header = header
        .to_str()
        .map_err(|_| "authorization header is not valid ascii")?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or("authorization header must use the Bearer scheme")?;

    let token = header.trim();
    if token.is_empty() {
        return Err("access token required");
    }

    Ok(token)
}
