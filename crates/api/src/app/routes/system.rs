use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::app::{errors, services::AppServices};
use crate::context::UserContext;

/// Liveness plus payroll queue counts; `503` when the broker does not answer.
pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.payrolls.queue_health() {
        Ok(counts) => Json(json!({
            "status": "ok",
            "queue": counts,
        }))
        .into_response(),
        Err(e) => errors::json_error(StatusCode::SERVICE_UNAVAILABLE, "queue_unavailable", e.to_string()),
    }
}

pub async fn whoami(Extension(user): Extension<UserContext>) -> impl IntoResponse {
    Json(json!({
        "userId": user.user_id().to_string(),
        "email": user.email(),
        "role": user.role().as_str(),
    }))
}
