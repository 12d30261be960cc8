use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
    Router,
};

use payrun_infra::payslips::{content_type, is_safe_file_name};

use crate::app::{errors, services::AppServices};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new().route("/:file_name", get(download_payslip))
}

/// GET /payslips/:file_name
///
/// Serves a generated payslip. Only bare file names inside the payslips
/// directory are accepted.
pub async fn download_payslip(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(file_name): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::authorize_payroll(&user) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    if !is_safe_file_name(&file_name) {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_file_name",
            "payslip file name must not contain path components",
        );
    }

    match services.payslips.read(&file_name) {
        Ok(Some(bytes)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type(&file_name))],
            bytes,
        )
            .into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "Payslip not found"),
        Err(e) => errors::payslip_error_to_response(e),
    }
}
