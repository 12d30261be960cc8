use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use payrun_infra::employees::DirectoryError;
use payrun_infra::jobs::JobStoreError;
use payrun_infra::payslips::PayslipError;
use payrun_infra::summaries::SummaryStoreError;

pub fn job_store_error_to_response(err: JobStoreError) -> axum::response::Response {
    match err {
        JobStoreError::NotFound(id) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("job {id} not found"))
        }
        JobStoreError::Unavailable(msg) => {
            error!(error = %msg, "job queue unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "queue_unavailable", msg)
        }
        other => {
            error!(error = %other, "job queue error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "queue_error", other.to_string())
        }
    }
}

pub fn directory_error_to_response(err: DirectoryError) -> axum::response::Response {
    match err {
        DirectoryError::DuplicateEmail(_) => json_error(
            StatusCode::BAD_REQUEST,
            "duplicate_email",
            "Employee with this email already exists",
        ),
        DirectoryError::Unavailable(msg) => {
            error!(error = %msg, "employee directory unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "directory_unavailable", msg)
        }
        other => {
            error!(error = %other, "employee directory error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "directory_error", other.to_string())
        }
    }
}

pub fn summary_error_to_response(err: SummaryStoreError) -> axum::response::Response {
    error!(error = %err, "summary store error");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "summary_store_error", err.to_string())
}

pub fn payslip_error_to_response(err: PayslipError) -> axum::response::Response {
    match err {
        PayslipError::InvalidFileName(name) => json_error(
            StatusCode::BAD_REQUEST,
            "invalid_file_name",
            format!("invalid payslip file name: {name}"),
        ),
        other => {
            error!(error = %other, "payslip read failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "payslip_error", other.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
