use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use payrun_infra::jobs::JobId;
use payrun_payroll::PayrollJobRequest;

use crate::app::dto::{JobStatusView, ListJobsQuery, QueuedJobView, RunPayrollRequest};
use crate::app::errors;
use crate::app::services::{AppServices, LIST_LIMIT, SubmitError};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_payrolls))
        .route("/run", post(run_payroll))
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id/status", get(job_status))
        .route("/:id", get(get_payroll))
}

/// POST /payrolls/run
///
/// Queue a payroll run for a pay period. Responds `202` with the queued job;
/// a pending job for the same period is reported as `400` unless `force` is set.
pub async fn run_payroll(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    body: Result<Json<RunPayrollRequest>, JsonRejection>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::authorize_payroll(&user) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text());
        }
    };

    let pay_period = match body.pay_period() {
        Ok(period) => period,
        Err(message) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", message),
    };

    let request = PayrollJobRequest::new(pay_period, body.filters, body.options, user.requester());
    let (filters, options) = (request.filters.clone(), request.options);

    let queued = match services.payrolls.submit(request, body.force) {
        Ok(queued) => queued,
        Err(SubmitError::Duplicate { existing }) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "duplicate_job",
                    "message": "Payroll job already exists for this period; use force=true to create anyway",
                    "existingJobId": existing,
                })),
            )
                .into_response();
        }
        Err(SubmitError::Store(e)) => return errors::job_store_error_to_response(e),
    };

    let job = QueuedJobView {
        id: queued.job.id,
        status: "queued",
        pay_period: &pay_period,
        filters: &filters,
        options: &options,
        queue_position: queued.queue_position,
    };

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Payroll job queued successfully",
            "job": job,
        })),
    )
        .into_response()
}

/// GET /payrolls/jobs?limit=N
///
/// Most recent payroll jobs, newest first (at most 50).
pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Query(query): Query<ListJobsQuery>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::authorize_payroll(&user) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let limit = query.limit.unwrap_or(LIST_LIMIT).clamp(1, LIST_LIMIT);
    let jobs = match services.payrolls.recent(limit) {
        Ok(jobs) => jobs,
        Err(e) => return errors::job_store_error_to_response(e),
    };

    let total = jobs.len();
    let views: Vec<JobStatusView<'_>> = jobs.iter().map(|job| JobStatusView::new(job, None)).collect();
    Json(json!({
        "jobs": views,
        "total": total,
    }))
    .into_response()
}

/// GET /payrolls/jobs/:id/status
pub async fn job_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::authorize_payroll(&user) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let id: JobId = match id.parse() {
        Ok(id) => id,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid job id"),
    };

    let job = match services.payrolls.status(id) {
        Ok(Some(job)) => job,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "Job not found"),
        Err(e) => return errors::job_store_error_to_response(e),
    };

    let queue_position = if job.state.is_pending() {
        match services.payrolls.position(id) {
            Ok(position) => position,
            Err(e) => return errors::job_store_error_to_response(e),
        }
    } else {
        None
    };

    Json(json!({ "job": JobStatusView::new(&job, queue_position) })).into_response()
}

/// GET /payrolls
///
/// Run summaries without their per-employee items, newest first.
pub async fn list_payrolls(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::authorize_payroll(&user) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.summaries.list(LIST_LIMIT) {
        Ok(payrolls) => Json(json!({
            "total": payrolls.len(),
            "payrolls": &payrolls,
        }))
        .into_response(),
        Err(e) => errors::summary_error_to_response(e),
    }
}

/// GET /payrolls/:id
pub async fn get_payroll(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::authorize_payroll(&user) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.summaries.get(&id) {
        Ok(Some(payroll)) => Json(json!({ "payroll": payroll })).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "Payroll not found"),
        Err(e) => errors::summary_error_to_response(e),
    }
}
