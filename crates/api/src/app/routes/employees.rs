use std::sync::Arc;

use axum::{
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;

use payrun_core::EmployeeId;
use payrun_payroll::{EmployeeUpdate, NewEmployee};

use crate::app::dto::{ListEmployeesQuery, PaginationView};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz::{self, EMPLOYEE_ADMIN_ROLES, EMPLOYEE_EDIT_ROLES, EMPLOYEE_TERMINATE_ROLES};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_employees).post(create_employee))
        .route("/stats/departments", get(department_stats))
        .route(
            "/:id",
            get(get_employee).put(update_employee).delete(delete_employee),
        )
}

fn forbidden(e: payrun_auth::AuthzError) -> axum::response::Response {
    errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string())
}

fn parse_id(raw: &str) -> Result<EmployeeId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid employee id"))
}

fn not_found() -> axum::response::Response {
    errors::json_error(StatusCode::NOT_FOUND, "not_found", "Employee not found")
}

/// GET /employees?page&limit&department&status&search
///
/// Any authenticated user.
pub async fn list_employees(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<ListEmployeesQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(raw) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text());
        }
    };

    let query = match raw.to_query() {
        Ok(query) => query,
        Err(message) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", message),
    };

    let page = match services.employees.list(query.clone()).await {
        Ok(page) => page,
        Err(e) => return errors::directory_error_to_response(e),
    };

    Json(json!({
        "employees": page.employees,
        "pagination": PaginationView::new(&query, page.total_count),
        "filters": {
            "department": query.department,
            "status": query.status,
            "search": query.search,
        },
    }))
    .into_response()
}

/// GET /employees/:id
pub async fn get_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match services.employees.get(id).await {
        Ok(Some(employee)) => Json(json!({ "employee": employee })).into_response(),
        Ok(None) => not_found(),
        Err(e) => errors::directory_error_to_response(e),
    }
}

/// POST /employees (admin, hr)
pub async fn create_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    body: Result<Json<NewEmployee>, JsonRejection>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&user, EMPLOYEE_ADMIN_ROLES) {
        return forbidden(e);
    }

    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text());
        }
    };

    let employee = match body.into_employee() {
        Ok(employee) => employee,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
    };

    match services.employees.create(employee).await {
        Ok(employee) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Employee created successfully",
                "employee": employee,
            })),
        )
            .into_response(),
        Err(e) => errors::directory_error_to_response(e),
    }
}

/// PUT /employees/:id (admin, hr, manager)
///
/// Partial update: fields left out of the body keep their value.
pub async fn update_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
    body: Result<Json<EmployeeUpdate>, JsonRejection>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&user, EMPLOYEE_EDIT_ROLES) {
        return forbidden(e);
    }

    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text());
        }
    };

    let update = match body.normalized() {
        Ok(update) => update,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
    };

    match services.employees.update(id, update).await {
        Ok(Some(employee)) => Json(json!({
            "message": "Employee updated successfully",
            "employee": employee,
        }))
        .into_response(),
        Ok(None) => not_found(),
        Err(e) => errors::directory_error_to_response(e),
    }
}

/// DELETE /employees/:id (admin)
///
/// Soft delete: the record is kept with status `terminated`.
pub async fn delete_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&user, EMPLOYEE_TERMINATE_ROLES) {
        return forbidden(e);
    }

    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match services.employees.terminate(id).await {
        Ok(Some(employee)) => Json(json!({
            "message": "Employee deleted successfully (status set to terminated)",
            "employee": employee,
        }))
        .into_response(),
        Ok(None) => not_found(),
        Err(e) => errors::directory_error_to_response(e),
    }
}

/// GET /employees/stats/departments (admin, hr)
pub async fn department_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
) -> axum::response::Response {
    if let Err(e) = authz::authorize(&user, EMPLOYEE_ADMIN_ROLES) {
        return forbidden(e);
    }

    match services.employees.department_stats().await {
        Ok(stats) => Json(json!({ "departmentStats": stats })).into_response(),
        Err(e) => errors::directory_error_to_response(e),
    }
}
