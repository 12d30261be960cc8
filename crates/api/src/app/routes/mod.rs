use axum::{routing::get, Router};

pub mod employees;
pub mod payrolls;
pub mod payslips;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/employees", employees::router())
        .nest("/payrolls", payrolls::router())
        .nest("/payslips", payslips::router())
}
