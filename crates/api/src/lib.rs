//! HTTP API: payroll submission, job status, summaries, and payslip download.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
