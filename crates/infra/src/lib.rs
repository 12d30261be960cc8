//! Infrastructure layer: job queue, payroll worker, artifact storage,
//! employee directory, and configuration.

pub mod config;
pub mod employees;
pub mod jobs;
pub mod notifications;
pub mod payroll_worker;
pub mod payslips;
pub mod summaries;

pub use config::{ConfigError, PayrunConfig};
pub use payroll_worker::{PayrollAck, PayrollRunError, PayrollWorker};
