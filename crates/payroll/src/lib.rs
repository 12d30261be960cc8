//! Payroll module (pay periods, employees, calculation, run summaries).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod calculator;
pub mod employee;
pub mod error;
pub mod money;
pub mod period;
pub mod request;
pub mod summary;

pub use calculator::{DeductionRates, PayrollCalculator};
pub use employee::{Employee, EmployeeStatus, EmployeeUpdate, NewEmployee};
pub use error::PayrollError;
pub use money::format_minor_units;
pub use period::PayPeriod;
pub use request::{PayrollFilters, PayrollJobRequest, PayrollOptions, Requester};
pub use summary::{
    Deductions, PayrollCalculationResult, PayrollOverview, PayrollSummary, SkippedEmployee,
};
