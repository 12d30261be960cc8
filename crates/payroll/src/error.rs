use thiserror::Error;

use payrun_core::EmployeeId;

/// Payroll domain errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PayrollError {
    #[error("invalid pay period: start date {start} must be before end date {end}")]
    InvalidPeriod { start: String, end: String },

    #[error("employee {0} has a negative base salary")]
    NegativeSalary(EmployeeId),

    #[error("employee {employee_id} record is malformed: {reason}")]
    MalformedEmployee {
        employee_id: EmployeeId,
        reason: String,
    },

    #[error("invalid deduction rate '{name}': {value}")]
    InvalidRate { name: &'static str, value: f64 },

    #[error("amount overflow while computing payroll for employee {0}")]
    Overflow(EmployeeId),

    #[error("run totals overflow: {field} exceeds the representable amount")]
    TotalsOverflow { field: &'static str },

    #[error("invalid employee field '{field}': {reason}")]
    InvalidEmployee { field: &'static str, reason: String },
}
