//! Employee directory: the employee records payroll runs read and the
//! management routes maintain.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryEmployeeDirectory;
pub use postgres::PostgresEmployeeDirectory;

use std::cmp::Ordering;

use serde::Serialize;
use thiserror::Error;

use payrun_core::EmployeeId;
use payrun_payroll::{Employee, EmployeeStatus, EmployeeUpdate, PayrollFilters};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("employee directory unavailable: {0}")]
    Unavailable(String),
    #[error("employee directory query failed: {0}")]
    Query(String),
    #[error("failed to load employees from {path}: {reason}")]
    Seed { path: String, reason: String },
    #[error("employee with email {0} already exists")]
    DuplicateEmail(String),
}

/// Listing criteria for the management routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeQuery {
    pub department: Option<String>,
    pub status: Option<EmployeeStatus>,
    /// Case-insensitive substring of first name, last name or email.
    pub search: Option<String>,
    /// 1-based.
    pub page: u32,
    pub limit: u32,
}

impl Default for EmployeeQuery {
    fn default() -> Self {
        Self {
            department: None,
            status: None,
            search: None,
            page: 1,
            limit: 10,
        }
    }
}

impl EmployeeQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    pub fn matches(&self, employee: &Employee) -> bool {
        if let Some(department) = &self.department {
            if &employee.department != department {
                return false;
            }
        }
        if let Some(status) = self.status {
            if employee.status != status {
                return false;
            }
        }
        match &self.search {
            Some(term) => {
                let term = term.to_lowercase();
                employee.first_name.to_lowercase().contains(&term)
                    || employee.last_name.to_lowercase().contains(&term)
                    || employee
                        .email
                        .as_deref()
                        .is_some_and(|e| e.to_lowercase().contains(&term))
            }
            None => true,
        }
    }
}

/// One page of a listing plus the size of the whole result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeePage {
    pub employees: Vec<Employee>,
    pub total_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentCount {
    pub department: String,
    pub count: u64,
}

/// Employee records. Emails are unique among records that have one.
pub trait EmployeeDirectory: Send + Sync {
    /// Active employees matching `filters`, in payroll order (see
    /// [`payroll_order`]).
    fn eligible(&self, filters: &PayrollFilters) -> Result<Vec<Employee>, DirectoryError>;

    /// Every status, in payroll order, paginated.
    fn list(&self, query: &EmployeeQuery) -> Result<EmployeePage, DirectoryError>;

    fn get(&self, id: EmployeeId) -> Result<Option<Employee>, DirectoryError>;

    fn create(&self, employee: Employee) -> Result<Employee, DirectoryError>;

    /// Apply a normalized update. `Ok(None)` if the employee does not exist.
    fn update(
        &self,
        id: EmployeeId,
        update: &EmployeeUpdate,
    ) -> Result<Option<Employee>, DirectoryError>;

    /// Soft delete: the record stays, with status `terminated`.
    fn terminate(&self, id: EmployeeId) -> Result<Option<Employee>, DirectoryError> {
        self.update(id, &EmployeeUpdate::status(EmployeeStatus::Terminated))
    }

    /// Head count per department (all statuses), by department name.
    fn department_stats(&self) -> Result<Vec<DepartmentCount>, DirectoryError>;
}

/// Last name, then first name, then id.
pub fn payroll_order(a: &Employee, b: &Employee) -> Ordering {
    a.last_name
        .cmp(&b.last_name)
        .then_with(|| a.first_name.cmp(&b.first_name))
        .then_with(|| a.id.cmp(&b.id))
}
