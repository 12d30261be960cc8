//! Employee record as seen by the payroll pipeline.

use serde::{Deserialize, Serialize};

use payrun_core::EmployeeId;

use crate::error::PayrollError;

/// Employment status. Only `Active` employees are paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeStatus {
    #[default]
    Active,
    Inactive,
    Terminated,
    OnLeave,
}

impl EmployeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeStatus::Active => "active",
            EmployeeStatus::Inactive => "inactive",
            EmployeeStatus::Terminated => "terminated",
            EmployeeStatus::OnLeave => "on_leave",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(EmployeeStatus::Active),
            "inactive" => Some(EmployeeStatus::Inactive),
            "terminated" => Some(EmployeeStatus::Terminated),
            "on_leave" => Some(EmployeeStatus::OnLeave),
            _ => None,
        }
    }
}

/// An employee record loaded from the employee directory.
///
/// Records are not validated on load: the calculator rejects malformed ones
/// (negative salary, blank name) so a single bad row only skips that employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub department: String,
    #[serde(default)]
    pub job_title: String,
    /// Base salary per pay period, in minor currency units.
    pub base_salary: i64,
    #[serde(default)]
    pub status: EmployeeStatus,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }

    pub fn is_active(&self) -> bool {
        self.status == EmployeeStatus::Active
    }
}

const MAX_NAME_LEN: usize = 50;
const MAX_LABEL_LEN: usize = 100;

/// A new employee as submitted for creation. Text fields are trimmed and the
/// email lowercased before validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewEmployee {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub department: String,
    pub job_title: String,
    /// Minor currency units.
    pub base_salary: i64,
    #[serde(default)]
    pub status: Option<EmployeeStatus>,
}

impl NewEmployee {
    /// Validate and assign a fresh id.
    pub fn into_employee(self) -> Result<Employee, PayrollError> {
        let employee = Employee {
            id: EmployeeId::new(),
            first_name: text("first_name", &self.first_name, MAX_NAME_LEN)?,
            last_name: text("last_name", &self.last_name, MAX_NAME_LEN)?,
            email: Some(email(&self.email)?),
            department: text("department", &self.department, MAX_LABEL_LEN)?,
            job_title: text("job_title", &self.job_title, MAX_LABEL_LEN)?,
            base_salary: salary(self.base_salary)?,
            status: self.status.unwrap_or_default(),
        };
        Ok(employee)
    }
}

/// Partial update of an employee record. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EmployeeUpdate {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub base_salary: Option<i64>,
    #[serde(default)]
    pub status: Option<EmployeeStatus>,
}

impl EmployeeUpdate {
    /// Only a status change; used for soft deletes.
    pub fn status(status: EmployeeStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Validate and normalize every present field.
    pub fn normalized(self) -> Result<Self, PayrollError> {
        Ok(Self {
            first_name: self
                .first_name
                .map(|v| text("first_name", &v, MAX_NAME_LEN))
                .transpose()?,
            last_name: self
                .last_name
                .map(|v| text("last_name", &v, MAX_NAME_LEN))
                .transpose()?,
            email: self.email.map(|v| email(&v)).transpose()?,
            department: self
                .department
                .map(|v| text("department", &v, MAX_LABEL_LEN))
                .transpose()?,
            job_title: self
                .job_title
                .map(|v| text("job_title", &v, MAX_LABEL_LEN))
                .transpose()?,
            base_salary: self.base_salary.map(salary).transpose()?,
            status: self.status,
        })
    }

    /// The normalized email this update would set, if any.
    pub fn new_email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Apply to `employee`. Expects an update that went through [`normalized`](Self::normalized).
    pub fn apply(&self, employee: &mut Employee) {
        if let Some(v) = &self.first_name {
            employee.first_name = v.clone();
        }
        if let Some(v) = &self.last_name {
            employee.last_name = v.clone();
        }
        if let Some(v) = &self.email {
            employee.email = Some(v.clone());
        }
        if let Some(v) = &self.department {
            employee.department = v.clone();
        }
        if let Some(v) = &self.job_title {
            employee.job_title = v.clone();
        }
        if let Some(v) = self.base_salary {
            employee.base_salary = v;
        }
        if let Some(v) = self.status {
            employee.status = v;
        }
    }
}

fn text(field: &'static str, value: &str, max: usize) -> Result<String, PayrollError> {
    let value = value.trim();
    let len = value.chars().count();
    if len == 0 || len > max {
        return Err(PayrollError::InvalidEmployee {
            field,
            reason: format!("must be 1-{max} characters"),
        });
    }
    Ok(value.to_string())
}

fn email(value: &str) -> Result<String, PayrollError> {
    let value = value.trim().to_lowercase();
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(value)
    } else {
        Err(PayrollError::InvalidEmployee {
            field: "email",
            reason: "valid email is required".to_string(),
        })
    }
}

fn salary(value: i64) -> Result<i64, PayrollError> {
    if value < 0 {
        return Err(PayrollError::InvalidEmployee {
            field: "base_salary",
            reason: "must not be negative".to_string(),
        });
    }
    Ok(value)
}
