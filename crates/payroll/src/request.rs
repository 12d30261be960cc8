//! The immutable description of a payroll run, as enqueued.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use payrun_core::{EmployeeId, UserId};

use crate::employee::Employee;
use crate::period::PayPeriod;

/// Narrows the set of employees a run covers. Empty filters select every
/// active employee.
///
/// A blank department or an empty id list is no filter at all; both are
/// normalized to `None` on the way in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollFilters {
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub department: Option<String>,
    #[serde(
        default,
        alias = "employeeIds",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub employee_ids: Option<BTreeSet<EmployeeId>>,
}

impl PayrollFilters {
    pub fn new(department: Option<String>, employee_ids: Option<BTreeSet<EmployeeId>>) -> Self {
        Self {
            department: department.filter(|d| !d.trim().is_empty()),
            employee_ids: employee_ids.filter(|ids| !ids.is_empty()),
        }
    }

    /// The id restriction, if any. An empty set restricts nothing.
    pub fn employee_ids(&self) -> Option<&BTreeSet<EmployeeId>> {
        self.employee_ids.as_ref().filter(|ids| !ids.is_empty())
    }

    pub fn department(&self) -> Option<&str> {
        self.department.as_deref().filter(|d| !d.trim().is_empty())
    }

    /// Whether `employee` is eligible for a run with these filters.
    pub fn matches(&self, employee: &Employee) -> bool {
        if !employee.is_active() {
            return false;
        }
        if let Some(department) = self.department() {
            if employee.department != department {
                return false;
            }
        }
        match self.employee_ids() {
            Some(ids) => ids.contains(&employee.id),
            None => true,
        }
    }
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let department = Option::<String>::deserialize(deserializer)?;
    Ok(department.filter(|d| !d.trim().is_empty()))
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<BTreeSet<EmployeeId>>, D::Error>
where
    D: Deserializer<'de>,
{
    let ids = Option::<BTreeSet<EmployeeId>>::deserialize(deserializer)?;
    Ok(ids.filter(|ids| !ids.is_empty()))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollOptions {
    #[serde(default, alias = "sendEmails")]
    pub send_emails: bool,
    #[serde(default, alias = "skipPayslips")]
    pub skip_payslips: bool,
}

/// Who asked for the run (copied from the verified token).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: UserId,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollJobRequest {
    pub pay_period: PayPeriod,
    #[serde(default)]
    pub filters: PayrollFilters,
    #[serde(default)]
    pub options: PayrollOptions,
    pub requested_by: Requester,
    pub requested_at: DateTime<Utc>,
}

impl PayrollJobRequest {
    pub fn new(
        pay_period: PayPeriod,
        filters: PayrollFilters,
        options: PayrollOptions,
        requested_by: Requester,
    ) -> Self {
        Self {
            pay_period,
            filters,
            options,
            requested_by,
            requested_at: Utc::now(),
        }
    }
}
