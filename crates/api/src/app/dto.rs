use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use payrun_infra::employees::EmployeeQuery;
use payrun_infra::jobs::{Job, JobId, JobKind, JobPayload, JobState};
use payrun_infra::notifications::PayslipNotification;
use payrun_payroll::{EmployeeStatus, PayPeriod, PayrollFilters, PayrollJobRequest, PayrollOptions};

// -------------------------
// Request DTOs
// -------------------------

/// Raw dates as submitted; validated by [`RunPayrollRequest::pay_period`].
#[derive(Debug, Default, Deserialize)]
pub struct PayPeriodInput {
    #[serde(default, alias = "startDate")]
    pub start_date: Option<String>,
    #[serde(default, alias = "endDate")]
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPayrollRequest {
    #[serde(default, alias = "pay_period")]
    pub pay_period: Option<PayPeriodInput>,
    #[serde(default)]
    pub filters: PayrollFilters,
    #[serde(default)]
    pub options: PayrollOptions,
    #[serde(default)]
    pub force: bool,
}

impl RunPayrollRequest {
    /// The validated pay period, or a message suitable for a 400 response.
    pub fn pay_period(&self) -> Result<PayPeriod, String> {
        let input = self
            .pay_period
            .as_ref()
            .ok_or_else(|| "payPeriod is required".to_string())?;

        let start = parse_date(input.start_date.as_deref())
            .ok_or_else(|| "Valid start date is required".to_string())?;
        let end = parse_date(input.end_date.as_deref())
            .ok_or_else(|| "Valid end date is required".to_string())?;

        PayPeriod::new(start, end).map_err(|_| "Start date must be before end date".to_string())
    }
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw?.trim(), "%Y-%m-%d").ok()
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<usize>,
}

pub const EMPLOYEE_PAGE_LIMIT: u32 = 100;

/// `GET /employees` query string.
#[derive(Debug, Default, Deserialize)]
pub struct ListEmployeesQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub department: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
}

impl ListEmployeesQuery {
    /// The validated directory query, or a message suitable for a 400 response.
    pub fn to_query(&self) -> Result<EmployeeQuery, &'static str> {
        let defaults = EmployeeQuery::default();

        let page = self.page.unwrap_or(defaults.page);
        if page < 1 {
            return Err("Page must be a positive integer");
        }
        let limit = self.limit.unwrap_or(defaults.limit);
        if !(1..=EMPLOYEE_PAGE_LIMIT).contains(&limit) {
            return Err("Limit must be between 1 and 100");
        }

        let department = match self.department.as_deref() {
            Some(d) if d.is_empty() => return Err("Department cannot be empty"),
            other => other.map(str::to_string),
        };
        let status = match self.status.as_deref() {
            Some(raw) => Some(EmployeeStatus::parse(raw).ok_or("Invalid status")?),
            None => None,
        };
        let search = match self.search.as_deref() {
            Some(s) if s.is_empty() => return Err("Search term cannot be empty"),
            other => other.map(str::to_string),
        };

        Ok(EmployeeQuery {
            department,
            status,
            search,
            page,
            limit,
        })
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaginationView {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_count: u64,
    pub limit: u32,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl PaginationView {
    pub fn new(query: &EmployeeQuery, total_count: u64) -> Self {
        let total_pages = total_count.div_ceil(u64::from(query.limit.max(1)));
        Self {
            current_page: query.page,
            total_pages,
            total_count,
            limit: query.limit,
            has_next_page: u64::from(query.page) < total_pages,
            has_prev_page: query.page > 1,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJobView<'a> {
    pub id: JobId,
    pub status: &'static str,
    pub pay_period: &'a PayPeriod,
    pub filters: &'a PayrollFilters,
    pub options: &'a PayrollOptions,
    pub queue_position: Option<usize>,
}

/// The payload a job was enqueued with, without the kind tag.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum JobData<'a> {
    PayrollRun(&'a PayrollJobRequest),
    SendPayslip(&'a PayslipNotification),
}

impl<'a> From<&'a JobPayload> for JobData<'a> {
    fn from(payload: &'a JobPayload) -> Self {
        match payload {
            JobPayload::PayrollRun(request) => JobData::PayrollRun(request),
            JobPayload::SendPayslip(notification) => JobData::SendPayslip(notification),
        }
    }
}

/// Polling view of a job. `result` is only present once completed and
/// `failure_reason` only once failed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView<'a> {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobState,
    pub progress: u8,
    pub data: JobData<'a>,
    pub result: Option<&'a serde_json::Value>,
    pub failure_reason: Option<&'a str>,
    pub last_error: Option<&'a str>,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub queue_position: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub retry_at: Option<DateTime<Utc>>,
}

impl<'a> JobStatusView<'a> {
    pub fn new(job: &'a Job, queue_position: Option<usize>) -> Self {
        let completed = job.state == JobState::Completed;
        let failed = job.state == JobState::Failed;
        Self {
            id: job.id,
            kind: job.kind,
            status: job.state,
            progress: job.progress,
            data: JobData::from(&job.payload),
            result: job.result.as_ref().filter(|_| completed),
            failure_reason: job.failure_reason.as_deref().filter(|_| failed),
            last_error: job.last_error.as_deref(),
            attempts_made: job.attempts_made,
            max_attempts: job.retry.max_attempts,
            queue_position,
            created_at: job.created_at,
            processed_at: job.processed_at,
            finished_at: job.finished_at,
            retry_at: job.run_at.filter(|_| job.state == JobState::Delayed),
        }
    }
}
