//! Per-employee results and the aggregate record of a completed run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use payrun_core::EmployeeId;

use crate::error::PayrollError;
use crate::period::PayPeriod;
use crate::request::{PayrollFilters, PayrollOptions};

/// Itemized deductions in minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deductions {
    pub tax: i64,
    pub health_insurance: i64,
    pub retirement_401k: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollCalculationResult {
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub pay_period: PayPeriod,
    pub gross_salary: i64,
    pub deductions: Deductions,
    pub net_salary: i64,
    pub currency: String,
}

/// An employee the run could not pay, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEmployee {
    pub employee_id: EmployeeId,
    pub reason: String,
}

/// Durable record of one payroll run. Built from successful results only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollSummary {
    pub id: String,
    pub job_id: Uuid,
    pub pay_period: PayPeriod,
    pub processed_at: DateTime<Utc>,
    pub total_employees: usize,
    pub total_gross: i64,
    pub total_deductions: i64,
    pub total_net: i64,
    pub currency: String,
    pub filters: PayrollFilters,
    pub options: PayrollOptions,
    pub payroll_items: Vec<PayrollCalculationResult>,
    pub payslip_files: Vec<String>,
    #[serde(default)]
    pub skipped: Vec<SkippedEmployee>,
}

/// Listing view of a summary (no line items).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollOverview {
    pub id: String,
    pub job_id: Uuid,
    pub pay_period: PayPeriod,
    pub processed_at: DateTime<Utc>,
    pub total_employees: usize,
    pub total_gross: i64,
    pub total_deductions: i64,
    pub total_net: i64,
    pub currency: String,
    pub employees_skipped: usize,
}

impl PayrollSummary {
    /// Summary id for a job. Stable across retries of the same job.
    pub fn id_for_job(job_id: Uuid) -> String {
        format!("payroll_{}", job_id.simple())
    }

    /// Aggregate successful results into a summary.
    ///
    /// Each item fits in `i64` on its own, but the run totals may not; an
    /// overflowing total fails the build instead of wrapping.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        job_id: Uuid,
        pay_period: PayPeriod,
        currency: impl Into<String>,
        filters: PayrollFilters,
        options: PayrollOptions,
        payroll_items: Vec<PayrollCalculationResult>,
        payslip_files: Vec<String>,
        skipped: Vec<SkippedEmployee>,
    ) -> Result<Self, PayrollError> {
        let total_gross = checked_total("total_gross", &payroll_items, |r| r.gross_salary)?;
        let total_deductions =
            checked_total("total_deductions", &payroll_items, |r| r.deductions.total)?;
        let total_net = checked_total("total_net", &payroll_items, |r| r.net_salary)?;

        Ok(Self {
            id: Self::id_for_job(job_id),
            job_id,
            pay_period,
            processed_at: Utc::now(),
            total_employees: payroll_items.len(),
            total_gross,
            total_deductions,
            total_net,
            currency: currency.into(),
            filters,
            options,
            payroll_items,
            payslip_files,
            skipped,
        })
    }

    pub fn overview(&self) -> PayrollOverview {
        PayrollOverview {
            id: self.id.clone(),
            job_id: self.job_id,
            pay_period: self.pay_period,
            processed_at: self.processed_at,
            total_employees: self.total_employees,
            total_gross: self.total_gross,
            total_deductions: self.total_deductions,
            total_net: self.total_net,
            currency: self.currency.clone(),
            employees_skipped: self.skipped.len(),
        }
    }
}

fn checked_total(
    field: &'static str,
    items: &[PayrollCalculationResult],
    amount: impl Fn(&PayrollCalculationResult) -> i64,
) -> Result<i64, PayrollError> {
    items
        .iter()
        .try_fold(0i64, |acc, item| acc.checked_add(amount(item)))
        .ok_or(PayrollError::TotalsOverflow { field })
}
