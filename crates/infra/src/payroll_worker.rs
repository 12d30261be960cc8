//! The `payroll_run` lane: turns one payroll job into payslips, a summary,
//! and optional notification jobs.
//!
//! A run moves through `claimed -> iterating -> summarizing -> done`, or to
//! `errored` on a run-level failure. Per-employee failures are contained: the
//! employee is recorded as skipped and the run continues.
//!
//! Every attempt starts from scratch. Nothing durable is written until the
//! summary, and payslips overwrite by name, so a retried run never
//! double-counts. Notification jobs are enqueued only after the summary is
//! saved, so a crashed attempt enqueues none.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use payrun_payroll::{
    Employee, PayPeriod, PayrollCalculationResult, PayrollCalculator, PayrollError, PayrollJobRequest,
    PayrollSummary, SkippedEmployee, format_minor_units,
};

use crate::employees::{DirectoryError, EmployeeDirectory};
use crate::jobs::{Job, JobHandle, JobKind, JobOptions, JobPayload, JobResult, RetryPolicy};
use crate::notifications::PayslipNotification;
use crate::payslips::PayslipGenerator;
use crate::summaries::{SummaryStore, SummaryStoreError};

#[derive(Debug, Error)]
pub enum PayrollRunError {
    #[error("unexpected payload for payroll lane: {0}")]
    WrongPayload(JobKind),
    #[error("no eligible employees found for pay period {0}")]
    NoEmployees(PayPeriod),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Totals(#[from] PayrollError),
    #[error("failed to save payroll summary: {0}")]
    Summary(#[from] SummaryStoreError),
    #[error("failed to encode payroll result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result stored on a completed payroll job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollAck {
    pub payroll_id: String,
    pub employees_processed: usize,
    pub employees_skipped: usize,
    pub total_gross: i64,
    pub total_net: i64,
    pub total_gross_formatted: String,
    pub total_net_formatted: String,
    pub currency: String,
    pub payslips_generated: usize,
    pub notifications_queued: usize,
    pub summary_file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Claimed,
    Iterating,
    Summarizing,
    Done,
    Errored,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunPhase::Claimed => "claimed",
            RunPhase::Iterating => "iterating",
            RunPhase::Summarizing => "summarizing",
            RunPhase::Done => "done",
            RunPhase::Errored => "errored",
        })
    }
}

/// Percent done after `processed` of `total` employees, rounded half up.
fn progress_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((processed * 200 + total) / (total * 2)).min(100) as u8
}

pub struct PayrollWorker {
    directory: Arc<dyn EmployeeDirectory>,
    calculator: PayrollCalculator,
    payslips: Arc<dyn PayslipGenerator>,
    summaries: Arc<dyn SummaryStore>,
    notification_retry: RetryPolicy,
}

impl PayrollWorker {
    pub fn new(
        directory: Arc<dyn EmployeeDirectory>,
        calculator: PayrollCalculator,
        payslips: Arc<dyn PayslipGenerator>,
        summaries: Arc<dyn SummaryStore>,
    ) -> Self {
        Self {
            directory,
            calculator,
            payslips,
            summaries,
            notification_retry: RetryPolicy::send_payslip(),
        }
    }

    pub fn with_notification_retry(mut self, retry: RetryPolicy) -> Self {
        self.notification_retry = retry;
        self
    }

    /// Executor entry point.
    pub fn handle(&self, job: &Job, handle: &JobHandle<'_>) -> JobResult {
        match self
            .process(job, handle)
            .and_then(|ack| Ok(serde_json::to_value(ack)?))
        {
            Ok(value) => JobResult::Success(value),
            Err(e) => {
                error!(job_id = %job.id, phase = %RunPhase::Errored, error = %e, "payroll run failed");
                JobResult::Failure(e.to_string())
            }
        }
    }

    /// Run one attempt of a payroll job.
    pub fn process(&self, job: &Job, handle: &JobHandle<'_>) -> Result<PayrollAck, PayrollRunError> {
        let JobPayload::PayrollRun(request) = &job.payload else {
            return Err(PayrollRunError::WrongPayload(job.kind));
        };

        info!(
            job_id = %job.id,
            phase = %RunPhase::Claimed,
            attempt = job.current_attempt(),
            pay_period = %request.pay_period,
            "processing payroll"
        );

        let employees = self.directory.eligible(&request.filters)?;
        if employees.is_empty() {
            return Err(PayrollRunError::NoEmployees(request.pay_period));
        }

        let total = employees.len();
        debug!(job_id = %job.id, phase = %RunPhase::Iterating, employees = total, "employees loaded");

        let mut results: Vec<PayrollCalculationResult> = Vec::with_capacity(total);
        let mut payslip_files = Vec::new();
        let mut skipped = Vec::new();
        let mut notifications = Vec::new();

        for (i, employee) in employees.iter().enumerate() {
            match self.pay_employee(request, employee) {
                Ok((result, payslip)) => {
                    if let Some(reference) = payslip {
                        if request.options.send_emails {
                            match &employee.email {
                                Some(to) => notifications.push(PayslipNotification {
                                    to: to.clone(),
                                    employee_name: result.employee_name.clone(),
                                    payslip_reference: reference.clone(),
                                    pay_period: request.pay_period,
                                }),
                                None => debug!(
                                    job_id = %job.id,
                                    employee_id = %employee.id,
                                    "employee has no email; notification skipped"
                                ),
                            }
                        }
                        payslip_files.push(reference);
                    }
                    results.push(result);
                }
                Err(reason) => {
                    warn!(
                        job_id = %job.id,
                        employee_id = %employee.id,
                        error = %reason,
                        "employee skipped"
                    );
                    skipped.push(SkippedEmployee {
                        employee_id: employee.id,
                        reason,
                    });
                }
            }

            handle.progress(progress_percent(i + 1, total));
        }

        debug!(job_id = %job.id, phase = %RunPhase::Summarizing, "building summary");

        let summary = PayrollSummary::build(
            job.id.as_uuid(),
            request.pay_period,
            self.calculator.currency(),
            request.filters.clone(),
            request.options,
            results,
            payslip_files,
            skipped,
        )?;
        let summary_file = self.summaries.save(&summary)?;

        let notifications_queued = self.enqueue_notifications(job, handle, notifications);

        let ack = PayrollAck {
            payroll_id: summary.id.clone(),
            employees_processed: summary.total_employees,
            employees_skipped: summary.skipped.len(),
            total_gross: summary.total_gross,
            total_net: summary.total_net,
            total_gross_formatted: format_minor_units(summary.total_gross, &summary.currency),
            total_net_formatted: format_minor_units(summary.total_net, &summary.currency),
            currency: summary.currency.clone(),
            payslips_generated: summary.payslip_files.len(),
            notifications_queued,
            summary_file,
        };

        info!(
            job_id = %job.id,
            phase = %RunPhase::Done,
            payroll_id = %ack.payroll_id,
            processed = ack.employees_processed,
            skipped = ack.employees_skipped,
            total_net = %ack.total_net_formatted,
            "payroll completed"
        );

        Ok(ack)
    }

    /// Calculate and (unless disabled) render one employee's payslip.
    /// Returns the result and the payslip reference, or the skip reason.
    fn pay_employee(
        &self,
        request: &PayrollJobRequest,
        employee: &Employee,
    ) -> Result<(PayrollCalculationResult, Option<String>), String> {
        let result = self
            .calculator
            .calculate(employee, &request.pay_period)
            .map_err(|e| e.to_string())?;

        if request.options.skip_payslips {
            return Ok((result, None));
        }

        let artifact = self.payslips.generate(&result).map_err(|e| e.to_string())?;
        Ok((result, Some(artifact.file_reference)))
    }

    fn enqueue_notifications(
        &self,
        job: &Job,
        handle: &JobHandle<'_>,
        notifications: Vec<PayslipNotification>,
    ) -> usize {
        let mut queued = 0;
        for notification in notifications {
            let to = notification.to.clone();
            match handle.store().enqueue(
                JobPayload::SendPayslip(notification),
                JobOptions::with_retry(self.notification_retry.clone()),
            ) {
                Ok(_) => queued += 1,
                Err(e) => warn!(job_id = %job.id, to = %to, error = %e, "failed to queue payslip notification"),
            }
        }
        queued
    }
}
