//! Payslip delivery notifications (the `send_payslip` lane).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use payrun_payroll::PayPeriod;

use crate::jobs::{Job, JobHandle, JobPayload, JobResult};

/// "Your payslip is ready" message for one employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayslipNotification {
    pub to: String,
    pub employee_name: String,
    pub payslip_reference: String,
    pub pay_period: PayPeriod,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MailError {
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("mail transport error: {0}")]
    Transport(String),
}

/// Delivers payslip notifications.
pub trait PayslipMailer: Send + Sync {
    fn send(&self, notification: &PayslipNotification) -> Result<(), MailError>;
}

/// Mailer that records deliveries in the log instead of sending mail.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

impl PayslipMailer for LogMailer {
    fn send(&self, notification: &PayslipNotification) -> Result<(), MailError> {
        if !notification.to.contains('@') {
            return Err(MailError::InvalidRecipient(notification.to.clone()));
        }
        info!(
            to = %notification.to,
            employee = %notification.employee_name,
            payslip = %notification.payslip_reference,
            pay_period = %notification.pay_period,
            "payslip notification delivered"
        );
        Ok(())
    }
}

/// Job handler for `SendPayslip` jobs.
pub struct NotificationHandler<M: PayslipMailer> {
    mailer: M,
}

impl<M: PayslipMailer> NotificationHandler<M> {
    pub fn new(mailer: M) -> Self {
        Self { mailer }
    }

    pub fn handle(&self, job: &Job, handle: &JobHandle<'_>) -> JobResult {
        let JobPayload::SendPayslip(notification) = &job.payload else {
            return JobResult::Failure(format!("unexpected payload for {} lane", job.kind));
        };

        match self.mailer.send(notification) {
            Ok(()) => {
                handle.progress(100);
                JobResult::Success(serde_json::json!({
                    "delivered_to": notification.to,
                    "payslip_reference": notification.payslip_reference,
                }))
            }
            Err(e) => JobResult::Failure(e.to_string()),
        }
    }
}
