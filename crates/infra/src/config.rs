//! Process configuration read from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `PORT` | `4000` |
//! | `JWT_SECRET` | unset (binary falls back to an insecure dev secret) |
//! | `TAX_RATE` | `0.10` |
//! | `PAYROLL_CURRENCY` | `USD` |
//! | `PAYSLIPS_DIR` | `payslips` |
//! | `PAYROLLS_DIR` | `payrolls` |
//! | `EMPLOYEES_FILE` | unset |
//! | `DATABASE_URL` | unset (in-memory employee directory) |
//! | `REDIS_URL` | unset (in-memory job queue) |
//! | `PAYROLL_JOB_ATTEMPTS` | `3` |
//! | `PAYROLL_BACKOFF_MS` | `2000` |
//! | `NOTIFICATION_CONCURRENCY` | `2` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use payrun_payroll::{DeductionRates, PayrollCalculator};

use crate::jobs::RetryPolicy;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayrunConfig {
    pub port: u16,
    pub jwt_secret: Option<String>,
    pub rates: DeductionRates,
    pub currency: String,
    pub payslips_dir: PathBuf,
    pub payrolls_dir: PathBuf,
    /// JSON seed for the in-memory employee directory
    pub employees_file: Option<PathBuf>,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub payroll_job_attempts: u32,
    pub payroll_backoff: Duration,
    pub notification_concurrency: usize,
}

impl Default for PayrunConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            jwt_secret: None,
            rates: DeductionRates::default(),
            currency: "USD".to_string(),
            payslips_dir: PathBuf::from("payslips"),
            payrolls_dir: PathBuf::from("payrolls"),
            employees_file: None,
            database_url: None,
            redis_url: None,
            payroll_job_attempts: 3,
            payroll_backoff: Duration::from_millis(2000),
            notification_concurrency: 2,
        }
    }
}

impl PayrunConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let tax_rate: Option<f64> = parse(&get, "TAX_RATE")?;
        let rates = match tax_rate {
            Some(rate) => DeductionRates::with_tax_rate(rate).map_err(|e| ConfigError::Invalid {
                key: "TAX_RATE",
                value: rate.to_string(),
                reason: e.to_string(),
            })?,
            None => defaults.rates,
        };

        let payroll_job_attempts = parse(&get, "PAYROLL_JOB_ATTEMPTS")?
            .unwrap_or(defaults.payroll_job_attempts);
        if payroll_job_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "PAYROLL_JOB_ATTEMPTS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            port: parse(&get, "PORT")?.unwrap_or(defaults.port),
            jwt_secret: get("JWT_SECRET"),
            rates,
            currency: get("PAYROLL_CURRENCY")
                .map(|c| c.to_uppercase())
                .unwrap_or(defaults.currency),
            payslips_dir: get("PAYSLIPS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.payslips_dir),
            payrolls_dir: get("PAYROLLS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.payrolls_dir),
            employees_file: get("EMPLOYEES_FILE").map(PathBuf::from),
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            payroll_job_attempts,
            payroll_backoff: parse(&get, "PAYROLL_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.payroll_backoff),
            notification_concurrency: parse::<usize>(&get, "NOTIFICATION_CONCURRENCY")?
                .unwrap_or(defaults.notification_concurrency)
                .max(1),
        })
    }

    pub fn calculator(&self) -> PayrollCalculator {
        PayrollCalculator::new(self.rates, self.currency.clone())
    }

    pub fn payroll_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.payroll_job_attempts,
            base_delay: self.payroll_backoff,
            ..RetryPolicy::payroll_run()
        }
    }

    pub fn notification_retry(&self) -> RetryPolicy {
        RetryPolicy::send_payslip()
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|value| {
            value.parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                value: value.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}
