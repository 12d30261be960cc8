//! Deterministic per-employee payroll calculation.
//!
//! All amounts are `i64` minor currency units. Rates are configured as
//! fractions but converted once to parts-per-million, so every deduction is an
//! exact integer computation:
//!
//! ```text
//! component = floor((gross * rate_ppm + 500_000) / 1_000_000)
//! ```
//!
//! which is round-half-up for the non-negative salaries the calculator accepts.
//! Each component is rounded on its own; the total is the sum of the rounded
//! components and net is `gross - total`.
//!
//! Rates may add up to 100%, so independent rounding can push the total one or
//! two units past gross. When that happens the excess is taken back from the
//! 401(k) component first, then health insurance, then tax, which keeps
//! `0 <= net <= gross`.

use serde::{Deserialize, Serialize};

use crate::employee::Employee;
use crate::error::PayrollError;
use crate::period::PayPeriod;
use crate::summary::{Deductions, PayrollCalculationResult};

const PPM: i128 = 1_000_000;

/// Deduction rates applied to gross pay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeductionRates {
    tax_rate: f64,
    health_insurance_rate: f64,
    retirement_401k_rate: f64,
}

impl Default for DeductionRates {
    fn default() -> Self {
        Self {
            tax_rate: 0.10,
            health_insurance_rate: 0.02,
            retirement_401k_rate: 0.05,
        }
    }
}

impl DeductionRates {
    /// Validate and build a rate set. Each rate must lie in `[0, 1]` and the
    /// rates together may not exceed 100% of gross. The total is compared in
    /// parts-per-million, the precision the calculator applies them at.
    pub fn new(
        tax_rate: f64,
        health_insurance_rate: f64,
        retirement_401k_rate: f64,
    ) -> Result<Self, PayrollError> {
        check_rate("tax_rate", tax_rate)?;
        check_rate("health_insurance_rate", health_insurance_rate)?;
        check_rate("retirement_401k_rate", retirement_401k_rate)?;

        let total_ppm = to_ppm(tax_rate) + to_ppm(health_insurance_rate) + to_ppm(retirement_401k_rate);
        if total_ppm > PPM {
            return Err(PayrollError::InvalidRate {
                name: "total",
                value: total_ppm as f64 / PPM as f64,
            });
        }

        Ok(Self {
            tax_rate,
            health_insurance_rate,
            retirement_401k_rate,
        })
    }

    /// Default health/401(k) rates with a custom tax rate.
    pub fn with_tax_rate(tax_rate: f64) -> Result<Self, PayrollError> {
        let defaults = Self::default();
        Self::new(
            tax_rate,
            defaults.health_insurance_rate,
            defaults.retirement_401k_rate,
        )
    }

    pub fn tax_rate(&self) -> f64 {
        self.tax_rate
    }

    pub fn health_insurance_rate(&self) -> f64 {
        self.health_insurance_rate
    }

    pub fn retirement_401k_rate(&self) -> f64 {
        self.retirement_401k_rate
    }
}

fn check_rate(name: &'static str, value: f64) -> Result<(), PayrollError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PayrollError::InvalidRate { name, value })
    }
}

fn to_ppm(rate: f64) -> i128 {
    (rate * PPM as f64).round() as i128
}

fn apply_rate(gross: i64, rate_ppm: i128) -> i64 {
    // gross >= 0 and rate_ppm <= PPM, so the quotient never exceeds gross.
    ((gross as i128 * rate_ppm + PPM / 2) / PPM) as i64
}

/// Pure payroll calculator (no IO, no clock).
#[derive(Debug, Clone, PartialEq)]
pub struct PayrollCalculator {
    rates: DeductionRates,
    currency: String,
}

impl Default for PayrollCalculator {
    fn default() -> Self {
        Self::new(DeductionRates::default(), "USD")
    }
}

impl PayrollCalculator {
    pub fn new(rates: DeductionRates, currency: impl Into<String>) -> Self {
        Self {
            rates,
            currency: currency.into(),
        }
    }

    pub fn rates(&self) -> &DeductionRates {
        &self.rates
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Compute gross/deductions/net for one employee over one pay period.
    pub fn calculate(
        &self,
        employee: &Employee,
        pay_period: &PayPeriod,
    ) -> Result<PayrollCalculationResult, PayrollError> {
        if employee.base_salary < 0 {
            return Err(PayrollError::NegativeSalary(employee.id));
        }
        if employee.first_name.trim().is_empty() || employee.last_name.trim().is_empty() {
            return Err(PayrollError::MalformedEmployee {
                employee_id: employee.id,
                reason: "first and last name are required".to_string(),
            });
        }

        let gross = employee.base_salary;
        let mut tax = apply_rate(gross, to_ppm(self.rates.tax_rate));
        let mut health_insurance = apply_rate(gross, to_ppm(self.rates.health_insurance_rate));
        let mut retirement_401k = apply_rate(gross, to_ppm(self.rates.retirement_401k_rate));

        // i128 so the pre-cap sum cannot overflow for salaries near i64::MAX.
        let raw_total = tax as i128 + health_insurance as i128 + retirement_401k as i128;
        let mut excess = (raw_total - gross as i128).max(0) as i64;
        for component in [&mut retirement_401k, &mut health_insurance, &mut tax] {
            let taken = excess.min(*component);
            *component -= taken;
            excess -= taken;
        }

        let total = tax
            .checked_add(health_insurance)
            .and_then(|t| t.checked_add(retirement_401k))
            .ok_or(PayrollError::Overflow(employee.id))?;
        let net = gross
            .checked_sub(total)
            .ok_or(PayrollError::Overflow(employee.id))?;

        Ok(PayrollCalculationResult {
            employee_id: employee.id,
            employee_name: employee.full_name(),
            pay_period: *pay_period,
            gross_salary: gross,
            deductions: Deductions {
                tax,
                health_insurance,
                retirement_401k,
                total,
            },
            net_salary: net,
            currency: self.currency.clone(),
        })
    }
}
