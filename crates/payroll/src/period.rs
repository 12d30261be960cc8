//! Pay period value object.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::PayrollError;

/// The date range a payroll run covers.
///
/// Invariant: `start_date < end_date`. Deserialization goes through the same
/// check, so a `PayPeriod` value is always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PayPeriod {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl PayPeriod {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, PayrollError> {
        if start_date >= end_date {
            return Err(PayrollError::InvalidPeriod {
                start: start_date.to_string(),
                end: end_date.to_string(),
            });
        }
        Ok(Self {
            start_date,
            end_date,
        })
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// `<start>_<end>` in ISO format; used in artifact file names.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.start_date, self.end_date)
    }
}

impl core::fmt::Display for PayPeriod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} to {}", self.start_date, self.end_date)
    }
}

#[derive(Deserialize)]
struct RawPayPeriod {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl<'de> Deserialize<'de> for PayPeriod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawPayPeriod::deserialize(deserializer)?;
        PayPeriod::new(raw.start_date, raw.end_date).map_err(serde::de::Error::custom)
    }
}
