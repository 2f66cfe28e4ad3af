//! # Fiscal Periods
//!
//! Period arithmetic for recurring obligations. A [`Period`] identifies the
//! span of time an obligation instance covers (the July GST return covers
//! the calendar month of July); the [`FiscalCalendar`] turns a period into
//! a statutory due date.
//!
//! Quarterly and annual periods are fiscal, not calendar: the default
//! calendar starts the fiscal year in April, so FY2026 Q1 is Apr-Jun 2026
//! and FY2026 ends in March 2027.
//!
//! Period keys are stable strings (`"2026-07"`, `"fy2026-q1"`, `"fy2026"`)
//! used by the store's (definition, entity, period) uniqueness index.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Periodicity & FiscalCalendar
// ---------------------------------------------------------------------------

/// How often an obligation recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Periodicity {
    /// A single, non-recurring duty with an explicit due date.
    OneTime,
    /// One instance per calendar month.
    Monthly,
    /// One instance per fiscal quarter.
    Quarterly,
    /// One instance per fiscal year.
    Annual,
}

/// Fiscal-calendar configuration used to derive due dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalCalendar {
    /// Day-of-month a period's filing falls due, anchored in the month
    /// after the period ends. Restricted to 1..=28 so it exists in every
    /// month.
    pub billing_day: u32,
    /// Calendar month (1..=12) the fiscal year starts in.
    pub fiscal_start_month: u32,
}

impl FiscalCalendar {
    /// Create a calendar, validating the billing day and start month.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidBillingDay`] or
    /// [`ValidationError::InvalidFiscalStartMonth`].
    pub fn new(billing_day: u32, fiscal_start_month: u32) -> Result<Self, ValidationError> {
        if !(1..=28).contains(&billing_day) {
            return Err(ValidationError::InvalidBillingDay(billing_day));
        }
        if !(1..=12).contains(&fiscal_start_month) {
            return Err(ValidationError::InvalidFiscalStartMonth(fiscal_start_month));
        }
        Ok(Self {
            billing_day,
            fiscal_start_month,
        })
    }
}

impl Default for FiscalCalendar {
    /// Due on the 20th of the following month, April fiscal-year start.
    fn default() -> Self {
        Self {
            billing_day: 20,
            fiscal_start_month: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------------

/// The span of time one obligation instance covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Period {
    /// The single period of a one-time obligation.
    OneTime,
    /// A calendar month.
    Month { year: i32, month: u32 },
    /// A fiscal quarter. `fiscal_year` is the calendar year the fiscal
    /// year starts in; `quarter` is 1..=4.
    Quarter { fiscal_year: i32, quarter: u32 },
    /// A fiscal year.
    Year { fiscal_year: i32 },
}

/// Add a (possibly negative) month delta to a (year, month) pair.
fn add_months(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let zero_based = year * 12 + (month as i32 - 1) + delta;
    (zero_based.div_euclid(12), (zero_based.rem_euclid(12) + 1) as u32)
}

impl Period {
    /// The period containing `date` for the given periodicity.
    pub fn containing(periodicity: Periodicity, date: NaiveDate, cal: &FiscalCalendar) -> Self {
        match periodicity {
            Periodicity::OneTime => Self::OneTime,
            Periodicity::Monthly => Self::Month {
                year: date.year(),
                month: date.month(),
            },
            Periodicity::Quarterly => {
                let offset = (date.month() as i32 - cal.fiscal_start_month as i32).rem_euclid(12);
                let fiscal_year = if date.month() >= cal.fiscal_start_month {
                    date.year()
                } else {
                    date.year() - 1
                };
                Self::Quarter {
                    fiscal_year,
                    quarter: (offset / 3 + 1) as u32,
                }
            }
            Periodicity::Annual => {
                let fiscal_year = if date.month() >= cal.fiscal_start_month {
                    date.year()
                } else {
                    date.year() - 1
                };
                Self::Year { fiscal_year }
            }
        }
    }

    /// The next period boundary after this one. One-time periods have no
    /// successor and return `None`.
    pub fn next(&self) -> Option<Self> {
        match *self {
            Self::OneTime => None,
            Self::Month { year, month } => {
                let (y, m) = add_months(year, month, 1);
                Some(Self::Month { year: y, month: m })
            }
            Self::Quarter {
                fiscal_year,
                quarter,
            } => Some(if quarter >= 4 {
                Self::Quarter {
                    fiscal_year: fiscal_year + 1,
                    quarter: 1,
                }
            } else {
                Self::Quarter {
                    fiscal_year,
                    quarter: quarter + 1,
                }
            }),
            Self::Year { fiscal_year } => Some(Self::Year {
                fiscal_year: fiscal_year + 1,
            }),
        }
    }

    /// Statutory due date: the calendar's billing day in the month after
    /// the period ends. One-time periods carry their due date on the
    /// definition instead and return `None` here.
    pub fn due_date(&self, cal: &FiscalCalendar) -> Option<NaiveDate> {
        let (year, month) = match *self {
            Self::OneTime => return None,
            Self::Month { year, month } => add_months(year, month, 1),
            Self::Quarter {
                fiscal_year,
                quarter,
            } => {
                // Quarter ends 3*quarter months into the fiscal year; due
                // the month after.
                add_months(fiscal_year, cal.fiscal_start_month, (3 * quarter) as i32)
            }
            Self::Year { fiscal_year } => {
                add_months(fiscal_year, cal.fiscal_start_month, 12)
            }
        };
        NaiveDate::from_ymd_opt(year, month, cal.billing_day)
    }

    /// Stable string key for the store's uniqueness index.
    pub fn key(&self) -> String {
        match *self {
            Self::OneTime => "one_time".to_string(),
            Self::Month { year, month } => format!("{year:04}-{month:02}"),
            Self::Quarter {
                fiscal_year,
                quarter,
            } => format!("fy{fiscal_year:04}-q{quarter}"),
            Self::Year { fiscal_year } => format!("fy{fiscal_year:04}"),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
