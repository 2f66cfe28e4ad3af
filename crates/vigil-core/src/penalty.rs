//! # Penalty Formulas
//!
//! Per-day-late penalty formulas in integer minor currency units (paise).
//! Floating point is never used for money; percentage rates are basis
//! points applied with integer arithmetic.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// How a late obligation accrues penalties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PenaltyFormula {
    /// No statutory penalty for this obligation.
    None,
    /// A flat amount per day late, optionally capped.
    FlatPerDay {
        amount_minor: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        cap_minor: Option<i64>,
    },
    /// A percentage of a basis amount per day late, in basis points,
    /// optionally capped. 100 bps = 1% per day.
    PercentPerDay {
        basis_minor: i64,
        rate_bps: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        cap_minor: Option<i64>,
    },
}

impl PenaltyFormula {
    /// Validate rate bounds. Flat formulas are always valid.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPenaltyRate`] for a percentage
    /// rate above 10000 bps (100% per day).
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Self::PercentPerDay { rate_bps, .. } = self {
            if *rate_bps > 10_000 {
                return Err(ValidationError::InvalidPenaltyRate(*rate_bps));
            }
        }
        Ok(())
    }

    /// Total penalty accrued after `days_late` days, in minor units.
    ///
    /// Non-positive `days_late` accrues nothing. Caps clamp the total,
    /// never the per-day increment.
    pub fn accrued(&self, days_late: i64) -> i64 {
        if days_late <= 0 {
            return 0;
        }
        let raw = match *self {
            Self::None => 0,
            Self::FlatPerDay { amount_minor, .. } => amount_minor.saturating_mul(days_late),
            Self::PercentPerDay {
                basis_minor,
                rate_bps,
                ..
            } => basis_minor
                .saturating_mul(rate_bps as i64)
                .saturating_mul(days_late)
                / 10_000,
        };
        match self.cap() {
            Some(cap) => raw.min(cap),
            None => raw,
        }
    }

    fn cap(&self) -> Option<i64> {
        match *self {
            Self::None => None,
            Self::FlatPerDay { cap_minor, .. } | Self::PercentPerDay { cap_minor, .. } => cap_minor,
        }
    }
}
