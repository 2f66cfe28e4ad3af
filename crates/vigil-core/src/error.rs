//! # Validation Errors
//!
//! The shared validation error hierarchy. Per the engine's error taxonomy,
//! validation errors are rejected at construction/registration time and
//! never reach execution; data-integrity and delivery errors live with the
//! crates that encounter them.

use thiserror::Error;

/// Errors from validating domain-primitive values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Actor identifier was empty or whitespace-only.
    #[error("actor id must be a non-empty string")]
    InvalidActorId,

    /// Billing day outside the supported 1..=28 range.
    ///
    /// Days 29-31 are rejected so every month has the anchor day.
    #[error("billing day must be in 1..=28, got {0}")]
    InvalidBillingDay(u32),

    /// Fiscal-year start month outside 1..=12.
    #[error("fiscal year start month must be in 1..=12, got {0}")]
    InvalidFiscalStartMonth(u32),

    /// A one-time obligation definition is missing its explicit due date.
    #[error("one-time obligation definition requires an explicit due date")]
    MissingOneTimeDueDate,

    /// Penalty rate in basis points exceeds 100% per day.
    #[error("penalty rate must be at most 10000 bps per day, got {0}")]
    InvalidPenaltyRate(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_billing_day_display() {
        let err = ValidationError::InvalidBillingDay(31);
        let msg = format!("{err}");
        assert!(msg.contains("1..=28"));
        assert!(msg.contains("31"));
    }

    #[test]
    fn invalid_actor_id_display() {
        let err = ValidationError::InvalidActorId;
        assert!(format!("{err}").contains("non-empty"));
    }
}
