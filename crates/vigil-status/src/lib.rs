//! # vigil-status — State Aggregator
//!
//! Computes the answer to "is this entity compliant right now" from an
//! obligation snapshot. The computation is pure: the same snapshot and
//! clock always produce byte-identical output, so the façade can re-run
//! it after any mutating event (including duplicate webhook deliveries)
//! without drift.
//!
//! ## Aggregation rules
//!
//! Per instance: `overdue` if past due and not completed, `at_risk` if
//! due within the risk window, else `on_track`. Per domain: RED if any
//! instance is overdue or its workflow run is stalled, AMBER if any is at
//! risk, else GREEN. Per entity: the worst domain state, with the next
//! required action tie-broken by earliest due date, then domain priority,
//! then instance id.
//!
//! ## Failure semantics
//!
//! An instance whose definition is missing is a data-integrity error: it
//! is excluded from the calculation and logged at `warn`, never silently
//! treated as compliant — and never allowed to crash aggregation.

pub mod aggregate;

// Re-export primary types.
pub use aggregate::{
    classify_instance, compute_entity_state, AggregationInput, DomainBreakdown,
    EntityComplianceState, InstanceRisk, NextAction, RiskConfig,
};
