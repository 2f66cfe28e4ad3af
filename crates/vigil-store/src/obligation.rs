//! # Obligation Definitions & Instances
//!
//! An [`ObligationDefinition`] is the template for a recurring duty
//! ("monthly GST return"); an [`ObligationInstance`] is one occurrence of
//! it for one entity and one period. Definitions are immutable once
//! referenced — a change mints a new definition id — and instances carry
//! an append-only status history.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use vigil_core::{
    ComplianceDomain, DefinitionId, EntityId, InstanceId, PenaltyFormula, Period, Periodicity,
    RunId, ValidationError,
};

use crate::store::StoreError;

// ---------------------------------------------------------------------------
// ObligationDefinition
// ---------------------------------------------------------------------------

/// Template for a recurring duty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObligationDefinition {
    pub id: DefinitionId,
    pub domain: ComplianceDomain,
    /// Human-readable duty name, e.g. "GSTR-3B monthly return".
    pub title: String,
    pub periodicity: Periodicity,
    /// Days allotted to complete the fulfilment workflow once started.
    pub base_sla_days: u32,
    pub penalty: PenaltyFormula,
    /// Explicit due date, required iff `periodicity` is one-time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_time_due: Option<NaiveDate>,
    /// Inactive definitions are skipped by the scheduler but keep their
    /// historical instances.
    pub active: bool,
    pub version: u32,
}

impl ObligationDefinition {
    /// Validate internal consistency before registration.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a one-time definition without a
    /// due date or an out-of-range penalty rate.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.periodicity == Periodicity::OneTime && self.one_time_due.is_none() {
            return Err(ValidationError::MissingOneTimeDueDate);
        }
        self.penalty.validate()
    }
}

// ---------------------------------------------------------------------------
// ObligationStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of one obligation instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationStatus {
    /// Created by the scheduler, not yet worked on.
    Pending,
    /// A workflow run is discharging it.
    InProgress,
    /// Fully discharged. Terminal.
    Completed,
    /// Past due and not completed. Still actionable.
    Overdue,
    /// Explicitly cancelled by an authorized actor. Terminal.
    Cancelled,
}

impl ObligationStatus {
    /// Terminal statuses supersede the instance; they never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Open instances participate in state aggregation and scheduling.
    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for ObligationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Overdue => write!(f, "overdue"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Validate a status transition against the obligation state machine.
///
/// ```text
/// pending ──────► in_progress ──────► completed
///    │    ╲            │  ▲
///    │     ╲           ▼  │
///    │      ╲──────► overdue ───────► completed
///    │                 │
///    ▼                 ▼
/// cancelled        cancelled
/// ```
///
/// Terminal statuses reject every outgoing transition. Self-transitions
/// are rejected so duplicate webhooks cannot append duplicate history.
///
/// # Errors
///
/// Returns [`StoreError::InvalidStatusTransition`] for any edge not in the
/// machine.
pub fn validate_status_transition(
    from: ObligationStatus,
    to: ObligationStatus,
) -> Result<(), StoreError> {
    use ObligationStatus::*;
    let allowed = matches!(
        (from, to),
        (Pending, InProgress)
            | (Pending, Overdue)
            | (Pending, Cancelled)
            | (InProgress, Completed)
            | (InProgress, Overdue)
            | (InProgress, Cancelled)
            | (Overdue, InProgress)
            | (Overdue, Completed)
            | (Overdue, Cancelled)
    );
    if allowed {
        Ok(())
    } else {
        Err(StoreError::InvalidStatusTransition { from, to })
    }
}

// ---------------------------------------------------------------------------
// ObligationInstance
// ---------------------------------------------------------------------------

/// One append-only status transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: ObligationStatus,
    pub to: ObligationStatus,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One concrete occurrence of a definition for one entity and one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObligationInstance {
    pub id: InstanceId,
    pub definition_id: DefinitionId,
    pub entity_id: EntityId,
    /// Denormalized from the definition so aggregation can group by domain
    /// without a definition lookup.
    pub domain: ComplianceDomain,
    pub period: Period,
    pub due_date: NaiveDate,
    pub status: ObligationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_run_id: Option<RunId>,
    /// Penalty accrued so far, in minor currency units.
    pub accrued_penalty_minor: i64,
    pub transitions: Vec<StatusTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ObligationInstance {
    /// Create a pending instance for a definition/entity/period.
    pub fn new(
        definition: &ObligationDefinition,
        entity_id: EntityId,
        period: Period,
        due_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InstanceId::new(),
            definition_id: definition.id,
            entity_id,
            domain: definition.domain,
            period,
            due_date,
            status: ObligationStatus::Pending,
            workflow_run_id: None,
            accrued_penalty_minor: 0,
            transitions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> ObligationDefinition {
        ObligationDefinition {
            id: DefinitionId::new(),
            domain: ComplianceDomain::TaxGst,
            title: "GSTR-3B monthly return".into(),
            periodicity: Periodicity::Monthly,
            base_sla_days: 5,
            penalty: PenaltyFormula::FlatPerDay {
                amount_minor: 5_000,
                cap_minor: None,
            },
            one_time_due: None,
            active: true,
            version: 1,
        }
    }

    #[test]
    fn valid_lifecycle_path() {
        use ObligationStatus::*;
        for (from, to) in [
            (Pending, InProgress),
            (InProgress, Overdue),
            (Overdue, InProgress),
            (InProgress, Completed),
        ] {
            assert!(validate_status_transition(from, to).is_ok(), "{from}->{to}");
        }
    }

    #[test]
    fn terminal_statuses_reject_all_transitions() {
        use ObligationStatus::*;
        for to in [Pending, InProgress, Completed, Overdue, Cancelled] {
            assert!(validate_status_transition(Completed, to).is_err());
            assert!(validate_status_transition(Cancelled, to).is_err());
        }
    }

    #[test]
    fn self_transition_rejected() {
        use ObligationStatus::*;
        for s in [Pending, InProgress, Overdue] {
            assert!(validate_status_transition(s, s).is_err());
        }
    }

    #[test]
    fn pending_cannot_jump_to_completed() {
        // Completion only happens through a workflow run, which implies
        // in_progress first.
        assert!(validate_status_transition(
            ObligationStatus::Pending,
            ObligationStatus::Completed
        )
        .is_err());
    }

    #[test]
    fn one_time_definition_requires_due_date() {
        let mut def = definition();
        def.periodicity = Periodicity::OneTime;
        def.one_time_due = None;
        assert_eq!(def.validate(), Err(ValidationError::MissingOneTimeDueDate));
    }

    #[test]
    fn new_instance_is_pending_with_empty_history() {
        let def = definition();
        let inst = ObligationInstance::new(
            &def,
            EntityId::new(),
            Period::Month {
                year: 2026,
                month: 7,
            },
            NaiveDate::from_ymd_opt(2026, 8, 20).unwrap(),
            Utc::now(),
        );
        assert_eq!(inst.status, ObligationStatus::Pending);
        assert_eq!(inst.domain, ComplianceDomain::TaxGst);
        assert!(inst.transitions.is_empty());
        assert_eq!(inst.accrued_penalty_minor, 0);
    }
}
