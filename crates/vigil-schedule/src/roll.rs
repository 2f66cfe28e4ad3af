//! # Roll-Forward & Overdue Sweep
//!
//! The scheduled tick's two store-mutating passes. Both are safe to run
//! concurrently and repeatedly: roll-forward rides the store's period
//! uniqueness index, and the sweep only applies transitions the status
//! machine accepts.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use vigil_core::{FiscalCalendar, Period, Periodicity};
use vigil_store::{MemoryObligationStore, ObligationInstance, ObligationStatus, StoreError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Scheduler tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub calendar: FiscalCalendar,
    /// How far ahead (in days) roll-forward materializes instances.
    pub lookahead_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            calendar: FiscalCalendar::default(),
            lookahead_days: 90,
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Stateless driver for the scheduled tick. All persistent state lives in
/// the store; the scheduler itself carries only configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

/// What one overdue sweep changed.
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    /// Instances newly transitioned to `overdue` this sweep.
    pub newly_overdue: Vec<ObligationInstance>,
    /// Instances (new or previously overdue) whose accrued penalty moved.
    pub penalties_updated: usize,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Materialize obligation instances for every active (entity,
    /// definition) pairing whose next due dates fall within the lookahead
    /// window. Returns only the instances created by this call.
    pub fn roll_forward(
        &self,
        store: &MemoryObligationStore,
        now: DateTime<Utc>,
    ) -> Result<Vec<ObligationInstance>, StoreError> {
        let today = now.date_naive();
        let horizon = today + Duration::days(self.config.lookahead_days);
        let mut created = Vec::new();

        for (entity_id, definition_id) in store.active_pairings() {
            let Some(definition) = store.get_definition(&definition_id) else {
                continue;
            };

            if definition.periodicity == Periodicity::OneTime {
                // One-time duties carry their due date on the definition
                // and materialize as soon as it enters the window.
                let Some(due) = definition.one_time_due else {
                    continue;
                };
                if due > horizon {
                    continue;
                }
                let instance =
                    ObligationInstance::new(&definition, entity_id, Period::OneTime, due, now);
                match store.create_instance(instance) {
                    Ok(inst) => created.push(inst),
                    Err(StoreError::DuplicatePeriod { .. }) => {}
                    Err(e) => return Err(e),
                }
                continue;
            }

            // Resume from the last materialized period, or start at the
            // period containing today.
            let mut period = match store.latest_period(definition_id, entity_id) {
                Some(latest) => match latest.next() {
                    Some(next) => next,
                    None => continue,
                },
                None => Period::containing(definition.periodicity, today, &self.config.calendar),
            };

            loop {
                let Some(due) = period.due_date(&self.config.calendar) else {
                    break;
                };
                if due > horizon {
                    break;
                }
                let instance =
                    ObligationInstance::new(&definition, entity_id, period, due, now);
                match store.create_instance(instance) {
                    Ok(inst) => {
                        tracing::debug!(
                            entity = %entity_id,
                            definition = %definition_id,
                            period = %period,
                            due = %due,
                            "materialized obligation instance"
                        );
                        created.push(inst);
                    }
                    // Another tick got here first. Fine.
                    Err(StoreError::DuplicatePeriod { .. }) => {}
                    Err(e) => return Err(e),
                }
                let Some(next) = period.next() else {
                    break;
                };
                period = next;
            }
        }

        if !created.is_empty() {
            tracing::info!(count = created.len(), as_of = %today, "roll-forward created instances");
        }
        Ok(created)
    }

    /// Transition open instances past their due date to `overdue` and
    /// refresh accrued penalties from each definition's formula.
    pub fn sweep_overdue(
        &self,
        store: &MemoryObligationStore,
        now: DateTime<Utc>,
    ) -> Result<SweepOutcome, StoreError> {
        let today = now.date_naive();
        let mut outcome = SweepOutcome::default();

        for instance in store.open_instances() {
            if instance.due_date >= today {
                continue;
            }
            let days_late = (today - instance.due_date).num_days();

            if matches!(
                instance.status,
                ObligationStatus::Pending | ObligationStatus::InProgress
            ) {
                let transitioned = store.transition_status(
                    instance.id,
                    ObligationStatus::Overdue,
                    Some(format!("due {} passed", instance.due_date)),
                    now,
                )?;
                tracing::warn!(
                    instance = %instance.id,
                    entity = %instance.entity_id,
                    domain = %instance.domain,
                    days_late,
                    "obligation went overdue"
                );
                outcome.newly_overdue.push(transitioned);
            }

            if let Some(definition) = store.get_definition(&instance.definition_id) {
                let accrued = definition.penalty.accrued(days_late);
                if accrued != instance.accrued_penalty_minor {
                    store.set_accrued_penalty(instance.id, accrued)?;
                    outcome.penalties_updated += 1;
                }
            }
        }
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
