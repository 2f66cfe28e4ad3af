//! # Reminder Ledger
//!
//! For an instance due on day `D` with reminder offsets `{d₁, d₂, …}`,
//! reminders fire on `{D − dᵢ}` clipped to `[today, D]` — an offset whose
//! date already passed when the instance was created fires immediately,
//! and nothing fires after the due date (the overdue sweep takes over).
//!
//! Fired markers are keyed by (instance, offset), so recomputing the
//! schedule — after a preference change, a restart, or a duplicate tick —
//! never re-fires an offset that already went out. Changing the offset
//! list only affects offsets that have not fired yet.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use vigil_core::{ComplianceDomain, EntityId, InstanceId};
use vigil_store::{ObligationInstance, ObligationStatus};

/// One reminder that should go out now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub instance_id: InstanceId,
    pub entity_id: EntityId,
    pub domain: ComplianceDomain,
    pub due_date: NaiveDate,
    /// Days before the due date this reminder was scheduled for.
    pub offset_days: u32,
}

/// Thread-safe record of which (instance, offset) reminders have fired.
#[derive(Debug, Default)]
pub struct ReminderLedger {
    fired: DashMap<(InstanceId, u32), DateTime<Utc>>,
}

impl ReminderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reminders due for one instance as of `today`, unfired offsets only.
    /// Ordered farthest offset first, matching the intended send order
    /// when several offsets are caught up in one tick.
    pub fn due_reminders(
        &self,
        instance: &ObligationInstance,
        reminder_days: &[u32],
        today: NaiveDate,
    ) -> Vec<Reminder> {
        if !instance.status.is_open()
            || instance.status == ObligationStatus::Overdue
            || today > instance.due_date
        {
            return Vec::new();
        }
        let mut offsets: Vec<u32> = reminder_days
            .iter()
            .copied()
            .filter(|&d| {
                let fire_on = instance.due_date - Duration::days(i64::from(d));
                fire_on <= today && !self.fired.contains_key(&(instance.id, d))
            })
            .collect();
        offsets.sort_unstable_by(|a, b| b.cmp(a));
        offsets.dedup();
        offsets
            .into_iter()
            .map(|offset_days| Reminder {
                instance_id: instance.id,
                entity_id: instance.entity_id,
                domain: instance.domain,
                due_date: instance.due_date,
                offset_days,
            })
            .collect()
    }

    /// Record a reminder as sent. Returns `false` if it was already
    /// marked, so racing ticks agree on a single send.
    pub fn mark_fired(&self, instance_id: InstanceId, offset_days: u32, now: DateTime<Utc>) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.fired.entry((instance_id, offset_days)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(now);
                true
            }
        }
    }

    pub fn is_fired(&self, instance_id: InstanceId, offset_days: u32) -> bool {
        self.fired.contains_key(&(instance_id, offset_days))
    }

    /// Drop markers for an instance that left the open set.
    pub fn forget_instance(&self, instance_id: InstanceId) {
        self.fired.retain(|(id, _), _| *id != instance_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{DefinitionId, PenaltyFormula, Period, Periodicity};
    use vigil_store::ObligationDefinition;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn instance_due(due: NaiveDate) -> ObligationInstance {
        let def = ObligationDefinition {
            id: DefinitionId::new(),
            domain: ComplianceDomain::TaxGst,
            title: "GSTR-3B monthly return".into(),
            periodicity: Periodicity::Monthly,
            base_sla_days: 5,
            penalty: PenaltyFormula::None,
            one_time_due: None,
            active: true,
            version: 1,
        };
        ObligationInstance::new(
            &def,
            EntityId::new(),
            Period::Month {
                year: 2026,
                month: 7,
            },
            due,
            Utc::now(),
        )
    }

    #[test]
    fn offsets_fire_as_their_dates_arrive() {
        let ledger = ReminderLedger::new();
        let inst = instance_due(date(2026, 8, 20));
        let days = [7, 3, 1];

        // Eight days out: nothing yet.
        assert!(ledger.due_reminders(&inst, &days, date(2026, 8, 12)).is_empty());

        // Seven days out: the 7-day reminder.
        let due = ledger.due_reminders(&inst, &days, date(2026, 8, 13));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].offset_days, 7);
    }

    #[test]
    fn fired_marker_prevents_duplicates() {
        let ledger = ReminderLedger::new();
        let inst = instance_due(date(2026, 8, 20));
        let today = date(2026, 8, 13);

        let first = ledger.due_reminders(&inst, &[7, 3, 1], today);
        assert_eq!(first.len(), 1);
        assert!(ledger.mark_fired(inst.id, 7, Utc::now()));

        // Recompute: nothing to send.
        assert!(ledger.due_reminders(&inst, &[7, 3, 1], today).is_empty());
        // Double mark reports the duplicate.
        assert!(!ledger.mark_fired(inst.id, 7, Utc::now()));
    }

    #[test]
    fn catch_up_fires_missed_offsets_farthest_first() {
        let ledger = ReminderLedger::new();
        let inst = instance_due(date(2026, 8, 20));
        // First tick happens 2 days before due: 7- and 3-day offsets were
        // missed, all three are caught up in order.
        let due = ledger.due_reminders(&inst, &[3, 7, 2], date(2026, 8, 18));
        let offsets: Vec<u32> = due.iter().map(|r| r.offset_days).collect();
        assert_eq!(offsets, vec![7, 3, 2]);
    }

    #[test]
    fn changed_offsets_only_affect_unfired() {
        let ledger = ReminderLedger::new();
        let inst = instance_due(date(2026, 8, 20));
        ledger.mark_fired(inst.id, 7, Utc::now());

        // Preferences change from [7, 3, 1] to [7, 5, 1]: the fired 7-day
        // marker stands, the new 5-day offset fires on its own date.
        let due = ledger.due_reminders(&inst, &[7, 5, 1], date(2026, 8, 15));
        let offsets: Vec<u32> = due.iter().map(|r| r.offset_days).collect();
        assert_eq!(offsets, vec![5]);
    }

    #[test]
    fn nothing_fires_past_due_or_for_closed_instances() {
        let ledger = ReminderLedger::new();
        let mut inst = instance_due(date(2026, 8, 20));
        assert!(ledger.due_reminders(&inst, &[7], date(2026, 8, 21)).is_empty());

        inst.status = ObligationStatus::Overdue;
        assert!(ledger.due_reminders(&inst, &[7], date(2026, 8, 19)).is_empty());

        inst.status = ObligationStatus::Completed;
        assert!(ledger.due_reminders(&inst, &[7], date(2026, 8, 19)).is_empty());
    }

    #[test]
    fn forget_instance_clears_markers() {
        let ledger = ReminderLedger::new();
        let inst = instance_due(date(2026, 8, 20));
        ledger.mark_fired(inst.id, 7, Utc::now());
        ledger.forget_instance(inst.id);
        assert!(!ledger.is_fired(inst.id, 7));
    }
}
