//! # Idempotence Under Duplicate Triggers
//!
//! Retried webhooks and double-fired ticks must converge, not corrupt:
//! roll-forward creates each (definition, entity, period) exactly once,
//! reminders fire once per offset, and recomputation from the same
//! snapshot yields identical state.

use chrono::{DateTime, NaiveDate, Utc};

use vigil_core::{ComplianceDomain, DefinitionId, EntityId, PenaltyFormula, Periodicity, RagState};
use vigil_engine::{Engine, EngineConfig};
use vigil_notify::EventKind;
use vigil_store::{Entity, LifecycleStage, ObligationDefinition, RegistrationInfo, StoreError};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(d: NaiveDate) -> DateTime<Utc> {
    d.and_hms_opt(9, 0, 0).unwrap().and_utc()
}

fn engine_with_monthly_gst() -> (Engine, EntityId) {
    let engine = Engine::new(EngineConfig::default());
    let mut entity = Entity::new("Acme Exports Pvt Ltd", RegistrationInfo::default());
    entity.stage = LifecycleStage::Active;
    let entity_id = entity.id;
    engine.store().upsert_entity(entity);

    let def = ObligationDefinition {
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
    };
    engine.store().register_definition(def.clone()).unwrap();
    engine.store().assign_definition(entity_id, def.id).unwrap();
    (engine, entity_id)
}

#[test]
fn double_tick_creates_each_period_once() {
    let (engine, entity_id) = engine_with_monthly_gst();
    let now = at(date(2026, 7, 1));

    let first = engine.scheduled_tick(now).unwrap();
    let second = engine.scheduled_tick(now).unwrap();
    assert_eq!(first.instances_created, 2);
    assert_eq!(second.instances_created, 0);

    let open = engine.store().open_instances_for_entity(entity_id);
    assert_eq!(open.len(), 2);
    // Period keys are unique across the book.
    let mut keys: Vec<String> = open.iter().map(|i| i.period.key()).collect();
    keys.dedup();
    assert_eq!(keys.len(), 2);
}

#[test]
fn duplicate_instance_creation_is_rejected_by_the_store() {
    let (engine, entity_id) = engine_with_monthly_gst();
    engine.scheduled_tick(at(date(2026, 7, 1))).unwrap();

    let existing = engine.store().open_instances_for_entity(entity_id)[0].clone();
    let def = engine.store().get_definition(&existing.definition_id).unwrap();
    let dup = vigil_store::ObligationInstance::new(
        &def,
        entity_id,
        existing.period,
        existing.due_date,
        Utc::now(),
    );
    let err = engine.store().create_instance(dup).unwrap_err();
    assert!(matches!(err, StoreError::DuplicatePeriod { .. }));
}

#[test]
fn reminders_never_duplicate_across_ticks() {
    let (engine, entity_id) = engine_with_monthly_gst();
    engine.scheduled_tick(at(date(2026, 7, 1))).unwrap();

    // Walk the week before the 20 Aug due date, two ticks per day.
    let mut fired = 0;
    for day in 13..=19 {
        let d = date(2026, 8, day);
        fired += engine.scheduled_tick(at(d)).unwrap().reminders_fired;
        fired += engine.scheduled_tick(at(d)).unwrap().reminders_fired;
    }
    // Exactly one per configured offset (7, 3, 1).
    assert_eq!(fired, 3);

    let reminder_events = engine
        .get_alerts(entity_id, 50)
        .into_iter()
        .filter(|a| matches!(a.kind, EventKind::Reminder { .. }))
        .count();
    assert_eq!(reminder_events, 3);
}

#[test]
fn repeated_recompute_converges() {
    let (engine, entity_id) = engine_with_monthly_gst();
    engine.scheduled_tick(at(date(2026, 7, 1))).unwrap();
    let now = at(date(2026, 8, 25));
    engine.scheduled_tick(now).unwrap();

    let a = engine.manual_recalculate(entity_id, now);
    let b = engine.manual_recalculate(entity_id, now);
    let state_a = a.state().unwrap();
    assert_eq!(state_a, b.state().unwrap());
    assert_eq!(state_a.overall, RagState::Red);
    assert_eq!(state_a, &engine.get_entity_state(entity_id).unwrap());

    // Converged recomputes emit no further state-change events.
    let changes = engine
        .get_alerts(entity_id, 50)
        .into_iter()
        .filter(|e| matches!(e.kind, EventKind::StateChanged { .. }))
        .count();
    assert_eq!(changes, 1);
}
