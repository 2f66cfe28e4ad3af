//! # Entity State Aggregation
//!
//! The pure core of the aggregator. All inputs arrive as an explicit
//! snapshot; nothing here reads a clock or a store.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use vigil_core::{ComplianceDomain, DefinitionId, EntityId, InstanceId, RagState, RunId};
use vigil_store::{ObligationDefinition, ObligationInstance, ObligationStatus};

// ---------------------------------------------------------------------------
// Configuration & input snapshot
// ---------------------------------------------------------------------------

/// Aggregation tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Days before the due date an open instance turns AMBER.
    pub risk_window_days: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_window_days: 7,
        }
    }
}

/// Snapshot of everything aggregation needs for one entity.
#[derive(Debug)]
pub struct AggregationInput<'a> {
    pub entity_id: EntityId,
    /// Open (non-terminal) instances for the entity.
    pub instances: &'a [ObligationInstance],
    pub definitions: &'a HashMap<DefinitionId, ObligationDefinition>,
    /// Workflow runs with at least one stalled step right now.
    pub stalled_runs: &'a HashSet<RunId>,
    pub config: RiskConfig,
    pub now: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// How one open instance contributes to its domain's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceRisk {
    Overdue,
    AtRisk,
    OnTrack,
}

/// Classify one open instance against the risk window.
pub fn classify_instance(
    instance: &ObligationInstance,
    today: NaiveDate,
    config: RiskConfig,
) -> InstanceRisk {
    if instance.status == ObligationStatus::Overdue || today > instance.due_date {
        return InstanceRisk::Overdue;
    }
    if instance.due_date - today <= Duration::days(config.risk_window_days) {
        return InstanceRisk::AtRisk;
    }
    InstanceRisk::OnTrack
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Per-domain classification counts and derived state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainBreakdown {
    pub state: Option<RagState>,
    pub overdue: usize,
    pub at_risk: usize,
    pub on_track: usize,
    /// Open instances whose workflow run has a stalled step.
    pub stalled: usize,
}

impl DomainBreakdown {
    fn rag(&self) -> RagState {
        if self.overdue > 0 || self.stalled > 0 {
            RagState::Red
        } else if self.at_risk > 0 {
            RagState::Amber
        } else {
            RagState::Green
        }
    }
}

/// The obligation demanding attention soonest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextAction {
    pub instance_id: InstanceId,
    pub definition_id: DefinitionId,
    pub domain: ComplianceDomain,
    pub due_date: NaiveDate,
    pub title: String,
}

/// Entity-level compliance state: the engine's primary query answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityComplianceState {
    pub entity_id: EntityId,
    pub overall: RagState,
    /// Every domain appears, GREEN with zero counts when empty.
    pub domains: BTreeMap<ComplianceDomain, DomainBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action: Option<NextAction>,
    /// Accrued plus projected penalties, minor currency units.
    pub penalty_exposure_minor: i64,
    /// Instances excluded for data-integrity reasons (missing definition).
    pub excluded_instances: Vec<InstanceId>,
    pub computed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// compute_entity_state
// ---------------------------------------------------------------------------

/// Compute the entity-level compliance state from a snapshot.
///
/// Idempotent: calling twice with the same input yields identical output.
pub fn compute_entity_state(input: &AggregationInput<'_>) -> EntityComplianceState {
    let today = input.now.date_naive();

    let mut domains: BTreeMap<ComplianceDomain, DomainBreakdown> = ComplianceDomain::all()
        .iter()
        .map(|&d| (d, DomainBreakdown::default()))
        .collect();
    let mut excluded: Vec<InstanceId> = Vec::new();
    let mut exposure: i64 = 0;

    for instance in input.instances {
        let Some(definition) = input.definitions.get(&instance.definition_id) else {
            tracing::warn!(
                instance = %instance.id,
                definition = %instance.definition_id,
                "instance references missing definition — excluded from aggregation"
            );
            excluded.push(instance.id);
            continue;
        };

        let risk = classify_instance(instance, today, input.config);
        let stalled = instance
            .workflow_run_id
            .map(|run| input.stalled_runs.contains(&run))
            .unwrap_or(false);

        let breakdown = domains.entry(instance.domain).or_default();
        match risk {
            InstanceRisk::Overdue => breakdown.overdue += 1,
            InstanceRisk::AtRisk => breakdown.at_risk += 1,
            InstanceRisk::OnTrack => breakdown.on_track += 1,
        }
        if stalled {
            breakdown.stalled += 1;
        }

        // Penalty exposure: accrued plus the projection to the point the
        // obligation is expected to resolve (base SLA past today). Far
        // instances contribute nothing so risk is not overstated.
        if matches!(risk, InstanceRisk::Overdue | InstanceRisk::AtRisk) {
            let projected_days_late = (today + Duration::days(i64::from(definition.base_sla_days))
                - instance.due_date)
                .num_days();
            let projected_total = definition.penalty.accrued(projected_days_late);
            let projected_additional =
                (projected_total - instance.accrued_penalty_minor).max(0);
            exposure += instance.accrued_penalty_minor + projected_additional;
        }
    }

    for breakdown in domains.values_mut() {
        breakdown.state = Some(breakdown.rag());
    }

    let overall = domains
        .values()
        .filter_map(|b| b.state)
        .fold(RagState::Green, RagState::worst);

    // Next action: earliest due date among instances in non-GREEN domains,
    // ties broken by domain priority, then instance id.
    let next_action = input
        .instances
        .iter()
        .filter(|i| !excluded.contains(&i.id))
        .filter(|i| {
            domains
                .get(&i.domain)
                .and_then(|b| b.state)
                .map(|s| !s.is_green())
                .unwrap_or(false)
        })
        .min_by_key(|i| (i.due_date, i.domain.priority_rank(), i.id))
        .map(|i| NextAction {
            instance_id: i.id,
            definition_id: i.definition_id,
            domain: i.domain,
            due_date: i.due_date,
            title: input
                .definitions
                .get(&i.definition_id)
                .map(|d| d.title.clone())
                .unwrap_or_default(),
        });

    excluded.sort();

    EntityComplianceState {
        entity_id: input.entity_id,
        overall,
        domains,
        next_action,
        penalty_exposure_minor: exposure,
        excluded_instances: excluded,
        computed_at: input.now,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{PenaltyFormula, Period, Periodicity};

    fn definition(domain: ComplianceDomain) -> ObligationDefinition {
        ObligationDefinition {
            id: DefinitionId::new(),
            domain,
            title: format!("{domain} filing"),
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

    fn instance(
        def: &ObligationDefinition,
        entity: EntityId,
        due: NaiveDate,
    ) -> ObligationInstance {
        // Period is irrelevant to aggregation; any value works.
        ObligationInstance::new(
            def,
            entity,
            Period::Month {
                year: 2026,
                month: 7,
            },
            due,
            Utc::now(),
        )
    }

    fn now_at(date: NaiveDate) -> DateTime<Utc> {
        date.and_hms_opt(9, 0, 0).unwrap().and_utc()
    }

    struct Fixture {
        entity: EntityId,
        definitions: HashMap<DefinitionId, ObligationDefinition>,
        instances: Vec<ObligationInstance>,
        stalled: HashSet<RunId>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                entity: EntityId::new(),
                definitions: HashMap::new(),
                instances: Vec::new(),
                stalled: HashSet::new(),
            }
        }

        fn add(&mut self, domain: ComplianceDomain, due: NaiveDate) -> InstanceId {
            let def = definition(domain);
            let inst = instance(&def, self.entity, due);
            let id = inst.id;
            self.definitions.insert(def.id, def);
            self.instances.push(inst);
            id
        }

        fn compute(&self, now: DateTime<Utc>) -> EntityComplianceState {
            compute_entity_state(&AggregationInput {
                entity_id: self.entity,
                instances: &self.instances,
                definitions: &self.definitions,
                stalled_runs: &self.stalled,
                config: RiskConfig::default(),
                now,
            })
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn due_within_risk_window_is_amber() {
        let mut f = Fixture::new();
        let id = f.add(ComplianceDomain::TaxGst, date(2026, 8, 20));
        // Due in 3 days, risk window 7.
        let state = f.compute(now_at(date(2026, 8, 17)));
        assert_eq!(
            state.domains[&ComplianceDomain::TaxGst].state,
            Some(RagState::Amber)
        );
        assert_eq!(state.overall, RagState::Amber);
        assert_eq!(state.next_action.unwrap().instance_id, id);
    }

    #[test]
    fn past_due_is_red_with_positive_exposure() {
        let mut f = Fixture::new();
        f.add(ComplianceDomain::TaxGst, date(2026, 8, 20));
        let state = f.compute(now_at(date(2026, 8, 25)));
        assert_eq!(
            state.domains[&ComplianceDomain::TaxGst].state,
            Some(RagState::Red)
        );
        assert_eq!(state.overall, RagState::Red);
        assert!(state.penalty_exposure_minor > 0);
    }

    #[test]
    fn far_future_is_green_with_zero_exposure() {
        let mut f = Fixture::new();
        f.add(ComplianceDomain::Labour, date(2026, 12, 15));
        let state = f.compute(now_at(date(2026, 8, 1)));
        assert_eq!(state.overall, RagState::Green);
        assert_eq!(state.penalty_exposure_minor, 0);
        assert!(state.next_action.is_none());
    }

    #[test]
    fn overall_is_worst_domain() {
        let mut f = Fixture::new();
        f.add(ComplianceDomain::TaxGst, date(2026, 12, 15)); // green
        f.add(ComplianceDomain::Labour, date(2026, 8, 18)); // overdue
        f.add(ComplianceDomain::Fema, date(2026, 8, 24)); // amber
        let state = f.compute(now_at(date(2026, 8, 21)));
        assert_eq!(state.overall, RagState::Red);
        let worst = state
            .domains
            .values()
            .filter_map(|b| b.state)
            .fold(RagState::Green, RagState::worst);
        assert_eq!(state.overall, worst);
    }

    #[test]
    fn stalled_workflow_drives_red_without_overdue() {
        let mut f = Fixture::new();
        f.add(ComplianceDomain::Corporate, date(2026, 8, 24));
        let run = RunId::new();
        f.instances[0].workflow_run_id = Some(run);
        f.stalled.insert(run);
        let state = f.compute(now_at(date(2026, 8, 21)));
        assert_eq!(
            state.domains[&ComplianceDomain::Corporate].state,
            Some(RagState::Red)
        );
        assert_eq!(state.domains[&ComplianceDomain::Corporate].stalled, 1);
    }

    #[test]
    fn next_action_tie_breaks_by_domain_priority() {
        let mut f = Fixture::new();
        let due = date(2026, 8, 24);
        f.add(ComplianceDomain::Labour, due);
        let gst = f.add(ComplianceDomain::TaxGst, due);
        let state = f.compute(now_at(date(2026, 8, 21)));
        // Same due date: TAX_GST outranks LABOUR.
        assert_eq!(state.next_action.unwrap().instance_id, gst);
    }

    #[test]
    fn next_action_prefers_earlier_due_date_over_priority() {
        let mut f = Fixture::new();
        let labour = f.add(ComplianceDomain::Labour, date(2026, 8, 22));
        f.add(ComplianceDomain::TaxGst, date(2026, 8, 24));
        let state = f.compute(now_at(date(2026, 8, 21)));
        assert_eq!(state.next_action.unwrap().instance_id, labour);
    }

    #[test]
    fn missing_definition_excluded_and_never_red() {
        let mut f = Fixture::new();
        let id = f.add(ComplianceDomain::TaxGst, date(2026, 8, 10));
        // Drop the definition: dangling reference, even though overdue.
        f.definitions.clear();
        let state = f.compute(now_at(date(2026, 8, 21)));
        assert_eq!(state.excluded_instances, vec![id]);
        assert_eq!(state.overall, RagState::Green);
        assert_eq!(state.penalty_exposure_minor, 0);
    }

    #[test]
    fn recomputation_is_idempotent() {
        let mut f = Fixture::new();
        f.add(ComplianceDomain::TaxGst, date(2026, 8, 20));
        f.add(ComplianceDomain::Fema, date(2026, 9, 30));
        let now = now_at(date(2026, 8, 21));
        let a = f.compute(now);
        let b = f.compute(now);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn completed_instance_not_in_snapshot_yields_green() {
        // The caller passes open instances only; an empty snapshot is
        // green across all domains.
        let f = Fixture::new();
        let state = f.compute(now_at(date(2026, 8, 21)));
        assert_eq!(state.overall, RagState::Green);
        assert_eq!(state.domains.len(), 6);
        assert!(state
            .domains
            .values()
            .all(|b| b.state == Some(RagState::Green)));
    }

    #[test]
    fn exposure_projection_uses_base_sla() {
        let mut f = Fixture::new();
        f.add(ComplianceDomain::TaxGst, date(2026, 8, 20));
        // 5 days late today, 5-day SLA → projection to 10 days late at
        // ₹50/day = ₹500 (50_000 minor).
        let state = f.compute(now_at(date(2026, 8, 25)));
        assert_eq!(state.penalty_exposure_minor, 50_000);
    }

    proptest::proptest! {
        /// The overall state always equals the worst domain state: no
        /// entity is ever reported GREEN while any domain is RED.
        #[test]
        fn overall_equals_worst_domain(
            offsets in proptest::collection::vec((0usize..6, -30i64..30), 0..12),
        ) {
            let mut f = Fixture::new();
            let today = date(2026, 8, 21);
            for (domain_idx, days_until_due) in offsets {
                let domain = ComplianceDomain::all()[domain_idx];
                f.add(domain, today + Duration::days(days_until_due));
            }
            let state = f.compute(now_at(today));
            let worst = state
                .domains
                .values()
                .filter_map(|b| b.state)
                .fold(RagState::Green, RagState::worst);
            proptest::prop_assert_eq!(state.overall, worst);
            if state
                .domains
                .values()
                .any(|b| b.state == Some(RagState::Red))
            {
                proptest::prop_assert_eq!(state.overall, RagState::Red);
            }
        }
    }
}
