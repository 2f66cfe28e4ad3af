//! # In-Memory Obligation Store
//!
//! DashMap-backed store with the same shape as the durable store the
//! engine delegates to in production. Status transitions are validated and
//! applied under a single shard write lock, and a (definition, entity,
//! period) index makes instance creation idempotent under concurrent
//! roll-forward ticks.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use vigil_core::{DefinitionId, EntityId, InstanceId, Period, RunId, ValidationError};

use crate::entity::{Entity, LifecycleStage};
use crate::obligation::{
    validate_status_transition, ObligationDefinition, ObligationInstance, ObligationStatus,
    StatusTransition,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from obligation store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Entity id does not exist.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Definition id does not exist.
    #[error("obligation definition not found: {0}")]
    DefinitionNotFound(DefinitionId),

    /// Instance id does not exist.
    #[error("obligation instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// Definitions are immutable; re-registering an id is rejected.
    #[error("obligation definition already registered: {0}")]
    DefinitionExists(DefinitionId),

    /// An instance already exists for this (definition, entity, period).
    #[error("instance already exists for definition {definition} entity {entity} period {period}")]
    DuplicatePeriod {
        definition: DefinitionId,
        entity: EntityId,
        period: String,
    },

    /// Transition not present in the obligation status state machine.
    #[error("invalid obligation status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: ObligationStatus,
        to: ObligationStatus,
    },

    /// Instance is already linked to a different workflow run.
    #[error("instance {instance} already linked to workflow run {existing}")]
    WorkflowRunMismatch {
        instance: InstanceId,
        existing: RunId,
    },

    /// Archived entities accept no new obligations.
    #[error("entity is archived: {0}")]
    EntityArchived(EntityId),

    /// Definition or value failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// ---------------------------------------------------------------------------
// MemoryObligationStore
// ---------------------------------------------------------------------------

/// Thread-safe in-memory obligation store.
pub struct MemoryObligationStore {
    entities: DashMap<EntityId, Entity>,
    definitions: DashMap<DefinitionId, ObligationDefinition>,
    instances: DashMap<InstanceId, ObligationInstance>,
    /// Uniqueness index: (definition, entity, period key) → instance.
    period_index: DashMap<(DefinitionId, EntityId, String), InstanceId>,
    /// Which definitions each entity is subscribed to.
    assignments: DashMap<EntityId, Vec<DefinitionId>>,
}

impl MemoryObligationStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
            definitions: DashMap::new(),
            instances: DashMap::new(),
            period_index: DashMap::new(),
            assignments: DashMap::new(),
        }
    }

    // -- entities -----------------------------------------------------------

    /// Insert or replace an entity record.
    pub fn upsert_entity(&self, entity: Entity) {
        self.entities.insert(entity.id, entity);
    }

    /// Get an entity by id.
    pub fn get_entity(&self, id: &EntityId) -> Option<Entity> {
        self.entities.get(id).map(|e| e.value().clone())
    }

    /// Move an entity to a new lifecycle stage.
    pub fn set_stage(&self, id: EntityId, stage: LifecycleStage) -> Result<Entity, StoreError> {
        let mut entry = self
            .entities
            .get_mut(&id)
            .ok_or(StoreError::EntityNotFound(id))?;
        let entity = entry.value_mut();
        entity.stage = stage;
        entity.updated_at = Utc::now();
        Ok(entity.clone())
    }

    /// Soft-archive an entity. Its history stays in place.
    pub fn archive_entity(&self, id: EntityId) -> Result<Entity, StoreError> {
        self.set_stage(id, LifecycleStage::Archived)
    }

    // -- definitions --------------------------------------------------------

    /// Register an obligation definition. Definitions are immutable; a
    /// duplicate id is rejected.
    pub fn register_definition(&self, definition: ObligationDefinition) -> Result<(), StoreError> {
        definition.validate()?;
        match self.definitions.entry(definition.id) {
            Entry::Occupied(_) => Err(StoreError::DefinitionExists(definition.id)),
            Entry::Vacant(v) => {
                v.insert(definition);
                Ok(())
            }
        }
    }

    /// Get a definition by id.
    pub fn get_definition(&self, id: &DefinitionId) -> Option<ObligationDefinition> {
        self.definitions.get(id).map(|d| d.value().clone())
    }

    /// Snapshot of all definitions, keyed by id. Used by the aggregator.
    pub fn definitions_snapshot(&self) -> HashMap<DefinitionId, ObligationDefinition> {
        self.definitions
            .iter()
            .map(|d| (*d.key(), d.value().clone()))
            .collect()
    }

    /// Subscribe an entity to a definition.
    ///
    /// # Errors
    ///
    /// Rejects unknown entities/definitions and archived entities.
    pub fn assign_definition(
        &self,
        entity_id: EntityId,
        definition_id: DefinitionId,
    ) -> Result<(), StoreError> {
        let entity = self
            .entities
            .get(&entity_id)
            .ok_or(StoreError::EntityNotFound(entity_id))?;
        if entity.stage == LifecycleStage::Archived {
            return Err(StoreError::EntityArchived(entity_id));
        }
        if !self.definitions.contains_key(&definition_id) {
            return Err(StoreError::DefinitionNotFound(definition_id));
        }
        let mut list = self.assignments.entry(entity_id).or_default();
        if !list.contains(&definition_id) {
            list.push(definition_id);
        }
        Ok(())
    }

    /// Every (entity, definition) pairing where both sides are active.
    /// This is the scheduler's work list.
    pub fn active_pairings(&self) -> Vec<(EntityId, DefinitionId)> {
        let mut out = Vec::new();
        for entry in self.assignments.iter() {
            let entity_id = *entry.key();
            let tracked = self
                .entities
                .get(&entity_id)
                .map(|e| e.stage.is_tracked())
                .unwrap_or(false);
            if !tracked {
                continue;
            }
            for definition_id in entry.value() {
                let active = self
                    .definitions
                    .get(definition_id)
                    .map(|d| d.active)
                    .unwrap_or(false);
                if active {
                    out.push((entity_id, *definition_id));
                }
            }
        }
        // Deterministic iteration order for idempotent roll-forward output.
        out.sort();
        out
    }

    // -- instances ----------------------------------------------------------

    /// Create an obligation instance, enforcing period uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicatePeriod`] if an instance already
    /// exists for the same (definition, entity, period).
    pub fn create_instance(
        &self,
        instance: ObligationInstance,
    ) -> Result<ObligationInstance, StoreError> {
        let key = (
            instance.definition_id,
            instance.entity_id,
            instance.period.key(),
        );
        match self.period_index.entry(key) {
            Entry::Occupied(_) => Err(StoreError::DuplicatePeriod {
                definition: instance.definition_id,
                entity: instance.entity_id,
                period: instance.period.key(),
            }),
            Entry::Vacant(v) => {
                v.insert(instance.id);
                tracing::debug!(
                    instance = %instance.id,
                    entity = %instance.entity_id,
                    period = %instance.period,
                    "obligation instance created"
                );
                self.instances.insert(instance.id, instance.clone());
                Ok(instance)
            }
        }
    }

    /// Get an instance by id.
    pub fn get_instance(&self, id: &InstanceId) -> Option<ObligationInstance> {
        self.instances.get(id).map(|i| i.value().clone())
    }

    /// The most recent period (by due date) already instantiated for a
    /// (definition, entity) pairing.
    pub fn latest_period(
        &self,
        definition_id: DefinitionId,
        entity_id: EntityId,
    ) -> Option<Period> {
        self.instances
            .iter()
            .filter(|i| i.definition_id == definition_id && i.entity_id == entity_id)
            .max_by_key(|i| i.due_date)
            .map(|i| i.period)
    }

    /// Transition an instance's status, appending to its history.
    ///
    /// Read-validate-update runs under a single shard write lock, so two
    /// racing triggers cannot both apply the same transition.
    pub fn transition_status(
        &self,
        id: InstanceId,
        to: ObligationStatus,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ObligationInstance, StoreError> {
        let mut entry = self
            .instances
            .get_mut(&id)
            .ok_or(StoreError::InstanceNotFound(id))?;
        let instance = entry.value_mut();
        validate_status_transition(instance.status, to)?;
        tracing::debug!(instance = %id, from = %instance.status, to = %to, "obligation status transition");
        instance.transitions.push(StatusTransition {
            from: instance.status,
            to,
            at: now,
            note,
        });
        instance.status = to;
        instance.updated_at = now;
        Ok(instance.clone())
    }

    /// Link an instance to its workflow run. Linking the same run twice is
    /// a no-op; linking a different run is rejected.
    pub fn attach_workflow_run(
        &self,
        id: InstanceId,
        run_id: RunId,
    ) -> Result<ObligationInstance, StoreError> {
        let mut entry = self
            .instances
            .get_mut(&id)
            .ok_or(StoreError::InstanceNotFound(id))?;
        let instance = entry.value_mut();
        match instance.workflow_run_id {
            None => {
                instance.workflow_run_id = Some(run_id);
                instance.updated_at = Utc::now();
                Ok(instance.clone())
            }
            Some(existing) if existing == run_id => Ok(instance.clone()),
            Some(existing) => Err(StoreError::WorkflowRunMismatch {
                instance: id,
                existing,
            }),
        }
    }

    /// Record the penalty accrued so far for an instance.
    pub fn set_accrued_penalty(
        &self,
        id: InstanceId,
        amount_minor: i64,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .instances
            .get_mut(&id)
            .ok_or(StoreError::InstanceNotFound(id))?;
        entry.value_mut().accrued_penalty_minor = amount_minor;
        Ok(())
    }

    /// All open (non-terminal) instances for an entity, ordered by due
    /// date then id for deterministic aggregation input.
    pub fn open_instances_for_entity(&self, entity_id: EntityId) -> Vec<ObligationInstance> {
        let mut out: Vec<ObligationInstance> = self
            .instances
            .iter()
            .filter(|i| i.entity_id == entity_id && i.status.is_open())
            .map(|i| i.value().clone())
            .collect();
        out.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
        out
    }

    /// All open instances across entities (the scheduler's sweep input).
    pub fn open_instances(&self) -> Vec<ObligationInstance> {
        let mut out: Vec<ObligationInstance> = self
            .instances
            .iter()
            .filter(|i| i.status.is_open())
            .map(|i| i.value().clone())
            .collect();
        out.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
        out
    }

    /// Insert an instance record directly (used for hydration from the
    /// durable store).
    pub fn insert_instance(&self, instance: ObligationInstance) {
        let key = (
            instance.definition_id,
            instance.entity_id,
            instance.period.key(),
        );
        self.period_index.insert(key, instance.id);
        self.instances.insert(instance.id, instance);
    }
}

impl Default for MemoryObligationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryObligationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryObligationStore")
            .field("entities", &self.entities.len())
            .field("definitions", &self.definitions.len())
            .field("instances", &self.instances.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::RegistrationInfo;
    use chrono::NaiveDate;
    use vigil_core::{ComplianceDomain, PenaltyFormula, Periodicity};

    fn store_with_pairing() -> (MemoryObligationStore, EntityId, DefinitionId) {
        let store = MemoryObligationStore::new();
        let mut entity = Entity::new("Acme Exports Pvt Ltd", RegistrationInfo::default());
        entity.stage = LifecycleStage::Active;
        let entity_id = entity.id;
        store.upsert_entity(entity);

        let definition = ObligationDefinition {
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
        let definition_id = definition.id;
        store.register_definition(definition).unwrap();
        store.assign_definition(entity_id, definition_id).unwrap();
        (store, entity_id, definition_id)
    }

    fn instance_for(
        store: &MemoryObligationStore,
        definition_id: DefinitionId,
        entity_id: EntityId,
        month: u32,
    ) -> ObligationInstance {
        let def = store.get_definition(&definition_id).unwrap();
        ObligationInstance::new(
            &def,
            entity_id,
            Period::Month { year: 2026, month },
            NaiveDate::from_ymd_opt(2026, month + 1, 20).unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn duplicate_period_rejected() {
        let (store, entity_id, definition_id) = store_with_pairing();
        let a = instance_for(&store, definition_id, entity_id, 7);
        let b = instance_for(&store, definition_id, entity_id, 7);
        store.create_instance(a).unwrap();
        let err = store.create_instance(b).unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePeriod { .. }));
    }

    #[test]
    fn distinct_periods_coexist() {
        let (store, entity_id, definition_id) = store_with_pairing();
        store
            .create_instance(instance_for(&store, definition_id, entity_id, 7))
            .unwrap();
        store
            .create_instance(instance_for(&store, definition_id, entity_id, 8))
            .unwrap();
        assert_eq!(store.open_instances_for_entity(entity_id).len(), 2);
    }

    #[test]
    fn transition_appends_history() {
        let (store, entity_id, definition_id) = store_with_pairing();
        let inst = store
            .create_instance(instance_for(&store, definition_id, entity_id, 7))
            .unwrap();
        let now = Utc::now();
        let updated = store
            .transition_status(inst.id, ObligationStatus::InProgress, None, now)
            .unwrap();
        assert_eq!(updated.status, ObligationStatus::InProgress);
        assert_eq!(updated.transitions.len(), 1);
        assert_eq!(updated.transitions[0].from, ObligationStatus::Pending);
        assert_eq!(updated.transitions[0].to, ObligationStatus::InProgress);
    }

    #[test]
    fn invalid_transition_leaves_instance_untouched() {
        let (store, entity_id, definition_id) = store_with_pairing();
        let inst = store
            .create_instance(instance_for(&store, definition_id, entity_id, 7))
            .unwrap();
        let err = store
            .transition_status(inst.id, ObligationStatus::Completed, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidStatusTransition { .. }));
        let current = store.get_instance(&inst.id).unwrap();
        assert_eq!(current.status, ObligationStatus::Pending);
        assert!(current.transitions.is_empty());
    }

    #[test]
    fn completed_instances_leave_the_open_set() {
        let (store, entity_id, definition_id) = store_with_pairing();
        let inst = store
            .create_instance(instance_for(&store, definition_id, entity_id, 7))
            .unwrap();
        let now = Utc::now();
        store
            .transition_status(inst.id, ObligationStatus::InProgress, None, now)
            .unwrap();
        store
            .transition_status(inst.id, ObligationStatus::Completed, None, now)
            .unwrap();
        assert!(store.open_instances_for_entity(entity_id).is_empty());
        // History survives completion.
        let done = store.get_instance(&inst.id).unwrap();
        assert_eq!(done.transitions.len(), 2);
    }

    #[test]
    fn attach_workflow_run_is_idempotent_but_exclusive() {
        let (store, entity_id, definition_id) = store_with_pairing();
        let inst = store
            .create_instance(instance_for(&store, definition_id, entity_id, 7))
            .unwrap();
        let run = RunId::new();
        store.attach_workflow_run(inst.id, run).unwrap();
        // Same run again: fine (duplicate webhook).
        store.attach_workflow_run(inst.id, run).unwrap();
        // Different run: rejected.
        let err = store.attach_workflow_run(inst.id, RunId::new()).unwrap_err();
        assert!(matches!(err, StoreError::WorkflowRunMismatch { .. }));
    }

    #[test]
    fn definitions_are_immutable() {
        let (store, _, definition_id) = store_with_pairing();
        let again = store.get_definition(&definition_id).unwrap();
        let err = store.register_definition(again).unwrap_err();
        assert_eq!(err, StoreError::DefinitionExists(definition_id));
    }

    #[test]
    fn archived_entity_rejects_new_assignments() {
        let (store, entity_id, definition_id) = store_with_pairing();
        store.archive_entity(entity_id).unwrap();
        let err = store
            .assign_definition(entity_id, definition_id)
            .unwrap_err();
        assert_eq!(err, StoreError::EntityArchived(entity_id));
        // And the pairing disappears from the scheduler work list.
        assert!(store.active_pairings().is_empty());
    }

    #[test]
    fn latest_period_tracks_max_due_date() {
        let (store, entity_id, definition_id) = store_with_pairing();
        store
            .create_instance(instance_for(&store, definition_id, entity_id, 7))
            .unwrap();
        store
            .create_instance(instance_for(&store, definition_id, entity_id, 9))
            .unwrap();
        assert_eq!(
            store.latest_period(definition_id, entity_id),
            Some(Period::Month {
                year: 2026,
                month: 9
            })
        );
    }

    #[test]
    fn open_instances_sorted_by_due_date() {
        let (store, entity_id, definition_id) = store_with_pairing();
        store
            .create_instance(instance_for(&store, definition_id, entity_id, 9))
            .unwrap();
        store
            .create_instance(instance_for(&store, definition_id, entity_id, 7))
            .unwrap();
        let open = store.open_instances_for_entity(entity_id);
        assert!(open[0].due_date < open[1].due_date);
    }
}
