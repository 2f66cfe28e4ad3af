//! # The Orchestration Façade
//!
//! [`Engine`] is the single entry point the surrounding product talks
//! to. Inbound triggers (document uploads, step completions, preference
//! updates, the scheduled tick) funnel into a per-entity recompute that
//! runs under that entity's mutex; queries read a last-good state cache
//! and never observe a half-applied recompute.
//!
//! ## Locking
//!
//! One `parking_lot` mutex per entity, created on first touch. A trigger
//! that cannot take the lock within the configured timeout returns
//! [`RecomputeOutcome::Requeued`] instead of blocking or failing — the
//! caller re-submits, and the cache keeps serving the previous state
//! meanwhile.
//!
//! ## Notifications
//!
//! Mutations that change the overall RAG state, push an instance
//! overdue, or fire a reminder emit [`NotificationEvent`]s. Dispatch is
//! fire-and-forget relative to the mutation: the decision is computed
//! inline, but delivery rides the outbox and never blocks or fails the
//! trigger.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use vigil_core::{ActorId, EntityId, EventId, InstanceId, RagState, RunId, TemplateId};
use vigil_notify::{
    dispatch, escalate, AlertPreference, DeliveryOutbox, DeliveryState, EventKind,
    NotificationEvent, RetryPolicy, Severity,
};
use vigil_schedule::{ReminderLedger, Scheduler, SchedulerConfig};
use vigil_status::{compute_entity_state, AggregationInput, EntityComplianceState, RiskConfig};
use vigil_store::{MemoryObligationStore, ObligationStatus};
use vigil_workflow::{
    ActorLoad, Assignment, QueueItem, StepKey, WorkQueue, WorkflowRun, WorkflowTemplate,
};

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Configuration & outcomes
// ---------------------------------------------------------------------------

/// Engine tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub risk: RiskConfig,
    /// How long a trigger waits on the entity lock before requeueing.
    pub lock_timeout: StdDuration,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            risk: RiskConfig::default(),
            lock_timeout: StdDuration::from_millis(250),
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of a trigger that wants a recompute.
#[derive(Debug, Clone)]
pub enum RecomputeOutcome {
    Recomputed(EntityComplianceState),
    /// Lock contention; re-submit the trigger.
    Requeued,
}

impl RecomputeOutcome {
    pub fn state(&self) -> Option<&EntityComplianceState> {
        match self {
            Self::Recomputed(state) => Some(state),
            Self::Requeued => None,
        }
    }
}

/// What one scheduled tick did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub instances_created: usize,
    pub newly_overdue: usize,
    pub reminders_fired: usize,
    pub deferred_flushed: usize,
    pub escalations: usize,
    pub entities_recomputed: usize,
    /// Entities whose recompute lost the lock race this tick.
    pub requeued: Vec<EntityId>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The compliance orchestration façade.
pub struct Engine {
    config: EngineConfig,
    store: MemoryObligationStore,
    scheduler: Scheduler,
    reminders: ReminderLedger,
    outbox: DeliveryOutbox,
    templates: DashMap<TemplateId, Arc<WorkflowTemplate>>,
    runs: DashMap<RunId, WorkflowRun>,
    preferences: DashMap<EntityId, Arc<AlertPreference>>,
    /// Last-good state per entity; queries read this, never a recompute
    /// in flight.
    states: DashMap<EntityId, EntityComplianceState>,
    events: RwLock<Vec<NotificationEvent>>,
    work_queue: Mutex<WorkQueue>,
    locks: DashMap<EntityId, Arc<Mutex<()>>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            scheduler: Scheduler::new(config.scheduler),
            outbox: DeliveryOutbox::new(config.retry),
            config,
            store: MemoryObligationStore::new(),
            reminders: ReminderLedger::new(),
            templates: DashMap::new(),
            runs: DashMap::new(),
            preferences: DashMap::new(),
            states: DashMap::new(),
            events: RwLock::new(Vec::new()),
            work_queue: Mutex::new(WorkQueue::new("ops")),
            locks: DashMap::new(),
        }
    }

    /// The backing obligation store, for entity/definition setup.
    pub fn store(&self) -> &MemoryObligationStore {
        &self.store
    }

    /// The delivery outbox feeding the gateway collaborator.
    pub fn outbox(&self) -> &DeliveryOutbox {
        &self.outbox
    }

    // -- preferences --------------------------------------------------------

    /// Current preference snapshot for an entity (defaults if never set).
    pub fn preferences(&self, entity_id: EntityId) -> Arc<AlertPreference> {
        self.preferences
            .get(&entity_id)
            .map(|p| Arc::clone(p.value()))
            .unwrap_or_default()
    }

    /// Swap in a new preference snapshot and recompute. Snapshots are
    /// immutable: in-flight dispatch decisions keep the one they read.
    pub fn preferences_updated(
        &self,
        entity_id: EntityId,
        preference: AlertPreference,
        now: DateTime<Utc>,
    ) -> RecomputeOutcome {
        self.preferences.insert(entity_id, Arc::new(preference));
        self.recompute_entity(entity_id, now)
    }

    // -- workflow templates & runs -----------------------------------------

    /// Register a validated workflow template.
    pub fn register_template(&self, template: WorkflowTemplate) -> TemplateId {
        let id = template.id;
        self.templates.insert(id, Arc::new(template));
        id
    }

    fn template(&self, id: TemplateId) -> Result<Arc<WorkflowTemplate>, EngineError> {
        self.templates
            .get(&id)
            .map(|t| Arc::clone(t.value()))
            .ok_or(EngineError::TemplateNotFound(id))
    }

    /// Start a workflow run discharging an obligation instance.
    ///
    /// Links the run to the instance, moves a pending instance to
    /// `in_progress`, and enqueues the run's root steps.
    pub fn start_workflow(
        &self,
        instance_id: InstanceId,
        template_id: TemplateId,
        now: DateTime<Utc>,
    ) -> Result<RunId, EngineError> {
        let template = self.template(template_id)?;
        let instance = self
            .store
            .get_instance(&instance_id)
            .ok_or(vigil_store::StoreError::InstanceNotFound(instance_id))?;
        if !instance.status.is_open() {
            return Err(EngineError::InstanceClosed(instance_id));
        }

        let run = WorkflowRun::new(&template, instance_id, now);
        let run_id = run.id;
        self.store.attach_workflow_run(instance_id, run_id)?;
        if instance.status == ObligationStatus::Pending {
            self.store
                .transition_status(instance_id, ObligationStatus::InProgress, None, now)?;
        }
        self.enqueue_steps(&run, &template, &run.frontier(), now);
        self.runs.insert(run_id, run);

        tracing::info!(
            instance = %instance_id,
            run = %run_id,
            template = %template.service,
            "workflow run started"
        );
        self.recompute_entity(instance.entity_id, now);
        Ok(run_id)
    }

    /// Current run state, cloned.
    pub fn get_workflow_run(&self, run_id: RunId) -> Option<WorkflowRun> {
        self.runs.get(&run_id).map(|r| r.value().clone())
    }

    fn enqueue_steps(
        &self,
        run: &WorkflowRun,
        template: &WorkflowTemplate,
        keys: &[StepKey],
        now: DateTime<Utc>,
    ) {
        let mut queue = self.work_queue.lock();
        for key in keys {
            let Some(definition) = template.step(key) else {
                continue;
            };
            let sla_due = run
                .step(key)
                .and_then(|r| r.sla_due)
                .unwrap_or(now);
            queue.enqueue(QueueItem::new(
                run.id,
                key.clone(),
                definition.priority,
                sla_due,
                now,
            ));
        }
    }

    /// Assign a frontier step to an actor.
    pub fn assign_step(
        &self,
        run_id: RunId,
        key: &StepKey,
        actor: ActorId,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let mut run = self
            .runs
            .get_mut(&run_id)
            .ok_or(EngineError::RunNotFound(run_id))?;
        run.assign(key, actor, now)?;
        Ok(())
    }

    /// Mark a step started by its actor.
    pub fn start_step(
        &self,
        run_id: RunId,
        key: &StepKey,
        actor: ActorId,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let mut run = self
            .runs
            .get_mut(&run_id)
            .ok_or(EngineError::RunNotFound(run_id))?;
        run.start(key, actor, now)?;
        Ok(())
    }

    /// Inbound trigger: an actor completed a workflow step.
    ///
    /// Advances the frontier, enqueues newly ready steps, completes the
    /// obligation instance when the run finishes, and recomputes.
    pub fn step_completed(
        &self,
        run_id: RunId,
        key: &StepKey,
        actor: ActorId,
        now: DateTime<Utc>,
    ) -> Result<RecomputeOutcome, EngineError> {
        let template_id = self
            .runs
            .get(&run_id)
            .map(|r| r.template_id)
            .ok_or(EngineError::RunNotFound(run_id))?;
        let template = self.template(template_id)?;

        let (instance_id, newly_ready, run_complete, run_snapshot) = {
            let mut run = self
                .runs
                .get_mut(&run_id)
                .ok_or(EngineError::RunNotFound(run_id))?;
            let newly_ready = run.complete(&template, key, actor, now)?;
            (
                run.instance_id,
                newly_ready,
                run.is_complete(),
                run.clone(),
            )
        };

        self.work_queue.lock().remove(run_id, key);
        self.enqueue_steps(&run_snapshot, &template, &newly_ready, now);

        let entity_id = self
            .store
            .get_instance(&instance_id)
            .ok_or(vigil_store::StoreError::InstanceNotFound(instance_id))?
            .entity_id;

        if run_complete {
            let status = self
                .store
                .get_instance(&instance_id)
                .map(|i| i.status)
                .unwrap_or(ObligationStatus::Completed);
            if status.is_open() {
                self.store.transition_status(
                    instance_id,
                    ObligationStatus::Completed,
                    Some("workflow run completed".into()),
                    now,
                )?;
            }
            self.reminders.forget_instance(instance_id);
            tracing::info!(run = %run_id, instance = %instance_id, "workflow run completed");
        }

        Ok(self.recompute_entity(entity_id, now))
    }

    /// Skip an automated step whose precondition is false.
    pub fn skip_step(
        &self,
        run_id: RunId,
        key: &StepKey,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<RecomputeOutcome, EngineError> {
        let template_id = self
            .runs
            .get(&run_id)
            .map(|r| r.template_id)
            .ok_or(EngineError::RunNotFound(run_id))?;
        let template = self.template(template_id)?;

        let (instance_id, newly_ready, run_complete, run_snapshot) = {
            let mut run = self
                .runs
                .get_mut(&run_id)
                .ok_or(EngineError::RunNotFound(run_id))?;
            let newly_ready = run.skip(&template, key, reason, now)?;
            (
                run.instance_id,
                newly_ready,
                run.is_complete(),
                run.clone(),
            )
        };

        self.work_queue.lock().remove(run_id, key);
        self.enqueue_steps(&run_snapshot, &template, &newly_ready, now);

        let entity_id = self
            .store
            .get_instance(&instance_id)
            .ok_or(vigil_store::StoreError::InstanceNotFound(instance_id))?
            .entity_id;

        if run_complete {
            let status = self
                .store
                .get_instance(&instance_id)
                .map(|i| i.status)
                .unwrap_or(ObligationStatus::Completed);
            if status.is_open() {
                self.store.transition_status(
                    instance_id,
                    ObligationStatus::Completed,
                    Some("workflow run completed".into()),
                    now,
                )?;
            }
            self.reminders.forget_instance(instance_id);
        }

        Ok(self.recompute_entity(entity_id, now))
    }

    /// Hand queued steps to the least-loaded eligible actors.
    pub fn auto_assign(
        &self,
        actors: &mut [ActorLoad],
        now: DateTime<Utc>,
    ) -> Vec<Assignment> {
        let assignments = self.work_queue.lock().auto_assign(actors);
        for assignment in &assignments {
            if let Some(mut run) = self.runs.get_mut(&assignment.run_id) {
                // Queue state is authoritative for who; the run records it.
                let _ = run.assign(&assignment.step_key, assignment.actor.clone(), now);
            }
        }
        assignments
    }

    // -- inbound triggers ---------------------------------------------------

    /// A document landed for an entity; refresh its state.
    pub fn document_uploaded(&self, entity_id: EntityId, now: DateTime<Utc>) -> RecomputeOutcome {
        self.recompute_entity(entity_id, now)
    }

    /// Operator-requested recompute.
    pub fn manual_recalculate(&self, entity_id: EntityId, now: DateTime<Utc>) -> RecomputeOutcome {
        self.recompute_entity(entity_id, now)
    }

    /// Cancel an open obligation instance. Terminal; reminders for it are
    /// dropped.
    pub fn cancel_obligation(
        &self,
        instance_id: InstanceId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<RecomputeOutcome, EngineError> {
        let instance = self.store.transition_status(
            instance_id,
            ObligationStatus::Cancelled,
            Some(reason.into()),
            now,
        )?;
        self.reminders.forget_instance(instance_id);
        Ok(self.recompute_entity(instance.entity_id, now))
    }

    /// The scheduled tick: roll obligations forward, sweep overdue, fire
    /// reminders, flush quiet-hour deferrals, escalate stale alerts, and
    /// refresh every entity with open work.
    pub fn scheduled_tick(&self, now: DateTime<Utc>) -> Result<TickReport, EngineError> {
        let mut report = TickReport::default();
        let today = now.date_naive();

        let created = self.scheduler.roll_forward(&self.store, now)?;
        report.instances_created = created.len();

        let sweep = self.scheduler.sweep_overdue(&self.store, now)?;
        report.newly_overdue = sweep.newly_overdue.len();
        for instance in &sweep.newly_overdue {
            let event = NotificationEvent::new(
                instance.entity_id,
                instance.domain,
                Severity::Critical,
                EventKind::ObligationOverdue,
                format!("obligation for period {} is overdue", instance.period),
                now,
            )
            .with_instance(instance.id);
            self.emit(event, now);
        }

        for instance in self.store.open_instances() {
            if instance.status == ObligationStatus::Overdue {
                continue;
            }
            let pref = self.preferences(instance.entity_id);
            let days = pref.reminder_days(instance.domain);
            for reminder in self.reminders.due_reminders(&instance, &days, today) {
                if !self.reminders.mark_fired(reminder.instance_id, reminder.offset_days, now) {
                    continue;
                }
                report.reminders_fired += 1;
                let event = NotificationEvent::new(
                    instance.entity_id,
                    instance.domain,
                    Severity::Amber,
                    EventKind::Reminder {
                        offset_days: reminder.offset_days,
                    },
                    format!(
                        "obligation due {} — {} day(s) out",
                        instance.due_date, reminder.offset_days
                    ),
                    now,
                )
                .with_instance(instance.id);
                self.emit(event, now);
            }
        }

        report.deferred_flushed = self.flush_deferred(now);
        report.escalations = self.run_escalations(now);

        // Time alone moves states (risk windows, SLAs): refresh every
        // entity with open work, not just the ones touched above.
        let mut entities: HashSet<EntityId> = self
            .store
            .open_instances()
            .iter()
            .map(|i| i.entity_id)
            .collect();
        entities.extend(created.iter().map(|i| i.entity_id));
        entities.extend(sweep.newly_overdue.iter().map(|i| i.entity_id));
        for entity_id in entities {
            match self.recompute_entity(entity_id, now) {
                RecomputeOutcome::Recomputed(_) => report.entities_recomputed += 1,
                RecomputeOutcome::Requeued => report.requeued.push(entity_id),
            }
        }
        report.requeued.sort();
        Ok(report)
    }

    // -- recompute core -----------------------------------------------------

    fn entity_lock(&self, entity_id: EntityId) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(entity_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Recompute one entity's state under its mutex and publish it to the
    /// cache. Emits a state-change event when the overall RAG moved.
    fn recompute_entity(&self, entity_id: EntityId, now: DateTime<Utc>) -> RecomputeOutcome {
        let lock = self.entity_lock(entity_id);
        let Some(_guard) = lock.try_lock_for(self.config.lock_timeout) else {
            tracing::warn!(entity = %entity_id, "entity lock contention, trigger requeued");
            return RecomputeOutcome::Requeued;
        };

        let instances = self.store.open_instances_for_entity(entity_id);
        let definitions = self.store.definitions_snapshot();
        let stalled_runs: HashSet<RunId> = instances
            .iter()
            .filter_map(|i| i.workflow_run_id)
            .filter(|run_id| {
                self.runs
                    .get(run_id)
                    .map(|r| r.is_stalled(now))
                    .unwrap_or(false)
            })
            .collect();

        let state = compute_entity_state(&AggregationInput {
            entity_id,
            instances: &instances,
            definitions: &definitions,
            stalled_runs: &stalled_runs,
            config: self.config.risk,
            now,
        });

        let previous = self.states.insert(entity_id, state.clone());
        let previous_overall = previous.map(|p| p.overall).unwrap_or(RagState::Green);
        if previous_overall != state.overall {
            tracing::info!(
                entity = %entity_id,
                from = %previous_overall,
                to = %state.overall,
                "entity compliance state changed"
            );
            let event = NotificationEvent::new(
                entity_id,
                state
                    .next_action
                    .as_ref()
                    .map(|a| a.domain)
                    .unwrap_or(vigil_core::ComplianceDomain::Corporate),
                severity_for(state.overall),
                EventKind::StateChanged {
                    from: previous_overall,
                    to: state.overall,
                },
                format!(
                    "compliance state moved from {previous_overall} to {}",
                    state.overall
                ),
                now,
            );
            self.emit(event, now);
        }
        RecomputeOutcome::Recomputed(state)
    }

    // -- notifications ------------------------------------------------------

    /// Route and record one event. Fire-and-forget: requests ride the
    /// outbox; nothing here can fail the calling trigger.
    fn emit(&self, mut event: NotificationEvent, now: DateTime<Utc>) -> EventId {
        let pref = self.preferences(event.entity_id);
        let outcome = dispatch(&event, &pref, now);
        event.deliveries = outcome.deliveries;
        for request in outcome.requests {
            self.outbox.push(request, now);
        }
        let id = event.id;
        self.events.write().push(event);
        id
    }

    /// Re-dispatch events whose quiet-hour deferral has elapsed.
    fn flush_deferred(&self, now: DateTime<Utc>) -> usize {
        let mut flushed = 0;
        let mut events = self.events.write();
        for event in events.iter_mut() {
            let due = event.deliveries.iter().any(|d| {
                matches!(d.state, DeliveryState::Deferred { until } if until <= now)
            });
            if !due {
                continue;
            }
            let pref = self.preferences(event.entity_id);
            let outcome = dispatch(event, &pref, now);
            event.deliveries = outcome.deliveries;
            for request in outcome.requests {
                self.outbox.push(request, now);
            }
            flushed += 1;
        }
        flushed
    }

    /// Generate escalation requests for stale unacknowledged alerts.
    fn run_escalations(&self, now: DateTime<Utc>) -> usize {
        let mut escalated = 0;
        let mut events = self.events.write();
        for event in events.iter_mut() {
            let pref = self.preferences(event.entity_id);
            if let Some(request) = escalate(event, &pref, now) {
                self.outbox.push(request, now);
                event.escalated_at = Some(now);
                escalated += 1;
            }
        }
        escalated
    }

    /// Acknowledge an alert, stopping its escalation clock.
    pub fn acknowledge_alert(&self, event_id: EventId, now: DateTime<Utc>) -> Result<(), EngineError> {
        let mut events = self.events.write();
        let event = events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or(EngineError::EventNotFound(event_id))?;
        event.acknowledge(now);
        Ok(())
    }

    // -- queries ------------------------------------------------------------

    /// Last-good compliance state for an entity.
    pub fn get_entity_state(&self, entity_id: EntityId) -> Option<EntityComplianceState> {
        self.states.get(&entity_id).map(|s| s.value().clone())
    }

    /// Most recent alerts for an entity, newest first.
    pub fn get_alerts(&self, entity_id: EntityId, limit: usize) -> Vec<NotificationEvent> {
        self.events
            .read()
            .iter()
            .rev()
            .filter(|e| e.entity_id == entity_id)
            .take(limit)
            .cloned()
            .collect()
    }
}

fn severity_for(state: RagState) -> Severity {
    match state {
        RagState::Green => Severity::Info,
        RagState::Amber => Severity::Amber,
        RagState::Red => Severity::Critical,
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("store", &self.store)
            .field("runs", &self.runs.len())
            .field("entities_cached", &self.states.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
