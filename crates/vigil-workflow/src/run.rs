//! # Workflow Runs
//!
//! One execution of a [`WorkflowTemplate`] against one obligation
//! instance. Each step moves through
//! `blocked → ready → assigned → in_progress → done`, with `skipped`
//! available to automated steps whose precondition is false.
//!
//! A step becomes ready exactly when every dependency is terminal
//! (`done` or `skipped`). The frontier is the set of non-terminal,
//! unblocked steps. Step history is append-only.
//!
//! ## Stalled steps
//!
//! A frontier step past its SLA while still `ready`/`assigned` is
//! *stalled*: it is surfaced to the aggregator (driving RED) and to the
//! dispatcher as an escalation trigger, but it never auto-fails — closing
//! or skipping a step always requires an explicit actor decision.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use vigil_core::{ActorId, InstanceId, RunId, TemplateId};

use crate::error::WorkflowError;
use crate::template::{StepKey, StepType, WorkflowTemplate};

// ---------------------------------------------------------------------------
// StepStatus
// ---------------------------------------------------------------------------

/// Per-step execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Waiting on one or more dependencies.
    Blocked,
    /// Dependencies satisfied; awaiting assignment or action.
    Ready,
    /// Claimed by an actor, not yet started.
    Assigned,
    /// Actor is working on it.
    InProgress,
    /// Completed. Terminal.
    Done,
    /// Automated step whose precondition was false. Terminal.
    Skipped,
}

impl StepStatus {
    /// Terminal steps satisfy downstream dependencies.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Skipped)
    }

    /// Frontier statuses: unblocked and not yet terminal.
    pub fn in_frontier(self) -> bool {
        matches!(self, Self::Ready | Self::Assigned | Self::InProgress)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked => write!(f, "blocked"),
            Self::Ready => write!(f, "ready"),
            Self::Assigned => write!(f, "assigned"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Done => write!(f, "done"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

fn validate_step_transition(
    step: &StepKey,
    from: StepStatus,
    to: StepStatus,
) -> Result<(), WorkflowError> {
    use StepStatus::*;
    let allowed = matches!(
        (from, to),
        (Blocked, Ready)
            | (Ready, Assigned)
            | (Ready, InProgress)
            | (Ready, Done)
            | (Ready, Skipped)
            | (Assigned, InProgress)
            | (Assigned, Done)
            | (InProgress, Done)
    );
    if allowed {
        Ok(())
    } else {
        Err(WorkflowError::InvalidStepTransition {
            step: step.clone(),
            from,
            to,
        })
    }
}

// ---------------------------------------------------------------------------
// StepRecord & WorkflowRun
// ---------------------------------------------------------------------------

/// One append-only step transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTransition {
    pub from: StepStatus,
    pub to: StepStatus,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Execution state of one step within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<ActorId>,
    /// When the step entered the frontier. SLA is measured from here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sla_due: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub transitions: Vec<StepTransition>,
}

impl StepRecord {
    fn new_blocked() -> Self {
        Self {
            status: StepStatus::Blocked,
            assignee: None,
            ready_at: None,
            sla_due: None,
            finished_at: None,
            transitions: Vec::new(),
        }
    }

    fn record(&mut self, to: StepStatus, at: DateTime<Utc>, actor: Option<ActorId>) {
        self.transitions.push(StepTransition {
            from: self.status,
            to,
            at,
            actor,
            note: None,
        });
        self.status = to;
    }
}

/// One execution of a workflow template against one obligation instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: RunId,
    pub template_id: TemplateId,
    pub instance_id: InstanceId,
    steps: BTreeMap<StepKey, StepRecord>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// Create a run with every step blocked, then promote the roots.
    pub fn new(template: &WorkflowTemplate, instance_id: InstanceId, now: DateTime<Utc>) -> Self {
        let mut run = Self {
            id: RunId::new(),
            template_id: template.id,
            instance_id,
            steps: template
                .steps()
                .iter()
                .map(|s| (s.key.clone(), StepRecord::new_blocked()))
                .collect(),
            created_at: now,
            completed_at: None,
        };
        run.promote_ready(template, now);
        run
    }

    fn guard_template(&self, template: &WorkflowTemplate) -> Result<(), WorkflowError> {
        if template.id != self.template_id {
            return Err(WorkflowError::TemplateMismatch { run: self.id });
        }
        Ok(())
    }

    /// Promote every blocked step whose dependencies are all terminal.
    /// Returns the newly ready keys in template topo order.
    fn promote_ready(&mut self, template: &WorkflowTemplate, now: DateTime<Utc>) -> Vec<StepKey> {
        let mut newly_ready = Vec::new();
        for key in template.topo_order() {
            let blocked = self
                .steps
                .get(key)
                .map(|r| r.status == StepStatus::Blocked)
                .unwrap_or(false);
            if !blocked {
                continue;
            }
            let Some(definition) = template.step(key) else {
                continue;
            };
            let satisfied = definition.depends_on.iter().all(|dep| {
                self.steps
                    .get(dep)
                    .map(|r| r.status.is_terminal())
                    .unwrap_or(false)
            });
            if satisfied {
                if let Some(record) = self.steps.get_mut(key) {
                    record.record(StepStatus::Ready, now, None);
                    record.ready_at = Some(now);
                    record.sla_due =
                        Some(now + Duration::days(i64::from(definition.sla_days)));
                    newly_ready.push(key.clone());
                }
            }
        }
        newly_ready
    }

    fn step_mut(&mut self, key: &StepKey) -> Result<&mut StepRecord, WorkflowError> {
        self.steps
            .get_mut(key)
            .ok_or_else(|| WorkflowError::UnknownStep(key.clone()))
    }

    /// Assign a frontier step to an actor.
    pub fn assign(
        &mut self,
        key: &StepKey,
        actor: ActorId,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if self.completed_at.is_some() {
            return Err(WorkflowError::RunComplete(self.id));
        }
        let record = self.step_mut(key)?;
        validate_step_transition(key, record.status, StepStatus::Assigned)?;
        record.record(StepStatus::Assigned, now, Some(actor.clone()));
        record.assignee = Some(actor);
        Ok(())
    }

    /// Mark a step as started by its actor.
    pub fn start(
        &mut self,
        key: &StepKey,
        actor: ActorId,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if self.completed_at.is_some() {
            return Err(WorkflowError::RunComplete(self.id));
        }
        let record = self.step_mut(key)?;
        validate_step_transition(key, record.status, StepStatus::InProgress)?;
        record.record(StepStatus::InProgress, now, Some(actor.clone()));
        record.assignee.get_or_insert(actor);
        Ok(())
    }

    /// Complete a step and advance the frontier.
    ///
    /// Returns the keys that became ready as a result, in topo order.
    /// Completing the last step stamps `completed_at`.
    pub fn complete(
        &mut self,
        template: &WorkflowTemplate,
        key: &StepKey,
        actor: ActorId,
        now: DateTime<Utc>,
    ) -> Result<Vec<StepKey>, WorkflowError> {
        self.guard_template(template)?;
        if self.completed_at.is_some() {
            return Err(WorkflowError::RunComplete(self.id));
        }
        let record = self.step_mut(key)?;
        validate_step_transition(key, record.status, StepStatus::Done)?;
        record.record(StepStatus::Done, now, Some(actor.clone()));
        record.assignee.get_or_insert(actor);
        record.finished_at = Some(now);

        let newly_ready = self.promote_ready(template, now);
        if self.all_terminal() {
            self.completed_at = Some(now);
        }
        Ok(newly_ready)
    }

    /// Skip an automated step whose precondition is false.
    ///
    /// Only automated steps can be skipped, and only from `ready` — the
    /// precondition is evaluated when the step enters the frontier.
    pub fn skip(
        &mut self,
        template: &WorkflowTemplate,
        key: &StepKey,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<StepKey>, WorkflowError> {
        self.guard_template(template)?;
        if self.completed_at.is_some() {
            return Err(WorkflowError::RunComplete(self.id));
        }
        let step_type = template
            .step(key)
            .ok_or_else(|| WorkflowError::UnknownStep(key.clone()))?
            .step_type;
        if step_type != StepType::Automated {
            return Err(WorkflowError::NotAutomated(key.clone()));
        }
        let record = self.step_mut(key)?;
        validate_step_transition(key, record.status, StepStatus::Skipped)?;
        record.record(StepStatus::Skipped, now, None);
        if let Some(last) = record.transitions.last_mut() {
            last.note = Some(reason.into());
        }
        record.finished_at = Some(now);

        let newly_ready = self.promote_ready(template, now);
        if self.all_terminal() {
            self.completed_at = Some(now);
        }
        Ok(newly_ready)
    }

    fn all_terminal(&self) -> bool {
        self.steps.values().all(|r| r.status.is_terminal())
    }

    /// The current frontier, in key order.
    pub fn frontier(&self) -> Vec<StepKey> {
        self.steps
            .iter()
            .filter(|(_, r)| r.status.in_frontier())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Frontier steps past their SLA with no assignee action yet
    /// (`ready` or `assigned`; a step already `in_progress` is being
    /// worked, not stalled).
    pub fn stalled_steps(&self, now: DateTime<Utc>) -> Vec<StepKey> {
        self.steps
            .iter()
            .filter(|(_, r)| {
                matches!(r.status, StepStatus::Ready | StepStatus::Assigned)
                    && r.sla_due.map(|due| now > due).unwrap_or(false)
            })
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Whether the run has stalled work right now.
    pub fn is_stalled(&self, now: DateTime<Utc>) -> bool {
        !self.stalled_steps(now).is_empty()
    }

    /// All steps are terminal.
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Look up one step's record.
    pub fn step(&self, key: &StepKey) -> Option<&StepRecord> {
        self.steps.get(key)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
