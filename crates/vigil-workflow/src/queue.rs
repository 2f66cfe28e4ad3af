//! # Work Queues
//!
//! Bounded queues feeding QC review and ops task assignment. Candidate
//! items are ordered by a composite key:
//!
//! 1. priority rank, descending (critical=5 … low=1)
//! 2. SLA deadline, ascending (soonest first)
//! 3. time in queue, ascending (oldest first)
//!
//! Auto-assign is a bulk operation: it repeatedly pulls the next
//! unassigned candidate and hands it to the eligible actor with the
//! fewest currently assigned/in-progress items, breaking remaining ties
//! by actor id for determinism, until the queue or the actor pool is
//! exhausted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vigil_core::{ActorId, RunId};

use crate::template::{Priority, StepKey};

// ---------------------------------------------------------------------------
// Items & actors
// ---------------------------------------------------------------------------

/// One queued unit of work (a workflow step awaiting an actor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub item_id: Uuid,
    pub run_id: RunId,
    pub step_key: StepKey,
    pub priority: Priority,
    pub sla_due: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<ActorId>,
}

impl QueueItem {
    /// Create an unassigned item.
    pub fn new(
        run_id: RunId,
        step_key: StepKey,
        priority: Priority,
        sla_due: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            item_id: Uuid::new_v4(),
            run_id,
            step_key,
            priority,
            sla_due,
            enqueued_at: now,
            assigned_to: None,
        }
    }

    /// Composite ordering key. Priority rank is negated so a plain
    /// ascending sort yields the assignment order.
    fn order_key(&self) -> (i16, DateTime<Utc>, DateTime<Utc>, Uuid) {
        (
            -(self.priority.rank() as i16),
            self.sla_due,
            self.enqueued_at,
            self.item_id,
        )
    }
}

/// An eligible actor and their current open-item load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorLoad {
    pub actor: ActorId,
    /// Items currently assigned or in progress for this actor.
    pub load: usize,
}

impl ActorLoad {
    pub fn new(actor: ActorId, load: usize) -> Self {
        Self { actor, load }
    }
}

/// One assignment produced by auto-assign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub item_id: Uuid,
    pub run_id: RunId,
    pub step_key: StepKey,
    pub actor: ActorId,
}

// ---------------------------------------------------------------------------
// WorkQueue
// ---------------------------------------------------------------------------

/// A named work queue (e.g. "qc_review", "ops_tasks").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkQueue {
    pub name: String,
    items: Vec<QueueItem>,
}

impl WorkQueue {
    /// Create an empty queue.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    /// Add an item. Re-enqueueing the same (run, step) is a no-op so
    /// duplicate frontier notifications cannot double-queue work.
    pub fn enqueue(&mut self, item: QueueItem) {
        let exists = self
            .items
            .iter()
            .any(|i| i.run_id == item.run_id && i.step_key == item.step_key);
        if !exists {
            self.items.push(item);
        }
    }

    /// Remove an item (its step completed or was cancelled).
    pub fn remove(&mut self, run_id: RunId, step_key: &StepKey) -> Option<QueueItem> {
        let idx = self
            .items
            .iter()
            .position(|i| i.run_id == run_id && &i.step_key == step_key)?;
        Some(self.items.remove(idx))
    }

    /// The next unassigned candidate under the composite ordering.
    pub fn next_unassigned(&self) -> Option<&QueueItem> {
        self.items
            .iter()
            .filter(|i| i.assigned_to.is_none())
            .min_by_key(|i| i.order_key())
    }

    /// Assign candidates to actors until the queue or the actor pool is
    /// exhausted. `actors` carries each actor's pre-existing load and is
    /// updated as items are handed out.
    pub fn auto_assign(&mut self, actors: &mut [ActorLoad]) -> Vec<Assignment> {
        let mut assignments = Vec::new();
        if actors.is_empty() {
            return assignments;
        }
        loop {
            let Some(item_id) = self.next_unassigned().map(|i| i.item_id) else {
                break;
            };
            // Least-loaded actor, ties broken by actor id.
            let Some(chosen) = actors
                .iter_mut()
                .min_by(|a, b| a.load.cmp(&b.load).then(a.actor.cmp(&b.actor)))
            else {
                break;
            };
            let actor = chosen.actor.clone();
            chosen.load += 1;
            let Some(item) = self.items.iter_mut().find(|i| i.item_id == item_id) else {
                break;
            };
            item.assigned_to = Some(actor.clone());
            tracing::debug!(queue = %self.name, step = %item.step_key, actor = %actor, "step auto-assigned");
            assignments.push(Assignment {
                item_id: item.item_id,
                run_id: item.run_id,
                step_key: item.step_key.clone(),
                actor,
            });
        }
        assignments
    }

    /// All items, in assignment order.
    pub fn items(&self) -> Vec<&QueueItem> {
        let mut out: Vec<&QueueItem> = self.items.iter().collect();
        out.sort_by_key(|i| i.order_key());
        out
    }

    /// Unassigned item count.
    pub fn backlog(&self) -> usize {
        self.items.iter().filter(|i| i.assigned_to.is_none()).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
