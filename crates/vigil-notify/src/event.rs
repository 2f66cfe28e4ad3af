//! # Notification Events
//!
//! A [`NotificationEvent`] is an immutable fact ("obligation moved to
//! overdue"). After creation only its per-channel delivery ledger and its
//! acknowledgement timestamp change; the fact itself never does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vigil_core::{ComplianceDomain, EntityId, EventId, InstanceId, RagState, RunId};

use crate::preference::Channel;

// ---------------------------------------------------------------------------
// Severity & kind
// ---------------------------------------------------------------------------

/// Notification severity, ordered least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Amber,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Amber => write!(f, "amber"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// What happened. Closed set, one variant per producer in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// The entity's overall RAG state changed.
    StateChanged { from: RagState, to: RagState },
    /// An obligation instance went overdue.
    ObligationOverdue,
    /// A deadline reminder at the given offset fired.
    Reminder { offset_days: u32 },
    /// A workflow run has a frontier step past its SLA.
    WorkflowStalled,
}

// ---------------------------------------------------------------------------
// Delivery ledger
// ---------------------------------------------------------------------------

/// Why a channel was suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    /// Master toggle off.
    Disabled,
    /// The event's severity is disabled.
    SeverityDisabled,
    /// The channel is individually disabled.
    ChannelDisabled,
    /// Non-critical SMS under the only-critical rule.
    SmsNonCritical,
}

/// Terminal-or-pending delivery state for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryState {
    Sent,
    Suppressed { reason: SuppressReason },
    Deferred { until: DateTime<Utc> },
    /// Delivery exhausted its retries. Terminal, distinct from suppression.
    Failed,
}

/// One entry in an event's per-channel delivery ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub channel: Channel,
    pub state: DeliveryState,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// NotificationEvent
// ---------------------------------------------------------------------------

/// An immutable compliance fact routed to channels by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: EventId,
    pub entity_id: EntityId,
    pub domain: ComplianceDomain,
    pub severity: Severity,
    pub kind: EventKind,
    /// Human-readable summary used as the message body.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    /// Escalation copies of an event never re-escalate.
    pub is_escalation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// When an escalation copy was generated for this event, if ever.
    /// One escalation per event, no matter how long it sits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_at: Option<DateTime<Utc>>,
    pub deliveries: Vec<DeliveryRecord>,
    pub created_at: DateTime<Utc>,
}

impl NotificationEvent {
    /// Create an unacknowledged event with an empty delivery ledger.
    pub fn new(
        entity_id: EntityId,
        domain: ComplianceDomain,
        severity: Severity,
        kind: EventKind,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            entity_id,
            domain,
            severity,
            kind,
            message: message.into(),
            instance_id: None,
            run_id: None,
            is_escalation: false,
            acknowledged_at: None,
            escalated_at: None,
            deliveries: Vec::new(),
            created_at: now,
        }
    }

    pub fn with_instance(mut self, instance_id: InstanceId) -> Self {
        self.instance_id = Some(instance_id);
        self
    }

    pub fn with_run(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Mark acknowledged. First acknowledgement wins; later ones are
    /// no-ops so duplicate clicks cannot move the timestamp.
    pub fn acknowledge(&mut self, now: DateTime<Utc>) {
        if self.acknowledged_at.is_none() {
            self.acknowledged_at = Some(now);
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }
}
