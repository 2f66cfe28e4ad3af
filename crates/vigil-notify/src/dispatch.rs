//! # Dispatch Decisions
//!
//! [`dispatch`] runs one event through the routing pipeline and returns
//! both the send requests that survived and the delivery-ledger records
//! explaining every channel's fate. [`escalate`] produces the single
//! extra request for an unacknowledged alert past its timeout.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vigil_core::{EntityId, EventId};

use crate::event::{
    DeliveryRecord, DeliveryState, NotificationEvent, Severity, SuppressReason,
};
use crate::preference::{AlertPreference, Channel, DigestMode};

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// When a surviving request should actually leave the building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Hand to the gateway now.
    Immediate,
    /// Queue into the email digest batch.
    Digest(DigestMode),
}

/// One channel-specific send request for the gateway collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSendRequest {
    pub request_id: Uuid,
    pub event_id: EventId,
    pub entity_id: EntityId,
    pub channel: Channel,
    pub severity: Severity,
    pub mode: DeliveryMode,
    /// Explicit recipient override (escalation target); `None` routes to
    /// the entity's configured contact for the channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Escalation requests never re-escalate.
    pub is_escalation: bool,
}

/// The full outcome of one dispatch decision.
#[derive(Debug, Clone, Default)]
pub struct Dispatch {
    pub requests: Vec<ChannelSendRequest>,
    /// Ledger records for every routed channel, sent or not.
    pub deliveries: Vec<DeliveryRecord>,
    /// Set when quiet hours deferred the whole event.
    pub deferred_until: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// dispatch
// ---------------------------------------------------------------------------

/// Route one event against a preference snapshot.
///
/// Pure: no channel is actually contacted here. The caller persists the
/// ledger records onto the event and forwards the requests to the
/// gateway (or the outbox).
pub fn dispatch(
    event: &NotificationEvent,
    pref: &AlertPreference,
    now: DateTime<Utc>,
) -> Dispatch {
    let mut out = Dispatch::default();

    // 1. Master toggle.
    if !pref.notifications_enabled {
        for &channel in Channel::all() {
            out.deliveries.push(suppressed(channel, SuppressReason::Disabled, now));
        }
        return out;
    }

    // 2. Severity routing.
    let route = pref.severity.route(event.severity);
    if !route.enabled {
        for &channel in &route.channels {
            out.deliveries
                .push(suppressed(channel, SuppressReason::SeverityDisabled, now));
        }
        return out;
    }

    // 3. Quiet hours. Deferral, not suppression: the event re-enters
    // dispatch when the window ends. Critical events bypass the window
    // when except_critical is set; escalations are critical-equivalent.
    if let Some(quiet) = &pref.quiet_hours {
        let exempt = (event.severity == Severity::Critical && quiet.except_critical)
            || event.is_escalation;
        if quiet.contains(now) && !exempt {
            let until = quiet.end_instant(now);
            tracing::debug!(event = %event.id, %until, "deferred by quiet hours");
            for &channel in &route.channels {
                out.deliveries.push(DeliveryRecord {
                    channel,
                    state: DeliveryState::Deferred { until },
                    at: now,
                });
            }
            out.deferred_until = Some(until);
            return out;
        }
    }

    // 4 & 5. Per-channel enablement, then emit.
    for &channel in &route.channels {
        if !pref.channels.is_enabled(channel) {
            out.deliveries
                .push(suppressed(channel, SuppressReason::ChannelDisabled, now));
            continue;
        }
        if channel == Channel::Sms
            && pref.channels.sms.only_critical
            && event.severity != Severity::Critical
        {
            out.deliveries
                .push(suppressed(channel, SuppressReason::SmsNonCritical, now));
            continue;
        }

        let mode = match (channel, route.send_immediately, pref.channels.email.digest) {
            (Channel::Email, false, digest @ (DigestMode::Daily | DigestMode::Weekly)) => {
                DeliveryMode::Digest(digest)
            }
            _ => DeliveryMode::Immediate,
        };

        out.deliveries.push(DeliveryRecord {
            channel,
            state: DeliveryState::Sent,
            at: now,
        });
        out.requests.push(ChannelSendRequest {
            request_id: Uuid::new_v4(),
            event_id: event.id,
            entity_id: event.entity_id,
            channel,
            severity: event.severity,
            mode,
            recipient: None,
            is_escalation: event.is_escalation,
        });
    }
    out
}

fn suppressed(channel: Channel, reason: SuppressReason, at: DateTime<Utc>) -> DeliveryRecord {
    DeliveryRecord {
        channel,
        state: DeliveryState::Suppressed { reason },
        at,
    }
}

// ---------------------------------------------------------------------------
// escalate
// ---------------------------------------------------------------------------

/// The extra request for an alert unacknowledged past the timeout, or
/// `None` when escalation does not apply.
///
/// Escalations are critical-equivalent: they ignore quiet hours and go
/// out immediately, on email, tagged so they never escalate again.
pub fn escalate(
    event: &NotificationEvent,
    pref: &AlertPreference,
    now: DateTime<Utc>,
) -> Option<ChannelSendRequest> {
    if !pref.escalation.enabled
        || event.is_escalation
        || event.is_acknowledged()
        || event.escalated_at.is_some()
        || !pref.notifications_enabled
    {
        return None;
    }
    let deadline = event.created_at + Duration::hours(i64::from(pref.escalation.after_hours));
    if now < deadline {
        return None;
    }
    tracing::info!(
        event = %event.id,
        entity = %event.entity_id,
        after_hours = pref.escalation.after_hours,
        "escalating unacknowledged alert"
    );
    Some(ChannelSendRequest {
        request_id: Uuid::new_v4(),
        event_id: event.id,
        entity_id: event.entity_id,
        channel: Channel::Email,
        severity: Severity::Critical,
        mode: DeliveryMode::Immediate,
        recipient: pref.escalation.escalate_to.clone(),
        is_escalation: true,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
