//! # Delivery Outbox
//!
//! Buffers accepted send requests until the gateway confirms them, with
//! bounded exponential backoff on failure. Exhausting the retry budget is
//! a terminal `failed` delivery — distinct from suppression, which is a
//! routing decision, not a transport problem.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatch::ChannelSendRequest;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Retry budget and backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per failure.
    pub base_delay_secs: u64,
    /// Backoff ceiling.
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 60,
            max_delay_secs: 3_600,
        }
    }
}

impl RetryPolicy {
    /// Delay after `failures` consecutive failures: `base * 2^(failures-1)`,
    /// clamped to the ceiling.
    fn delay_after(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        let secs = self
            .base_delay_secs
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_secs);
        Duration::seconds(secs as i64)
    }
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// One buffered request and its retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDelivery {
    pub request: ChannelSendRequest,
    /// Attempts made so far (0 before the first try).
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
}

/// Thread-safe retrying buffer between dispatch and the gateway.
#[derive(Debug, Default)]
pub struct DeliveryOutbox {
    policy: RetryPolicy,
    pending: Mutex<HashMap<Uuid, PendingDelivery>>,
}

impl DeliveryOutbox {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Accept a request for delivery, due immediately.
    pub fn push(&self, request: ChannelSendRequest, now: DateTime<Utc>) {
        let id = request.request_id;
        self.pending.lock().insert(
            id,
            PendingDelivery {
                request,
                attempts: 0,
                next_attempt_at: now,
            },
        );
    }

    /// Requests whose next attempt is due, ordered oldest first. Each is
    /// charged one attempt; the caller reports back success or failure.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<PendingDelivery> {
        let mut pending = self.pending.lock();
        let mut out: Vec<PendingDelivery> = pending
            .values()
            .filter(|p| p.next_attempt_at <= now)
            .cloned()
            .collect();
        out.sort_by_key(|p| (p.next_attempt_at, p.request.request_id));
        for item in &out {
            if let Some(p) = pending.get_mut(&item.request.request_id) {
                p.attempts += 1;
            }
        }
        out
    }

    /// The gateway confirmed delivery; drop the entry.
    pub fn record_success(&self, request_id: Uuid) {
        self.pending.lock().remove(&request_id);
    }

    /// The gateway failed. Schedules a retry with exponential backoff, or
    /// returns `false` when the budget is exhausted and the entry is
    /// dropped as terminally failed.
    pub fn record_failure(&self, request_id: Uuid, now: DateTime<Utc>) -> bool {
        let mut pending = self.pending.lock();
        let Some(p) = pending.get_mut(&request_id) else {
            return false;
        };
        if p.attempts >= self.policy.max_attempts {
            tracing::error!(
                request = %request_id,
                event = %p.request.event_id,
                channel = %p.request.channel,
                attempts = p.attempts,
                "delivery failed terminally"
            );
            pending.remove(&request_id);
            return false;
        }
        let delay = self.policy.delay_after(p.attempts);
        p.next_attempt_at = now + delay;
        tracing::warn!(
            request = %request_id,
            attempts = p.attempts,
            retry_in_secs = delay.num_seconds(),
            "delivery failed, retry scheduled"
        );
        true
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DeliveryMode;
    use crate::event::Severity;
    use crate::preference::Channel;
    use chrono::TimeZone;
    use vigil_core::{EntityId, EventId};

    fn request() -> ChannelSendRequest {
        ChannelSendRequest {
            request_id: Uuid::new_v4(),
            event_id: EventId::new(),
            entity_id: EntityId::new(),
            channel: Channel::Email,
            severity: Severity::Amber,
            mode: DeliveryMode::Immediate,
            recipient: None,
            is_escalation: false,
        }
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 20, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn pushed_request_is_immediately_due() {
        let outbox = DeliveryOutbox::new(RetryPolicy::default());
        let req = request();
        outbox.push(req.clone(), t(0));
        let due = outbox.due(t(0));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].request.request_id, req.request_id);

        outbox.record_success(req.request_id);
        assert!(outbox.is_empty());
    }

    #[test]
    fn backoff_doubles_per_failure() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::seconds(60));
        assert_eq!(policy.delay_after(2), Duration::seconds(120));
        assert_eq!(policy.delay_after(3), Duration::seconds(240));
        // Clamped at the ceiling.
        assert_eq!(policy.delay_after(10), Duration::seconds(3_600));
    }

    #[test]
    fn failed_delivery_waits_out_its_backoff() {
        let outbox = DeliveryOutbox::new(RetryPolicy::default());
        let req = request();
        let id = req.request_id;
        outbox.push(req, t(0));
        assert_eq!(outbox.due(t(0)).len(), 1);
        assert!(outbox.record_failure(id, t(1)));

        // Not due again until the 60s backoff elapses.
        assert!(outbox.due(t(30)).is_empty());
        assert_eq!(outbox.due(t(61)).len(), 1);
    }

    #[test]
    fn retry_budget_exhaustion_is_terminal() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay_secs: 1,
            max_delay_secs: 10,
        };
        let outbox = DeliveryOutbox::new(policy);
        let req = request();
        let id = req.request_id;
        outbox.push(req, t(0));

        outbox.due(t(0));
        assert!(outbox.record_failure(id, t(1)));
        outbox.due(t(10));
        // Second attempt failed: budget spent.
        assert!(!outbox.record_failure(id, t(11)));
        assert!(outbox.is_empty());
    }

    #[test]
    fn unknown_request_failure_is_ignored() {
        let outbox = DeliveryOutbox::new(RetryPolicy::default());
        assert!(!outbox.record_failure(Uuid::new_v4(), t(0)));
    }
}
