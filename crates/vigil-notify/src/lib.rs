//! # vigil-notify — Notification Dispatcher
//!
//! Decides, per event and per channel, whether a notification goes out
//! now, later, or not at all. The decision is a pure function of the
//! event, an immutable [`AlertPreference`] snapshot, and the clock;
//! actually talking to an email/SMS/WhatsApp/push gateway is the caller's
//! job via the emitted [`ChannelSendRequest`]s.
//!
//! ## Routing pipeline
//!
//! 1. master toggle — off suppresses every channel
//! 2. severity route — disabled severities suppress
//! 3. quiet hours — non-critical events inside the window are *deferred*
//!    to the window's end, never dropped
//! 4. per-channel enablement, plus the SMS only-critical rule
//! 5. emit — immediately, or tagged for the email digest batch
//!
//! Escalation produces one extra request when an event sits unacknowledged
//! past the configured timeout; escalations are critical-equivalent (they
//! bypass quiet hours) and are tagged so they never re-escalate.

pub mod dispatch;
pub mod event;
pub mod preference;
pub mod retry;

pub use dispatch::{dispatch, escalate, ChannelSendRequest, DeliveryMode, Dispatch};
pub use event::{
    DeliveryRecord, DeliveryState, EventKind, NotificationEvent, Severity, SuppressReason,
};
pub use preference::{
    AlertPreference, Channel, ChannelSettings, DigestMode, DomainAlertConfig, EmailSettings,
    Escalation, PushSettings, QuietHours, SeverityRoute, SeverityRoutes, SmsSettings,
    WhatsappSettings,
};
pub use retry::{DeliveryOutbox, PendingDelivery, RetryPolicy};
