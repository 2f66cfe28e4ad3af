//! # Alert Preferences
//!
//! An [`AlertPreference`] is an immutable snapshot of one entity's
//! notification configuration. The dispatcher reads a snapshot per send
//! decision; preference updates swap the whole snapshot, so a decision
//! never sees a half-applied change.
//!
//! The upstream product kept channel, domain, and severity settings in
//! open string-keyed maps. Here every axis is a closed type: an unknown
//! channel or severity is a compile-time error, not a silently ignored
//! key.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use vigil_core::ComplianceDomain;

use crate::event::Severity;

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// The closed set of delivery channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Whatsapp,
    Push,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Sms => write!(f, "sms"),
            Self::Whatsapp => write!(f, "whatsapp"),
            Self::Push => write!(f, "push"),
        }
    }
}

impl Channel {
    pub fn all() -> &'static [Channel; 4] {
        &[Self::Email, Self::Sms, Self::Whatsapp, Self::Push]
    }
}

/// Email batching behaviour for non-immediate severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DigestMode {
    #[default]
    Immediate,
    Daily,
    Weekly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSettings {
    pub enabled: bool,
    pub digest: DigestMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsSettings {
    pub enabled: bool,
    /// SMS carries real per-message cost; suppress non-critical sends.
    pub only_critical: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhatsappSettings {
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSettings {
    pub enabled: bool,
}

/// Per-channel configuration, one field per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub email: EmailSettings,
    pub sms: SmsSettings,
    pub whatsapp: WhatsappSettings,
    pub push: PushSettings,
}

impl ChannelSettings {
    pub fn is_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email.enabled,
            Channel::Sms => self.sms.enabled,
            Channel::Whatsapp => self.whatsapp.enabled,
            Channel::Push => self.push.enabled,
        }
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            email: EmailSettings {
                enabled: true,
                digest: DigestMode::Immediate,
            },
            sms: SmsSettings {
                enabled: false,
                only_critical: true,
            },
            whatsapp: WhatsappSettings { enabled: false },
            push: PushSettings { enabled: true },
        }
    }
}

// ---------------------------------------------------------------------------
// Domains & severities
// ---------------------------------------------------------------------------

/// Per-domain alerting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainAlertConfig {
    pub enabled: bool,
    /// Days before a due date a reminder fires.
    pub reminder_days: Vec<u32>,
}

impl Default for DomainAlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reminder_days: vec![7, 3, 1],
        }
    }
}

/// Routing for one severity level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityRoute {
    pub enabled: bool,
    pub channels: Vec<Channel>,
    /// Bypass digest batching for this severity.
    pub send_immediately: bool,
}

/// Routing per severity, one field per level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityRoutes {
    pub info: SeverityRoute,
    pub amber: SeverityRoute,
    pub critical: SeverityRoute,
}

impl SeverityRoutes {
    pub fn route(&self, severity: Severity) -> &SeverityRoute {
        match severity {
            Severity::Info => &self.info,
            Severity::Amber => &self.amber,
            Severity::Critical => &self.critical,
        }
    }
}

impl Default for SeverityRoutes {
    fn default() -> Self {
        Self {
            info: SeverityRoute {
                enabled: true,
                channels: vec![Channel::Email],
                send_immediately: false,
            },
            amber: SeverityRoute {
                enabled: true,
                channels: vec![Channel::Email, Channel::Push],
                send_immediately: false,
            },
            critical: SeverityRoute {
                enabled: true,
                channels: vec![Channel::Email, Channel::Sms, Channel::Push],
                send_immediately: true,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Quiet hours & escalation
// ---------------------------------------------------------------------------

/// A daily window during which non-critical notifications are deferred.
///
/// The window is `[start, end)` in the entity's local time and may wrap
/// past midnight (`22:00 → 07:00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// The entity's local-time offset from UTC, in minutes (IST = 330).
    pub utc_offset_minutes: i32,
    /// Critical events ignore the window.
    pub except_critical: bool,
}

impl QuietHours {
    fn offset(&self) -> FixedOffset {
        // Offsets are bounded by validation at the preference boundary;
        // fall back to UTC rather than panic on a bad snapshot.
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
    }

    /// Is `now` inside the window, in the entity's local time?
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset()).time();
        if self.start <= self.end {
            self.start <= local && local < self.end
        } else {
            // Wraparound: 22:00-07:00 covers late evening and early morning.
            local >= self.start || local < self.end
        }
    }

    /// The first instant at or after `now` when the window ends. Deferred
    /// events materialize here.
    pub fn end_instant(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let offset = self.offset();
        let local = now.with_timezone(&offset);
        let mut candidate = local.date_naive().and_time(self.end);
        if candidate <= local.naive_local() {
            candidate += Duration::days(1);
        }
        match candidate.and_local_timezone(offset) {
            chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
                dt.with_timezone(&Utc)
            }
            // Fixed offsets never gap; keep the event moving anyway.
            chrono::LocalResult::None => now,
        }
    }
}

/// Unacknowledged-alert escalation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Escalation {
    pub enabled: bool,
    /// Hours an alert may sit unacknowledged before escalating.
    pub after_hours: u32,
    /// Escalation recipient; `None` falls back to the primary contact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalate_to: Option<String>,
}

// ---------------------------------------------------------------------------
// AlertPreference
// ---------------------------------------------------------------------------

/// One entity's complete notification configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPreference {
    pub notifications_enabled: bool,
    pub channels: ChannelSettings,
    /// Domains absent from the map use [`DomainAlertConfig::default`].
    pub domains: BTreeMap<ComplianceDomain, DomainAlertConfig>,
    pub severity: SeverityRoutes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiet_hours: Option<QuietHours>,
    pub escalation: Escalation,
}

impl AlertPreference {
    pub fn domain_config(&self, domain: ComplianceDomain) -> DomainAlertConfig {
        self.domains.get(&domain).cloned().unwrap_or_default()
    }

    /// Reminder offsets for a domain; empty when the domain is muted.
    pub fn reminder_days(&self, domain: ComplianceDomain) -> Vec<u32> {
        let config = self.domain_config(domain);
        if config.enabled {
            config.reminder_days
        } else {
            Vec::new()
        }
    }
}

impl Default for AlertPreference {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            channels: ChannelSettings::default(),
            domains: BTreeMap::new(),
            severity: SeverityRoutes::default(),
            quiet_hours: None,
            escalation: Escalation::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
            .and_utc()
    }

    fn ist_quiet() -> QuietHours {
        QuietHours {
            start: time(22, 0),
            end: time(7, 0),
            utc_offset_minutes: 330,
            except_critical: true,
        }
    }

    #[test]
    fn wraparound_window_spans_midnight() {
        let q = ist_quiet();
        // 23:30 IST = 18:00 UTC.
        assert!(q.contains(utc(2026, 8, 20, 18, 0)));
        // 02:30 IST = 21:00 UTC previous day.
        assert!(q.contains(utc(2026, 8, 20, 21, 0)));
        // 12:30 IST = 07:00 UTC.
        assert!(!q.contains(utc(2026, 8, 20, 7, 0)));
        // Boundary: 07:00 IST is outside (half-open window).
        assert!(!q.contains(utc(2026, 8, 20, 1, 30)));
        // 06:59 IST is inside.
        assert!(q.contains(utc(2026, 8, 20, 1, 29)));
    }

    #[test]
    fn non_wrapping_window() {
        let q = QuietHours {
            start: time(13, 0),
            end: time(14, 0),
            utc_offset_minutes: 0,
            except_critical: false,
        };
        assert!(q.contains(utc(2026, 8, 20, 13, 30)));
        assert!(!q.contains(utc(2026, 8, 20, 14, 0)));
        assert!(!q.contains(utc(2026, 8, 20, 12, 59)));
    }

    #[test]
    fn end_instant_lands_on_next_window_end() {
        let q = ist_quiet();
        // 23:30 IST on the 19th → window ends 07:00 IST on the 20th,
        // which is 01:30 UTC on the 20th.
        let deferred = q.end_instant(utc(2026, 8, 19, 18, 0));
        assert_eq!(deferred, utc(2026, 8, 20, 1, 30));

        // 02:30 IST on the 20th → same morning's 07:00 IST.
        let deferred = q.end_instant(utc(2026, 8, 19, 21, 0));
        assert_eq!(deferred, utc(2026, 8, 20, 1, 30));
    }

    #[test]
    fn default_preference_routes_critical_everywhere_enabled() {
        let pref = AlertPreference::default();
        assert!(pref.notifications_enabled);
        let critical = pref.severity.route(Severity::Critical);
        assert!(critical.send_immediately);
        assert!(critical.channels.contains(&Channel::Sms));
        // SMS channel itself defaults to disabled though.
        assert!(!pref.channels.is_enabled(Channel::Sms));
    }

    #[test]
    fn muted_domain_yields_no_reminder_days() {
        let mut pref = AlertPreference::default();
        assert_eq!(pref.reminder_days(ComplianceDomain::TaxGst), vec![7, 3, 1]);
        pref.domains.insert(
            ComplianceDomain::TaxGst,
            DomainAlertConfig {
                enabled: false,
                reminder_days: vec![7],
            },
        );
        assert!(pref.reminder_days(ComplianceDomain::TaxGst).is_empty());
    }

    #[test]
    fn preference_serde_roundtrip() {
        let mut pref = AlertPreference::default();
        pref.quiet_hours = Some(ist_quiet());
        pref.escalation = Escalation {
            enabled: true,
            after_hours: 4,
            escalate_to: Some("cfo@acme.example".into()),
        };
        let json = serde_json::to_string(&pref).unwrap();
        let back: AlertPreference = serde_json::from_str(&json).unwrap();
        assert_eq!(pref, back);
    }
}
