//! # vigil-schedule — Deadline Scheduler
//!
//! Turns obligation definitions into dated obligation instances and keeps
//! them honest as the clock advances. Three responsibilities:
//!
//! - **Roll-forward**: instantiate every period whose due date falls
//!   inside the lookahead window. Idempotent under concurrent ticks via
//!   the store's (definition, entity, period) uniqueness index — running
//!   the tick twice creates nothing the second time.
//! - **Overdue sweep**: move `pending`/`in_progress` instances past their
//!   due date to `overdue` and refresh their accrued penalty.
//! - **Reminders**: compute which reminder offsets fire today, with a
//!   fired-marker ledger so a recompute never duplicates a send.

pub mod reminder;
pub mod roll;

pub use reminder::{Reminder, ReminderLedger};
pub use roll::{Scheduler, SchedulerConfig, SweepOutcome};
