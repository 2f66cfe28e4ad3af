//! # vigil-core — Foundational Types
//!
//! The leaf crate of the Vigil compliance orchestration engine. Everything
//! here is a plain value type: no I/O, no clocks, no locks.
//!
//! ## Contents
//!
//! - **Domains** ([`domain`]): the closed set of regulatory domains an
//!   obligation can belong to, and the RAG (red/amber/green) state lattice
//!   used to aggregate them. Every `match` on [`ComplianceDomain`] is
//!   exhaustive — adding a seventh domain is a compile error until every
//!   aggregation path is updated.
//! - **Identifiers** ([`ids`]): UUID-backed newtypes for entities,
//!   obligation definitions and instances, workflow templates and runs, and
//!   notification events, plus the validated [`ActorId`].
//! - **Periods** ([`period`]): fiscal-calendar period arithmetic for
//!   monthly, quarterly, and annual recurring obligations.
//! - **Penalties** ([`penalty`]): per-day-late penalty formulas in integer
//!   minor currency units.
//! - **Errors** ([`error`]): the validation error hierarchy shared by the
//!   upper crates.

pub mod domain;
pub mod error;
pub mod ids;
pub mod penalty;
pub mod period;

// Re-export primary types.
pub use domain::{ComplianceDomain, RagState};
pub use error::ValidationError;
pub use ids::{ActorId, DefinitionId, EntityId, EventId, InstanceId, RunId, TemplateId};
pub use penalty::PenaltyFormula;
pub use period::{FiscalCalendar, Period, Periodicity};
