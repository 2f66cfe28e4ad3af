//! # vigil-engine — Orchestration Façade
//!
//! The single surface the surrounding product integrates against. Wires
//! the obligation store, deadline scheduler, workflow executor, state
//! aggregator, and notification dispatcher together behind per-entity
//! serialization:
//!
//! - inbound triggers: `document_uploaded`, `step_completed`,
//!   `manual_recalculate`, `preferences_updated`, `scheduled_tick`
//! - outbound queries: `get_entity_state`, `get_alerts`,
//!   `get_workflow_run` — always answered from the last-good cache
//!
//! Recomputation is idempotent, so a duplicate trigger (retried webhook,
//! double tick) converges on the same state instead of corrupting it.

pub mod engine;
pub mod error;

pub use engine::{Engine, EngineConfig, RecomputeOutcome, TickReport};
pub use error::EngineError;
