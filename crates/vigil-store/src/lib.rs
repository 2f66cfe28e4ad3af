//! # vigil-store — Obligation Store
//!
//! Durable record of compliance obligations: which entities exist, which
//! duties they carry, and every occurrence of every duty with its full
//! status history.
//!
//! ## Append-only history
//!
//! Obligation instances are never deleted. Status changes append a
//! [`StatusTransition`] record; terminal statuses (`completed`,
//! `cancelled`) supersede rather than remove. Downstream audit and dispute
//! features depend on these historical timestamps.
//!
//! ## Concurrency
//!
//! [`MemoryObligationStore`] is thread-safe via `DashMap`. Status
//! transitions run read-validate-update under a single shard write lock
//! (TOCTOU-free), and instance creation enforces (definition, entity,
//! period) uniqueness so the scheduler's roll-forward is idempotent even
//! when it races a per-event recomputation.

pub mod entity;
pub mod obligation;
pub mod store;

// Re-export primary types.
pub use entity::{Entity, LifecycleStage, RegistrationInfo};
pub use obligation::{
    validate_status_transition, ObligationDefinition, ObligationInstance, ObligationStatus,
    StatusTransition,
};
pub use store::{MemoryObligationStore, StoreError};
