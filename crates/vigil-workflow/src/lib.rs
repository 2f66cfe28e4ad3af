//! # vigil-workflow — Workflow Graph Executor
//!
//! Runs the ordered task graph that discharges a single obligation
//! instance: ops tasks, client tasks, QA review, and automated steps.
//!
//! ## Structure
//!
//! - [`template`]: workflow templates as explicit validated graphs. The
//!   dependency list of step keys is resolved into upstream/downstream
//!   edge maps exactly once at registration; cycles, dangling references,
//!   and duplicate keys are rejected before any run can be created.
//! - [`run`]: one execution of a template. Per-step state machine
//!   `blocked → ready → assigned → in_progress → done` (plus `skipped` for
//!   automated steps whose precondition is false), frontier maintenance,
//!   and stalled-step detection. Steps past their SLA are surfaced, never
//!   auto-failed.
//! - [`queue`]: bounded work queues for QC review and ops tasks, ordered
//!   by (priority, SLA deadline, queue age) with load-balanced bulk
//!   auto-assignment.

pub mod error;
pub mod queue;
pub mod run;
pub mod template;

// Re-export primary types.
pub use error::WorkflowError;
pub use queue::{ActorLoad, Assignment, QueueItem, WorkQueue};
pub use run::{StepRecord, StepStatus, StepTransition, WorkflowRun};
pub use template::{Priority, StepDefinition, StepKey, StepType, WorkflowTemplate};
