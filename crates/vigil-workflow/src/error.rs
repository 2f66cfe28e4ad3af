//! # Workflow Errors
//!
//! Validation errors are raised at template registration and never reach
//! execution; execution errors cover invalid step transitions and unknown
//! references at run time.

use thiserror::Error;

use vigil_core::RunId;

use crate::run::StepStatus;
use crate::template::StepKey;

/// Errors from workflow template validation and run execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Step key was empty or whitespace-only.
    #[error("step key must be a non-empty string")]
    InvalidStepKey,

    /// A step key appears more than once in a template.
    #[error("duplicate step key in template: {0}")]
    DuplicateStepKey(StepKey),

    /// A step depends on a key that does not exist in the same template.
    #[error("step {step} depends on unknown key {dependency}")]
    UnknownDependency { step: StepKey, dependency: StepKey },

    /// A step depends on itself.
    #[error("step {0} depends on itself")]
    SelfDependency(StepKey),

    /// The dependency graph contains a cycle. The listed steps are those
    /// left unsorted by Kahn's algorithm.
    #[error("dependency cycle among steps: {0:?}")]
    CycleDetected(Vec<StepKey>),

    /// A template must contain at least one step.
    #[error("template has no steps")]
    EmptyTemplate,

    /// Step key not present in the run's template.
    #[error("unknown step: {0}")]
    UnknownStep(StepKey),

    /// Transition not allowed by the per-step state machine.
    #[error("invalid step transition for {step}: {from} -> {to}")]
    InvalidStepTransition {
        step: StepKey,
        from: StepStatus,
        to: StepStatus,
    },

    /// Only automated steps may be skipped.
    #[error("step {0} is not automated and cannot be skipped")]
    NotAutomated(StepKey),

    /// The run has already completed; no further transitions accepted.
    #[error("workflow run already complete: {0}")]
    RunComplete(RunId),

    /// A run was created from a different template than the caller passed.
    #[error("run {run} belongs to a different template")]
    TemplateMismatch { run: RunId },
}
