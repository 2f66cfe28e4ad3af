//! Engine-level errors, folding in the component error types.

use thiserror::Error;

use vigil_core::{EventId, InstanceId, RunId, TemplateId};
use vigil_store::StoreError;
use vigil_workflow::WorkflowError;

/// Errors from façade operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Obligation store rejected the operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Workflow template or run rejected the operation.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// No template registered under this id.
    #[error("workflow template not found: {0}")]
    TemplateNotFound(TemplateId),

    /// No run known under this id.
    #[error("workflow run not found: {0}")]
    RunNotFound(RunId),

    /// No notification event known under this id.
    #[error("notification event not found: {0}")]
    EventNotFound(EventId),

    /// The instance already completed or was cancelled; no workflow can
    /// start against it.
    #[error("obligation instance is closed: {0}")]
    InstanceClosed(InstanceId),
}
