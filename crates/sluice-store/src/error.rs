use thiserror::Error;

/// Error type for storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
  /// No workflow with this id exists.
  #[error("workflow not found: {0}")]
  WorkflowNotFound(String),

  /// The workflow exists but has no step with this id.
  #[error("step '{step_id}' not found in workflow '{workflow_id}'")]
  StepNotFound {
    workflow_id: String,
    step_id: String,
  },

  /// A workflow with this id is already stored.
  #[error("workflow already exists: {0}")]
  AlreadyExists(String),

  /// Workflow names must not be blank.
  #[error("workflow name must not be empty")]
  EmptyName,

  /// Reading or writing the backing file failed.
  #[error("storage io error: {0}")]
  Io(#[from] std::io::Error),

  /// The backing file could not be encoded or decoded.
  #[error("storage serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}
