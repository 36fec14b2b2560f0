//! Run errors.

use sluice_tool::ToolError;

/// Errors that can occur while running a workflow or a single step.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
  /// The tool's `process` call failed. The step is recorded as `error`.
  #[error("step '{step_id}' failed in tool '{tool_id}': {source}")]
  ToolExecution {
    step_id: String,
    tool_id: String,
    #[source]
    source: ToolError,
  },

  /// The run was cancelled before this point.
  #[error("run cancelled")]
  Cancelled,

  /// A single step was requested but the preceding step has no output yet.
  #[error("step {index} needs the output of step '{previous_step_id}', which has not run")]
  PrerequisiteMissing {
    index: usize,
    previous_step_id: String,
  },

  /// The step references a tool that is not registered or cannot process input.
  /// Only raised under [`MissingToolPolicy::Fail`](crate::MissingToolPolicy::Fail).
  #[error("tool '{tool_id}' for step '{step_id}' is not available")]
  MissingCapability { step_id: String, tool_id: String },

  /// Single-step index past the end of the workflow.
  #[error("step index {index} out of range for workflow with {len} steps")]
  StepOutOfRange { index: usize, len: usize },

  /// Another run or single step is in progress on this controller.
  #[error("a run is already in progress")]
  AlreadyRunning,
}
