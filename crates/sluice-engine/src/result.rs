//! Run-time result types. None of these are persisted.

use serde::{Deserialize, Serialize};

/// Status of a single step within a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
  #[default]
  Pending,
  Running,
  Success,
  Error,
}

impl StepStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Success | Self::Error)
  }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
  #[default]
  Idle,
  Running,
  Completed,
  Cancelled,
  Failed,
}

/// Recorded outcome of one step.
///
/// `output` is only set on success, `error` only on error, and `duration_ms`
/// once the step has left `running` after actually executing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
  pub status: StepStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output: Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<u64>,
}

impl StepResult {
  pub fn running() -> Self {
    Self {
      status: StepStatus::Running,
      output: None,
      error: None,
      duration_ms: None,
    }
  }

  pub fn success(output: serde_json::Value, duration_ms: Option<u64>) -> Self {
    Self {
      status: StepStatus::Success,
      output: Some(output),
      error: None,
      duration_ms,
    }
  }

  pub fn error(message: impl Into<String>, duration_ms: Option<u64>) -> Self {
    Self {
      status: StepStatus::Error,
      output: None,
      error: Some(message.into()),
      duration_ms,
    }
  }
}
