use thiserror::Error;

/// Errors raised by a tool's `process` call.
#[derive(Debug, Error)]
pub enum ToolError {
  /// The input value has a shape the tool cannot handle.
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// The step options could not be interpreted by the tool.
  #[error("invalid options: {0}")]
  InvalidOptions(String),

  /// JSON parsing or serialization failed inside the tool.
  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// Any other failure reported by the tool.
  #[error("{0}")]
  Failed(String),
}

impl ToolError {
  /// Create a generic failure from any message.
  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed(message.into())
  }
}
