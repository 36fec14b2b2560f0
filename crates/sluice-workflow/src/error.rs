use thiserror::Error;

/// Errors produced by the import/export boundary.
#[derive(Debug, Error)]
pub enum FormatError {
  /// The document does not have the required shape.
  #[error("invalid workflow document: {message}")]
  InvalidFormat { message: String },

  /// The document text is not valid JSON.
  #[error("failed to parse workflow document")]
  Parse(#[source] serde_json::Error),

  /// The workflow could not be serialized.
  #[error("failed to serialize workflow")]
  Serialize(#[source] serde_json::Error),
}

impl FormatError {
  pub(crate) fn invalid(message: impl Into<String>) -> Self {
    Self::InvalidFormat {
      message: message.into(),
    }
  }
}
