use serde::{Deserialize, Serialize};

/// What to do when a step's tool is not registered or has no `process`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingToolPolicy {
  /// Record the step as a successful identity pass-through.
  #[default]
  PassThrough,
  /// Record the step as an error and halt the run.
  Fail,
}

/// Configuration for the run controller.
#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
  pub missing_tool: MissingToolPolicy,
}
