use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;

/// The invocation half of a tool capability.
///
/// Implementations may suspend (network, filesystem, heavy compute on a
/// blocking pool). The engine awaits exactly one `process` call at a time.
#[async_trait]
pub trait ToolProcess: Send + Sync {
  /// Transform `input` using the step's opaque `options`.
  async fn process(&self, input: Value, options: &Value) -> Result<Value, ToolError>;
}

/// Adapter turning a synchronous closure into a [`ToolProcess`].
pub struct FnProcess<F>(pub F);

#[async_trait]
impl<F> ToolProcess for FnProcess<F>
where
  F: Fn(Value, &Value) -> Result<Value, ToolError> + Send + Sync,
{
  async fn process(&self, input: Value, options: &Value) -> Result<Value, ToolError> {
    (self.0)(input, options)
  }
}

/// Capability descriptor for one tool in the registry.
///
/// `input_types`/`output_types` are absent for tools that are not meant to be
/// chained; `process` is absent for display-only tools.
#[derive(Clone)]
pub struct ToolDescriptor {
  pub id: String,
  pub name: String,
  pub input_types: Option<Vec<String>>,
  pub output_types: Option<Vec<String>>,
  pub process: Option<Arc<dyn ToolProcess>>,
}

impl ToolDescriptor {
  /// Create a descriptor with no declared types and no capability.
  pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      input_types: None,
      output_types: None,
      process: None,
    }
  }

  pub fn with_input_types<I, S>(mut self, types: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.input_types = Some(types.into_iter().map(Into::into).collect());
    self
  }

  pub fn with_output_types<I, S>(mut self, types: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.output_types = Some(types.into_iter().map(Into::into).collect());
    self
  }

  pub fn with_process(mut self, process: impl ToolProcess + 'static) -> Self {
    self.process = Some(Arc::new(process));
    self
  }

  /// Attach a synchronous closure as the tool's capability.
  pub fn with_fn<F>(self, f: F) -> Self
  where
    F: Fn(Value, &Value) -> Result<Value, ToolError> + Send + Sync + 'static,
  {
    self.with_process(FnProcess(f))
  }

  /// A tool is pipeline-eligible iff it declares both input and output types.
  pub fn is_pipeline_eligible(&self) -> bool {
    self.input_types.is_some() && self.output_types.is_some()
  }

  /// The primary declared output type, if any.
  pub fn primary_output_type(&self) -> Option<&str> {
    self
      .output_types
      .as_ref()
      .and_then(|types| types.first())
      .map(String::as_str)
  }

  /// Whether the tool declares `data_type` among its input types.
  pub fn accepts(&self, data_type: &str) -> bool {
    self
      .input_types
      .as_ref()
      .is_some_and(|types| types.iter().any(|t| t == data_type))
  }
}

impl fmt::Debug for ToolDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ToolDescriptor")
      .field("id", &self.id)
      .field("name", &self.name)
      .field("input_types", &self.input_types)
      .field("output_types", &self.output_types)
      .field("process", &self.process.as_ref().map(|_| "<process>"))
      .finish()
  }
}
