use serde_json::{Value, json};

use crate::workflow::{StepSeed, WorkflowStep};

/// A named starting point for a new workflow.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
  pub id: &'static str,
  pub name: &'static str,
  pub description: &'static str,
  steps: Vec<StepSeed>,
}

impl WorkflowTemplate {
  fn new(id: &'static str, name: &'static str, description: &'static str) -> Self {
    Self {
      id,
      name,
      description,
      steps: Vec::new(),
    }
  }

  fn step(mut self, tool_id: &str, options: Value) -> Self {
    self.steps.push(StepSeed::new(tool_id).with_options(options));
    self
  }

  /// Tool ids of the template's steps, in order.
  pub fn tool_ids(&self) -> impl Iterator<Item = &str> {
    self.steps.iter().map(|s| s.tool_id.as_str())
  }

  /// Materialize the template's steps, each with a newly allocated id.
  pub fn instantiate(&self) -> Vec<WorkflowStep> {
    self
      .steps
      .iter()
      .cloned()
      .map(StepSeed::into_step)
      .collect()
  }
}

/// Templates shipped with sluice. They only reference built-in tools.
pub fn builtin_templates() -> Vec<WorkflowTemplate> {
  vec![
    WorkflowTemplate::new(
      "tidy-lines",
      "Tidy lines",
      "Trim the text, then sort and de-duplicate its lines",
    )
    .step("text-trim", json!({}))
    .step("lines-sort", json!({}))
    .step("lines-dedupe", json!({})),
    WorkflowTemplate::new(
      "pretty-json",
      "Pretty JSON",
      "Parse JSON text and re-indent it with two spaces",
    )
    .step("json-parse", json!({}))
    .step("json-format", json!({"indent": 2})),
    WorkflowTemplate::new(
      "shout-backwards",
      "Shout backwards",
      "Uppercase the text and reverse it",
    )
    .step("text-uppercase", json!({}))
    .step("text-reverse", json!({})),
  ]
}

/// Look up a built-in template by id.
pub fn find_template(id: &str) -> Option<WorkflowTemplate> {
  builtin_templates().into_iter().find(|t| t.id == id)
}
