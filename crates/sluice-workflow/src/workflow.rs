use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Allocate a new opaque identifier.
pub fn new_id() -> String {
  uuid::Uuid::new_v4().to_string()
}

/// A named, ordered sequence of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
  pub id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub steps: Vec<WorkflowStep>,
  #[serde(default)]
  pub is_favorite: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// One configured reference to a tool within a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
  pub id: String,
  /// Reference into the tool registry. Not validated until run time.
  pub tool_id: String,
  /// Passed verbatim to the tool.
  #[serde(default = "empty_options")]
  pub options: serde_json::Value,
  /// Disabled steps are skipped and pass their input through unchanged.
  #[serde(default)]
  pub disabled: bool,
}

fn empty_options() -> serde_json::Value {
  serde_json::Value::Object(serde_json::Map::new())
}

impl Workflow {
  /// Create a workflow with a fresh id and `created_at == updated_at == now`.
  ///
  /// Steps are stored as given; callers copying steps from another workflow or a
  /// template must regenerate their ids first.
  pub fn new(name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
    let now = Utc::now();
    Self {
      id: new_id(),
      name: name.into(),
      description: None,
      steps,
      is_favorite: false,
      created_at: now,
      updated_at: now,
    }
  }

  /// Refresh `updated_at`, guaranteeing it strictly increases.
  pub fn touch(&mut self) {
    let floor = self.updated_at + TimeDelta::milliseconds(1);
    self.updated_at = Utc::now().max(floor);
  }

  /// Deep copy with a new workflow id, new step ids and fresh timestamps.
  ///
  /// The favorite flag is kept.
  pub fn duplicate(&self) -> Self {
    let mut copy = Workflow::new(self.name.clone(), self.steps.clone());
    copy.description = self.description.clone();
    copy.is_favorite = self.is_favorite;
    copy.regenerate_step_ids();
    copy
  }

  /// Replace every step id with a newly allocated one.
  pub fn regenerate_step_ids(&mut self) {
    for step in &mut self.steps {
      step.id = new_id();
    }
  }

  pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
    self.steps.iter().find(|s| s.id == step_id)
  }

  pub fn step_index(&self, step_id: &str) -> Option<usize> {
    self.steps.iter().position(|s| s.id == step_id)
  }

  pub fn last_step(&self) -> Option<&WorkflowStep> {
    self.steps.last()
  }

  /// Apply a partial update. Absent fields are left as they are.
  pub fn apply(&mut self, patch: WorkflowPatch) {
    if let Some(name) = patch.name {
      self.name = name;
    }
    if let Some(description) = patch.description {
      self.description = description;
    }
    if let Some(is_favorite) = patch.is_favorite {
      self.is_favorite = is_favorite;
    }
  }
}

impl WorkflowStep {
  /// Copy of this step under a new id.
  pub fn duplicate(&self) -> Self {
    Self {
      id: new_id(),
      ..self.clone()
    }
  }

  pub fn apply(&mut self, patch: StepPatch) {
    if let Some(tool_id) = patch.tool_id {
      self.tool_id = tool_id;
    }
    if let Some(options) = patch.options {
      self.options = options;
    }
    if let Some(disabled) = patch.disabled {
      self.disabled = disabled;
    }
  }
}

/// Everything needed to append a step; the id is always allocated by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSeed {
  pub tool_id: String,
  #[serde(default = "empty_options")]
  pub options: serde_json::Value,
  #[serde(default)]
  pub disabled: bool,
}

impl StepSeed {
  pub fn new(tool_id: impl Into<String>) -> Self {
    Self {
      tool_id: tool_id.into(),
      options: empty_options(),
      disabled: false,
    }
  }

  pub fn with_options(mut self, options: serde_json::Value) -> Self {
    self.options = options;
    self
  }

  pub fn disabled(mut self, disabled: bool) -> Self {
    self.disabled = disabled;
    self
  }

  pub fn into_step(self) -> WorkflowStep {
    WorkflowStep {
      id: new_id(),
      tool_id: self.tool_id,
      options: self.options,
      disabled: self.disabled,
    }
  }
}

/// Partial update of workflow metadata.
///
/// `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowPatch {
  pub name: Option<String>,
  pub description: Option<Option<String>>,
  pub is_favorite: Option<bool>,
}

impl WorkflowPatch {
  pub fn rename(name: impl Into<String>) -> Self {
    Self {
      name: Some(name.into()),
      ..Self::default()
    }
  }
}

/// Partial update of a single step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepPatch {
  pub tool_id: Option<String>,
  pub options: Option<serde_json::Value>,
  pub disabled: Option<bool>,
}

impl StepPatch {
  pub fn disabled(disabled: bool) -> Self {
    Self {
      disabled: Some(disabled),
      ..Self::default()
    }
  }

  pub fn options(options: serde_json::Value) -> Self {
    Self {
      options: Some(options),
      ..Self::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn sample() -> Workflow {
    Workflow::new(
      "Sample",
      vec![
        StepSeed::new("text-uppercase").into_step(),
        StepSeed::new("text-reverse")
          .with_options(json!({"keep": true}))
          .disabled(true)
          .into_step(),
      ],
    )
  }

  #[test]
  fn test_touch_is_strictly_monotonic() {
    let mut workflow = sample();
    let mut previous = workflow.updated_at;
    for _ in 0..5 {
      workflow.touch();
      assert!(workflow.updated_at > previous);
      previous = workflow.updated_at;
    }
    assert!(workflow.created_at < workflow.updated_at);
  }

  #[test]
  fn test_duplicate_regenerates_all_ids() {
    let mut original = sample();
    original.is_favorite = true;
    let copy = original.duplicate();

    assert_ne!(copy.id, original.id);
    assert_eq!(copy.steps.len(), original.steps.len());
    for (a, b) in original.steps.iter().zip(&copy.steps) {
      assert_ne!(a.id, b.id);
      assert_eq!(a.tool_id, b.tool_id);
      assert_eq!(a.options, b.options);
      assert_eq!(a.disabled, b.disabled);
    }
    assert!(copy.is_favorite);
  }

  #[test]
  fn test_apply_merges_present_fields() {
    let mut workflow = sample();
    let favorite = workflow.is_favorite;

    workflow.apply(WorkflowPatch::rename("Renamed"));
    assert_eq!(workflow.name, "Renamed");
    assert_eq!(workflow.is_favorite, favorite);

    workflow.apply(WorkflowPatch {
      description: Some(Some("desc".to_string())),
      ..Default::default()
    });
    assert_eq!(workflow.description.as_deref(), Some("desc"));
    assert_eq!(workflow.name, "Renamed");

    workflow.apply(WorkflowPatch {
      description: Some(None),
      ..Default::default()
    });
    assert_eq!(workflow.description, None);
  }

  #[test]
  fn test_step_serde_defaults() {
    let step: WorkflowStep = serde_json::from_value(json!({
      "id": "s1",
      "toolId": "text-trim"
    }))
    .unwrap();

    assert_eq!(step.options, json!({}));
    assert!(!step.disabled);
  }

  #[test]
  fn test_step_patch() {
    let mut step = StepSeed::new("text-trim").into_step();
    let id = step.id.clone();
    step.apply(StepPatch::disabled(true));
    step.apply(StepPatch::options(json!({"x": 1})));

    assert_eq!(step.id, id);
    assert!(step.disabled);
    assert_eq!(step.options, json!({"x": 1}));
  }
}
