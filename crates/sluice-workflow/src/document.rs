//! Portable workflow document.
//!
//! The exported document is the workflow's own fields flattened next to a
//! `version` marker:
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "id": "...",
//!   "name": "Clean up CSV",
//!   "steps": [{ "id": "...", "toolId": "text-trim", "options": {}, "disabled": false }],
//!   "isFavorite": false,
//!   "createdAt": "...",
//!   "updatedAt": "..."
//! }
//! ```
//!
//! Import only requires `steps` to be an array. Identifiers in the document are
//! never trusted: the imported workflow and every step get fresh ids.

use serde::Serialize;
use serde_json::Value;

use crate::error::FormatError;
use crate::workflow::{StepSeed, Workflow};

/// Document format version written on export.
pub const FORMAT_VERSION: &str = "1.0";

const UNTITLED: &str = "Untitled workflow";

#[derive(Serialize)]
struct WorkflowDocument<'a> {
  version: &'static str,
  #[serde(flatten)]
  workflow: &'a Workflow,
}

/// Convert a workflow into its portable document.
pub fn export_workflow(workflow: &Workflow) -> Result<Value, FormatError> {
  serde_json::to_value(WorkflowDocument {
    version: FORMAT_VERSION,
    workflow,
  })
  .map_err(FormatError::Serialize)
}

/// Export as pretty-printed JSON text, suitable for files and sharing.
pub fn export_to_string(workflow: &Workflow) -> Result<String, FormatError> {
  let document = export_workflow(workflow)?;
  serde_json::to_string_pretty(&document).map_err(FormatError::Serialize)
}

/// Build a new workflow from a document.
///
/// The result is named `"{name} (Imported)"`, carries over `description` and
/// `isFavorite`, and has freshly generated workflow and step ids. Tool ids are
/// not checked against any registry.
pub fn import_workflow(document: &Value) -> Result<Workflow, FormatError> {
  let steps = document
    .get("steps")
    .and_then(Value::as_array)
    .ok_or_else(|| FormatError::invalid("`steps` must be an array"))?;

  let steps = steps
    .iter()
    .enumerate()
    .map(|(index, step)| import_step(index, step))
    .collect::<Result<Vec<_>, _>>()?;

  let name = document
    .get("name")
    .and_then(Value::as_str)
    .unwrap_or(UNTITLED);

  let mut workflow = Workflow::new(format!("{} (Imported)", name), steps);
  workflow.description = document
    .get("description")
    .and_then(Value::as_str)
    .map(str::to_string);
  workflow.is_favorite = document
    .get("isFavorite")
    .and_then(Value::as_bool)
    .unwrap_or(false);

  Ok(workflow)
}

/// Parse JSON text and import it.
pub fn import_from_str(text: &str) -> Result<Workflow, FormatError> {
  let document: Value = serde_json::from_str(text).map_err(FormatError::Parse)?;
  import_workflow(&document)
}

fn import_step(index: usize, step: &Value) -> Result<crate::WorkflowStep, FormatError> {
  let tool_id = step
    .get("toolId")
    .and_then(Value::as_str)
    .ok_or_else(|| FormatError::invalid(format!("step {} has no `toolId`", index)))?;

  let mut seed = StepSeed::new(tool_id);
  if let Some(options) = step.get("options").filter(|o| !o.is_null()) {
    seed = seed.with_options(options.clone());
  }
  seed = seed.disabled(
    step
      .get("disabled")
      .and_then(Value::as_bool)
      .unwrap_or(false),
  );

  Ok(seed.into_step())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn sample() -> Workflow {
    let mut workflow = Workflow::new(
      "Clean text",
      vec![
        StepSeed::new("text-trim").into_step(),
        StepSeed::new("text-replace")
          .with_options(json!({"from": "a", "to": "b"}))
          .into_step(),
        StepSeed::new("text-uppercase").disabled(true).into_step(),
      ],
    );
    workflow.description = Some("trims and replaces".to_string());
    workflow.is_favorite = true;
    workflow
  }

  #[test]
  fn test_export_is_flat_superset() {
    let workflow = sample();
    let document = export_workflow(&workflow).unwrap();

    assert_eq!(document["version"], "1.0");
    assert_eq!(document["id"], workflow.id.as_str());
    assert_eq!(document["name"], "Clean text");
    assert_eq!(document["isFavorite"], true);
    assert_eq!(document["steps"][1]["toolId"], "text-replace");
    assert!(document.get("createdAt").is_some());
    assert!(document.get("updatedAt").is_some());
  }

  #[test]
  fn test_round_trip_preserves_steps_and_regenerates_ids() {
    let workflow = sample();
    let imported = import_workflow(&export_workflow(&workflow).unwrap()).unwrap();

    assert_ne!(imported.id, workflow.id);
    assert_eq!(imported.name, "Clean text (Imported)");
    assert_eq!(imported.description, workflow.description);
    assert!(imported.is_favorite);
    assert_eq!(imported.steps.len(), workflow.steps.len());
    for (original, copy) in workflow.steps.iter().zip(&imported.steps) {
      assert_ne!(original.id, copy.id);
      assert_eq!(original.tool_id, copy.tool_id);
      assert_eq!(original.options, copy.options);
      assert_eq!(original.disabled, copy.disabled);
    }
  }

  #[test]
  fn test_import_requires_steps_array() {
    for document in [
      json!({"name": "x"}),
      json!({"name": "x", "steps": "nope"}),
      json!({"name": "x", "steps": null}),
      json!([1, 2, 3]),
    ] {
      let err = import_workflow(&document).unwrap_err();
      assert!(matches!(err, FormatError::InvalidFormat { .. }), "{document}");
    }
  }

  #[test]
  fn test_import_defaults_optional_fields() {
    let imported = import_workflow(&json!({
      "steps": [{"toolId": "text-trim"}]
    }))
    .unwrap();

    assert_eq!(imported.name, "Untitled workflow (Imported)");
    assert_eq!(imported.description, None);
    assert!(!imported.is_favorite);
    assert_eq!(imported.steps[0].options, json!({}));
    assert!(!imported.steps[0].disabled);
  }

  #[test]
  fn test_import_rejects_step_without_tool() {
    let err = import_workflow(&json!({
      "name": "x",
      "steps": [{"toolId": "ok"}, {"options": {}}]
    }))
    .unwrap_err();

    assert_eq!(
      err.to_string(),
      "invalid workflow document: step 1 has no `toolId`"
    );
  }

  #[test]
  fn test_string_round_trip() {
    let workflow = sample();
    let text = export_to_string(&workflow).unwrap();
    let imported = import_from_str(&text).unwrap();
    assert_eq!(imported.steps.len(), 3);

    assert!(matches!(
      import_from_str("{not json"),
      Err(FormatError::Parse(_))
    ));
  }
}
