//! Next-step suggestions while editing a workflow.

use std::sync::Arc;

use sluice_tool::{ToolDescriptor, ToolRegistry};
use sluice_workflow::Workflow;

/// Maximum number of suggestions returned.
pub const MAX_SUGGESTIONS: usize = 3;

/// Input types that accept any upstream output.
pub const GENERIC_INPUT_TYPES: [&str; 2] = ["text", "any"];

/// Tools that can consume the output of the workflow's last step.
///
/// Only the last tool's primary (first) output type is considered. Candidates
/// are pipeline-eligible tools accepting that type or a generic input type, in
/// registry order, capped at [`MAX_SUGGESTIONS`]. Returns nothing for an empty
/// workflow or when the last tool is unknown or declares no output types.
pub fn suggest_next<R>(workflow: &Workflow, registry: &R) -> Vec<Arc<ToolDescriptor>>
where
  R: ToolRegistry + ?Sized,
{
  let Some(last_step) = workflow.last_step() else {
    return Vec::new();
  };
  let Some(last_tool) = registry.get(&last_step.tool_id) else {
    return Vec::new();
  };
  let Some(output_type) = last_tool.primary_output_type() else {
    return Vec::new();
  };

  registry
    .pipeline_tools()
    .into_iter()
    .filter(|tool| {
      tool.accepts(output_type) || GENERIC_INPUT_TYPES.iter().any(|generic| tool.accepts(generic))
    })
    .take(MAX_SUGGESTIONS)
    .collect()
}
