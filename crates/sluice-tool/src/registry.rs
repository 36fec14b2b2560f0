use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptor::ToolDescriptor;

/// Read-only lookup from tool id to capability descriptor.
pub trait ToolRegistry: Send + Sync {
  /// Look up a tool by id.
  fn get(&self, tool_id: &str) -> Option<Arc<ToolDescriptor>>;

  /// All tools, in registration order.
  fn list(&self) -> Vec<Arc<ToolDescriptor>>;

  /// Tools that declare both input and output types, in registration order.
  fn pipeline_tools(&self) -> Vec<Arc<ToolDescriptor>> {
    self
      .list()
      .into_iter()
      .filter(|tool| tool.is_pipeline_eligible())
      .collect()
  }
}

/// Registry backed by an ordered in-memory list.
///
/// Registering a tool id twice replaces the earlier descriptor in place,
/// keeping its original position.
#[derive(Debug, Default)]
pub struct InMemoryToolRegistry {
  tools: Vec<Arc<ToolDescriptor>>,
  index: HashMap<String, usize>,
}

impl InMemoryToolRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a tool.
  pub fn register(&mut self, tool: ToolDescriptor) {
    let tool = Arc::new(tool);
    match self.index.get(&tool.id) {
      Some(&position) => self.tools[position] = tool,
      None => {
        self.index.insert(tool.id.clone(), self.tools.len());
        self.tools.push(tool);
      }
    }
  }

  /// Builder-style registration.
  pub fn with(mut self, tool: ToolDescriptor) -> Self {
    self.register(tool);
    self
  }

  pub fn len(&self) -> usize {
    self.tools.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tools.is_empty()
  }
}

impl ToolRegistry for InMemoryToolRegistry {
  fn get(&self, tool_id: &str) -> Option<Arc<ToolDescriptor>> {
    self
      .index
      .get(tool_id)
      .and_then(|&position| self.tools.get(position))
      .cloned()
  }

  fn list(&self) -> Vec<Arc<ToolDescriptor>> {
    self.tools.clone()
  }
}

impl<R: ToolRegistry + ?Sized> ToolRegistry for Arc<R> {
  fn get(&self, tool_id: &str) -> Option<Arc<ToolDescriptor>> {
    (**self).get(tool_id)
  }

  fn list(&self) -> Vec<Arc<ToolDescriptor>> {
    (**self).list()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_registration_order_is_preserved() {
    let registry = InMemoryToolRegistry::new()
      .with(ToolDescriptor::new("b", "B"))
      .with(ToolDescriptor::new("a", "A"))
      .with(ToolDescriptor::new("c", "C"));

    let ids: Vec<_> = registry.list().iter().map(|t| t.id.clone()).collect();
    assert_eq!(ids, vec!["b", "a", "c"]);
  }

  #[test]
  fn test_reregistration_replaces_in_place() {
    let mut registry = InMemoryToolRegistry::new()
      .with(ToolDescriptor::new("a", "First"))
      .with(ToolDescriptor::new("b", "B"));
    registry.register(ToolDescriptor::new("a", "Second"));

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get("a").unwrap().name, "Second");
    assert_eq!(registry.list()[0].id, "a");
  }

  #[test]
  fn test_pipeline_tools_filters_ineligible() {
    let registry = InMemoryToolRegistry::new()
      .with(ToolDescriptor::new("qr", "QR code").with_input_types(["text"]))
      .with(
        ToolDescriptor::new("upper", "Uppercase")
          .with_input_types(["text"])
          .with_output_types(["text"]),
      );

    let eligible = registry.pipeline_tools();
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].id, "upper");
    assert!(registry.get("missing").is_none());
  }
}
