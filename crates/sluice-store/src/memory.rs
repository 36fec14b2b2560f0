use std::collections::HashMap;

use async_trait::async_trait;
use sluice_workflow::Workflow;
use tokio::sync::RwLock;

use crate::WorkflowBackend;
use crate::error::StoreError;

/// In-memory backend.
///
/// Suitable for tests and for sessions that do not need to outlive the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
  records: RwLock<HashMap<String, Workflow>>,
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl WorkflowBackend for MemoryBackend {
  async fn list(&self) -> Result<Vec<Workflow>, StoreError> {
    Ok(self.records.read().await.values().cloned().collect())
  }

  async fn get(&self, id: &str) -> Result<Option<Workflow>, StoreError> {
    Ok(self.records.read().await.get(id).cloned())
  }

  async fn put(&self, workflow: &Workflow) -> Result<(), StoreError> {
    self
      .records
      .write()
      .await
      .insert(workflow.id.clone(), workflow.clone());
    Ok(())
  }

  async fn delete(&self, id: &str) -> Result<bool, StoreError> {
    Ok(self.records.write().await.remove(id).is_some())
  }
}
