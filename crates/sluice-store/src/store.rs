use sluice_workflow::{StepPatch, StepSeed, Workflow, WorkflowPatch, WorkflowStep};
use tokio::sync::Mutex;
use tracing::info;

use crate::WorkflowBackend;
use crate::error::StoreError;
use crate::memory::MemoryBackend;

/// The authoritative collection of workflows.
///
/// Mutations are serialized through an internal lock and applied as
/// read-copy-write against the backend: the caller either sees the whole
/// change or none of it. Mutating operations return the new snapshot of the
/// affected workflow.
pub struct WorkflowStore<B: WorkflowBackend = MemoryBackend> {
  backend: B,
  write_lock: Mutex<()>,
}

impl WorkflowStore<MemoryBackend> {
  /// A store that keeps everything in memory.
  pub fn in_memory() -> Self {
    Self::new(MemoryBackend::new())
  }
}

impl<B: WorkflowBackend> WorkflowStore<B> {
  pub fn new(backend: B) -> Self {
    Self {
      backend,
      write_lock: Mutex::new(()),
    }
  }

  /// Create a workflow and return its id.
  ///
  /// `steps` are stored as given. Steps copied from a template or another
  /// workflow must already carry regenerated ids.
  pub async fn create_workflow(
    &self,
    name: &str,
    steps: Vec<WorkflowStep>,
  ) -> Result<String, StoreError> {
    let name = validate_name(name)?;
    let workflow = Workflow::new(name, steps);
    let id = workflow.id.clone();

    let _guard = self.write_lock.lock().await;
    self.backend.put(&workflow).await?;

    info!(workflow_id = %id, steps = workflow.steps.len(), "workflow_created");
    Ok(id)
  }

  /// Store a fully-built workflow record, e.g. the result of an import.
  pub async fn insert_workflow(&self, workflow: Workflow) -> Result<String, StoreError> {
    validate_name(&workflow.name)?;

    let _guard = self.write_lock.lock().await;
    if self.backend.get(&workflow.id).await?.is_some() {
      return Err(StoreError::AlreadyExists(workflow.id));
    }
    self.backend.put(&workflow).await?;

    info!(workflow_id = %workflow.id, "workflow_inserted");
    Ok(workflow.id)
  }

  /// Get a workflow by id.
  pub async fn get_workflow(&self, id: &str) -> Result<Workflow, StoreError> {
    self
      .backend
      .get(id)
      .await?
      .ok_or_else(|| StoreError::WorkflowNotFound(id.to_string()))
  }

  /// All workflows, favorites first, then most recently updated first.
  pub async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
    let mut workflows = self.backend.list().await?;
    workflows.sort_by(|a, b| {
      b.is_favorite
        .cmp(&a.is_favorite)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.id.cmp(&b.id))
    });
    Ok(workflows)
  }

  /// Merge metadata fields and refresh `updated_at`.
  pub async fn update_workflow(
    &self,
    id: &str,
    patch: WorkflowPatch,
  ) -> Result<Workflow, StoreError> {
    if let Some(name) = &patch.name {
      validate_name(name)?;
    }
    self
      .mutate(id, |workflow| {
        workflow.apply(patch);
        Ok(())
      })
      .await
  }

  /// Remove a workflow.
  ///
  /// Callers holding this id as their "active" workflow must clear it.
  pub async fn delete_workflow(&self, id: &str) -> Result<(), StoreError> {
    let _guard = self.write_lock.lock().await;
    if !self.backend.delete(id).await? {
      return Err(StoreError::WorkflowNotFound(id.to_string()));
    }
    info!(workflow_id = %id, "workflow_deleted");
    Ok(())
  }

  /// Deep-copy a workflow under a new id with new step ids. Returns the new id.
  pub async fn duplicate_workflow(&self, id: &str) -> Result<String, StoreError> {
    let _guard = self.write_lock.lock().await;
    let source = self.get_workflow(id).await?;
    let copy = source.duplicate();
    self.backend.put(&copy).await?;

    info!(workflow_id = %id, duplicate_id = %copy.id, "workflow_duplicated");
    Ok(copy.id)
  }

  pub async fn toggle_favorite(&self, id: &str) -> Result<Workflow, StoreError> {
    self
      .mutate(id, |workflow| {
        workflow.is_favorite = !workflow.is_favorite;
        Ok(())
      })
      .await
  }

  /// Append a step with a freshly generated id.
  pub async fn add_step(&self, workflow_id: &str, seed: StepSeed) -> Result<Workflow, StoreError> {
    self
      .mutate(workflow_id, |workflow| {
        workflow.steps.push(seed.into_step());
        Ok(())
      })
      .await
  }

  /// Merge fields into one step.
  pub async fn update_step(
    &self,
    workflow_id: &str,
    step_id: &str,
    patch: StepPatch,
  ) -> Result<Workflow, StoreError> {
    self
      .mutate(workflow_id, |workflow| {
        let step = workflow
          .steps
          .iter_mut()
          .find(|s| s.id == step_id)
          .ok_or_else(|| step_not_found(workflow_id, step_id))?;
        step.apply(patch);
        Ok(())
      })
      .await
  }

  /// Remove one step. Remaining steps keep their ids.
  pub async fn remove_step(&self, workflow_id: &str, step_id: &str) -> Result<Workflow, StoreError> {
    self
      .mutate(workflow_id, |workflow| {
        let index = workflow
          .step_index(step_id)
          .ok_or_else(|| step_not_found(workflow_id, step_id))?;
        workflow.steps.remove(index);
        Ok(())
      })
      .await
  }

  /// Move a step to `to_index`, clamped to the last position.
  pub async fn move_step(
    &self,
    workflow_id: &str,
    step_id: &str,
    to_index: usize,
  ) -> Result<Workflow, StoreError> {
    self
      .mutate(workflow_id, |workflow| {
        let from = workflow
          .step_index(step_id)
          .ok_or_else(|| step_not_found(workflow_id, step_id))?;
        let step = workflow.steps.remove(from);
        let to = to_index.min(workflow.steps.len());
        workflow.steps.insert(to, step);
        Ok(())
      })
      .await
  }

  /// Insert a copy of a step, with a new id, right after the original.
  pub async fn duplicate_step(
    &self,
    workflow_id: &str,
    step_id: &str,
  ) -> Result<Workflow, StoreError> {
    self
      .mutate(workflow_id, |workflow| {
        let index = workflow
          .step_index(step_id)
          .ok_or_else(|| step_not_found(workflow_id, step_id))?;
        let copy = workflow.steps[index].duplicate();
        workflow.steps.insert(index + 1, copy);
        Ok(())
      })
      .await
  }

  /// Apply `f` to a copy of the workflow, refresh `updated_at`, and write it
  /// back. Nothing is written if `f` fails.
  async fn mutate<F>(&self, id: &str, f: F) -> Result<Workflow, StoreError>
  where
    F: FnOnce(&mut Workflow) -> Result<(), StoreError>,
  {
    let _guard = self.write_lock.lock().await;
    let mut workflow = self.get_workflow(id).await?;
    f(&mut workflow)?;
    workflow.touch();
    self.backend.put(&workflow).await?;

    info!(
      workflow_id = %id,
      steps = workflow.steps.len(),
      updated_at = %workflow.updated_at,
      "workflow_updated"
    );
    Ok(workflow)
  }
}

fn validate_name(name: &str) -> Result<&str, StoreError> {
  if name.trim().is_empty() {
    return Err(StoreError::EmptyName);
  }
  Ok(name)
}

fn step_not_found(workflow_id: &str, step_id: &str) -> StoreError {
  StoreError::StepNotFound {
    workflow_id: workflow_id.to_string(),
    step_id: step_id.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use sluice_workflow::find_template;

  async fn store_with_steps(tools: &[&str]) -> (WorkflowStore, String) {
    let store = WorkflowStore::in_memory();
    let id = store.create_workflow("Test", vec![]).await.unwrap();
    for tool in tools {
      store.add_step(&id, StepSeed::new(*tool)).await.unwrap();
    }
    (store, id)
  }

  fn tool_ids(workflow: &Workflow) -> Vec<&str> {
    workflow.steps.iter().map(|s| s.tool_id.as_str()).collect()
  }

  #[tokio::test]
  async fn test_create_sets_equal_timestamps() {
    let store = WorkflowStore::in_memory();
    let id = store.create_workflow("New", vec![]).await.unwrap();
    let workflow = store.get_workflow(&id).await.unwrap();

    assert_eq!(workflow.name, "New");
    assert_eq!(workflow.created_at, workflow.updated_at);
    assert!(!workflow.is_favorite);
  }

  #[tokio::test]
  async fn test_create_from_template() {
    let store = WorkflowStore::in_memory();
    let template = find_template("pretty-json").unwrap();
    let id = store
      .create_workflow(template.name, template.instantiate())
      .await
      .unwrap();

    let workflow = store.get_workflow(&id).await.unwrap();
    assert_eq!(tool_ids(&workflow), vec!["json-parse", "json-format"]);
  }

  #[tokio::test]
  async fn test_blank_name_rejected() {
    let store = WorkflowStore::in_memory();
    assert!(matches!(
      store.create_workflow("   ", vec![]).await,
      Err(StoreError::EmptyName)
    ));

    let id = store.create_workflow("ok", vec![]).await.unwrap();
    assert!(matches!(
      store.update_workflow(&id, WorkflowPatch::rename("")).await,
      Err(StoreError::EmptyName)
    ));
    assert_eq!(store.get_workflow(&id).await.unwrap().name, "ok");
  }

  #[tokio::test]
  async fn test_every_mutation_refreshes_updated_at() {
    let (store, id) = store_with_steps(&["a", "b"]).await;
    let mut last = store.get_workflow(&id).await.unwrap().updated_at;
    let first_step = store.get_workflow(&id).await.unwrap().steps[0].id.clone();

    let snapshots = vec![
      store.update_workflow(&id, WorkflowPatch::rename("Renamed")).await.unwrap(),
      // Same value again still counts as an update.
      store.update_workflow(&id, WorkflowPatch::rename("Renamed")).await.unwrap(),
      store.toggle_favorite(&id).await.unwrap(),
      store.add_step(&id, StepSeed::new("c")).await.unwrap(),
      store.update_step(&id, &first_step, StepPatch::disabled(true)).await.unwrap(),
      store.move_step(&id, &first_step, 2).await.unwrap(),
      store.duplicate_step(&id, &first_step).await.unwrap(),
      store.remove_step(&id, &first_step).await.unwrap(),
    ];

    for snapshot in snapshots {
      assert!(snapshot.updated_at > last);
      last = snapshot.updated_at;
    }
  }

  #[tokio::test]
  async fn test_unknown_ids_are_not_found() {
    let (store, id) = store_with_steps(&["a"]).await;

    assert!(matches!(
      store.update_workflow("nope", WorkflowPatch::rename("x")).await,
      Err(StoreError::WorkflowNotFound(_))
    ));
    assert!(matches!(
      store.delete_workflow("nope").await,
      Err(StoreError::WorkflowNotFound(_))
    ));
    assert!(matches!(
      store.remove_step(&id, "nope").await,
      Err(StoreError::StepNotFound { .. })
    ));

    // A failed mutation writes nothing.
    let before = store.get_workflow(&id).await.unwrap();
    let _ = store.update_step(&id, "nope", StepPatch::disabled(true)).await;
    assert_eq!(store.get_workflow(&id).await.unwrap(), before);
  }

  #[tokio::test]
  async fn test_add_step_appends_with_unique_ids() {
    let (store, id) = store_with_steps(&["a", "a", "b"]).await;
    let workflow = store.get_workflow(&id).await.unwrap();

    assert_eq!(tool_ids(&workflow), vec!["a", "a", "b"]);
    assert_ne!(workflow.steps[0].id, workflow.steps[1].id);
  }

  #[tokio::test]
  async fn test_update_step_merges_fields() {
    let (store, id) = store_with_steps(&["a", "b"]).await;
    let step_id = store.get_workflow(&id).await.unwrap().steps[1].id.clone();

    store
      .update_step(&id, &step_id, StepPatch::options(json!({"n": 3})))
      .await
      .unwrap();
    let workflow = store
      .update_step(&id, &step_id, StepPatch::disabled(true))
      .await
      .unwrap();

    let step = workflow.step(&step_id).unwrap();
    assert_eq!(step.options, json!({"n": 3}));
    assert!(step.disabled);
    assert!(!workflow.steps[0].disabled);
  }

  #[tokio::test]
  async fn test_remove_step_keeps_other_ids() {
    let (store, id) = store_with_steps(&["a", "b", "c"]).await;
    let before = store.get_workflow(&id).await.unwrap();

    let after = store.remove_step(&id, &before.steps[1].id).await.unwrap();
    assert_eq!(tool_ids(&after), vec!["a", "c"]);
    assert_eq!(after.steps[0].id, before.steps[0].id);
    assert_eq!(after.steps[1].id, before.steps[2].id);
  }

  #[tokio::test]
  async fn test_move_step_clamps() {
    let (store, id) = store_with_steps(&["a", "b", "c"]).await;
    let a = store.get_workflow(&id).await.unwrap().steps[0].id.clone();

    let moved = store.move_step(&id, &a, 99).await.unwrap();
    assert_eq!(tool_ids(&moved), vec!["b", "c", "a"]);

    let moved = store.move_step(&id, &a, 0).await.unwrap();
    assert_eq!(tool_ids(&moved), vec!["a", "b", "c"]);
  }

  #[tokio::test]
  async fn test_duplicate_step_inserts_after_original() {
    let (store, id) = store_with_steps(&["a", "b"]).await;
    let a = store.get_workflow(&id).await.unwrap().steps[0].clone();

    let workflow = store.duplicate_step(&id, &a.id).await.unwrap();
    assert_eq!(tool_ids(&workflow), vec!["a", "a", "b"]);
    assert_ne!(workflow.steps[1].id, a.id);
  }

  #[tokio::test]
  async fn test_duplicate_workflow() {
    let (store, id) = store_with_steps(&["a", "b"]).await;
    store.toggle_favorite(&id).await.unwrap();
    let original = store.get_workflow(&id).await.unwrap();

    let copy_id = store.duplicate_workflow(&id).await.unwrap();
    let copy = store.get_workflow(&copy_id).await.unwrap();

    assert_ne!(copy.id, original.id);
    assert_eq!(copy.name, original.name);
    assert!(copy.is_favorite);
    assert_eq!(copy.created_at, copy.updated_at);
    for (a, b) in original.steps.iter().zip(&copy.steps) {
      assert_ne!(a.id, b.id);
      assert_eq!(a.tool_id, b.tool_id);
    }
    assert_eq!(store.list_workflows().await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn test_insert_rejects_collision() {
    let store = WorkflowStore::in_memory();
    let workflow = Workflow::new("x", vec![]);
    store.insert_workflow(workflow.clone()).await.unwrap();

    assert!(matches!(
      store.insert_workflow(workflow).await,
      Err(StoreError::AlreadyExists(_))
    ));
  }

  #[tokio::test]
  async fn test_list_orders_favorites_then_recent() {
    let store = WorkflowStore::in_memory();
    let old = store.create_workflow("old", vec![]).await.unwrap();
    let fav = store.create_workflow("fav", vec![]).await.unwrap();
    let recent = store.create_workflow("recent", vec![]).await.unwrap();

    store.toggle_favorite(&fav).await.unwrap();
    store
      .update_workflow(&recent, WorkflowPatch::rename("recent!"))
      .await
      .unwrap();

    let names: Vec<_> = store
      .list_workflows()
      .await
      .unwrap()
      .into_iter()
      .map(|w| w.id)
      .collect();
    assert_eq!(names, vec![fav, recent, old]);
  }

  #[tokio::test]
  async fn test_delete_workflow() {
    let (store, id) = store_with_steps(&["a"]).await;
    store.delete_workflow(&id).await.unwrap();
    assert!(matches!(
      store.get_workflow(&id).await,
      Err(StoreError::WorkflowNotFound(_))
    ));
  }
}
