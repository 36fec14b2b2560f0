//! Sluice Store
//!
//! This crate owns the durable collection of workflows.
//!
//! Storage is split in two layers:
//! - [`WorkflowBackend`]: whole-record persistence (list, get, put, delete).
//!   [`MemoryBackend`] keeps records in process; [`JsonFileBackend`] persists
//!   them to a single JSON file so they survive a restart.
//! - [`WorkflowStore`]: the operations callers use (create, update, duplicate,
//!   step add/update/remove/move). Every mutation is applied to a copy of the
//!   record and written back in one `put`, so callers never observe a
//!   partially-applied change, and every structural mutation refreshes
//!   `updated_at`.
//!
//! The store does not track which workflow is "active" in a caller's session.

mod error;
mod json_file;
mod memory;
mod store;

pub use error::StoreError;
pub use json_file::JsonFileBackend;
pub use memory::MemoryBackend;
pub use store::WorkflowStore;

use async_trait::async_trait;
use sluice_workflow::Workflow;

/// Record-level persistence for workflows.
#[async_trait]
pub trait WorkflowBackend: Send + Sync {
  /// All stored workflows, in no particular order.
  async fn list(&self) -> Result<Vec<Workflow>, StoreError>;

  /// Get a workflow by id.
  async fn get(&self, id: &str) -> Result<Option<Workflow>, StoreError>;

  /// Insert or replace a workflow record.
  async fn put(&self, workflow: &Workflow) -> Result<(), StoreError>;

  /// Delete a workflow. Returns whether a record was removed.
  async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}
