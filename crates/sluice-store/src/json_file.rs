use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sluice_workflow::Workflow;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::WorkflowBackend;
use crate::error::StoreError;

/// On-disk layout of the store file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
  #[serde(default)]
  workflows: Vec<Workflow>,
}

/// Backend persisting every workflow to a single JSON file.
///
/// The file is read lazily on first access and rewritten in full on every
/// change. Writes go to a sibling temp file that is then renamed over the
/// original, so a crash mid-write leaves the previous contents intact.
///
/// ```text
/// {data_dir}/
/// └── workflows.json
/// ```
pub struct JsonFileBackend {
  path: PathBuf,
  records: Mutex<Option<BTreeMap<String, Workflow>>>,
}

impl JsonFileBackend {
  /// Create a backend for the given file path. The file need not exist yet.
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      records: Mutex::new(None),
    }
  }

  /// Conventional store location inside a data directory.
  pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
    Self::new(data_dir.as_ref().join("workflows.json"))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  async fn read_file(&self) -> Result<BTreeMap<String, Workflow>, StoreError> {
    let content = match fs::read_to_string(&self.path).await {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
      Err(e) => return Err(e.into()),
    };

    let file: StoreFile = serde_json::from_str(&content)?;
    debug!(
      path = %self.path.display(),
      workflows = file.workflows.len(),
      "loaded workflow store"
    );

    Ok(
      file
        .workflows
        .into_iter()
        .map(|w| (w.id.clone(), w))
        .collect(),
    )
  }

  async fn write_file(&self, records: &BTreeMap<String, Workflow>) -> Result<(), StoreError> {
    if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
      fs::create_dir_all(parent).await?;
    }

    let file = StoreFile {
      workflows: records.values().cloned().collect(),
    };
    let content = serde_json::to_string_pretty(&file)?;

    let tmp_path = self.path.with_extension("json.tmp");
    fs::write(&tmp_path, content).await?;
    fs::rename(&tmp_path, &self.path).await?;
    Ok(())
  }

  /// Run `f` against the loaded records, loading them first if needed.
  async fn with_records<T>(
    &self,
    f: impl FnOnce(&mut BTreeMap<String, Workflow>) -> T,
  ) -> Result<T, StoreError> {
    let mut guard = self.records.lock().await;
    let records = match guard.take() {
      Some(records) => records,
      None => self.read_file().await?,
    };
    Ok(f(guard.insert(records)))
  }
}

#[async_trait]
impl WorkflowBackend for JsonFileBackend {
  async fn list(&self) -> Result<Vec<Workflow>, StoreError> {
    self
      .with_records(|records| records.values().cloned().collect())
      .await
  }

  async fn get(&self, id: &str) -> Result<Option<Workflow>, StoreError> {
    self.with_records(|records| records.get(id).cloned()).await
  }

  async fn put(&self, workflow: &Workflow) -> Result<(), StoreError> {
    let mut guard = self.records.lock().await;
    let mut records = match guard.take() {
      Some(records) => records,
      None => self.read_file().await?,
    };
    let previous = records.insert(workflow.id.clone(), workflow.clone());

    if let Err(e) = self.write_file(&records).await {
      // Keep memory consistent with what is on disk.
      match previous {
        Some(previous) => records.insert(previous.id.clone(), previous),
        None => records.remove(&workflow.id),
      };
      *guard = Some(records);
      return Err(e);
    }

    *guard = Some(records);
    Ok(())
  }

  async fn delete(&self, id: &str) -> Result<bool, StoreError> {
    let mut guard = self.records.lock().await;
    let mut records = match guard.take() {
      Some(records) => records,
      None => self.read_file().await?,
    };

    let Some(removed) = records.remove(id) else {
      *guard = Some(records);
      return Ok(false);
    };

    if let Err(e) = self.write_file(&records).await {
      records.insert(removed.id.clone(), removed);
      *guard = Some(records);
      return Err(e);
    }

    *guard = Some(records);
    Ok(true)
  }
}
