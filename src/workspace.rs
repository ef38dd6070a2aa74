//! Per-invocation project directories.
//!
//! Each flow that leaves artifacts for a later call gets a project: an id,
//! a directory it owns exclusively and the kind of flow that created it.
//! Records live for the lifetime of the server; directories are left on disk.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceKind {
    Synthesis,
    Simulation,
    PhysicalFlow,
}

impl WorkspaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceKind::Synthesis => "synthesis",
            WorkspaceKind::Simulation => "simulation",
            WorkspaceKind::PhysicalFlow => "physical_flow",
        }
    }
}

impl fmt::Display for WorkspaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceRecord {
    pub id: String,
    pub directory: PathBuf,
    pub kind: WorkspaceKind,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    guard: Arc<Mutex<()>>,
}

pub struct WorkspaceManager {
    root: PathBuf,
    records: DashMap<String, WorkspaceRecord>,
}

impl WorkspaceManager {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            records: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register a new project and create its directory.
    pub async fn create(&self, kind: WorkspaceKind) -> Result<WorkspaceRecord> {
        let record = loop {
            let id = Uuid::new_v4().to_string();
            match self.records.entry(id.clone()) {
                Entry::Occupied(_) => {
                    debug!("Project id {} already registered, drawing another", id);
                    continue;
                }
                Entry::Vacant(slot) => {
                    let record = WorkspaceRecord {
                        directory: self.root.join(format!("{}_{}", kind, id)),
                        id,
                        kind,
                        created_at: Utc::now(),
                        guard: Arc::new(Mutex::new(())),
                    };
                    slot.insert(record.clone());
                    break record;
                }
            }
        };

        if let Err(e) = tokio::fs::create_dir_all(&record.directory).await {
            self.records.remove(&record.id);
            return Err(e.into());
        }
        info!(
            "Created {} project {} at {}",
            record.kind,
            record.id,
            record.directory.display()
        );
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<WorkspaceRecord> {
        self.records
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::WorkspaceNotFound(id.to_string()))
    }

    /// Serialize calls against one project. Held for the whole driver call.
    pub async fn lock(&self, id: &str) -> Result<OwnedMutexGuard<()>> {
        let guard = self.get(id)?.guard;
        Ok(guard.lock_owned().await)
    }

    /// Path of `relative_path` inside the project directory. The file need
    /// not exist.
    pub fn resolve_artifact(&self, id: &str, relative_path: &str) -> Result<PathBuf> {
        let record = self.get(id)?;
        let relative = validate_relative_path(relative_path)?;
        Ok(record.directory.join(relative))
    }

    pub async fn write_artifact(
        &self,
        id: &str,
        relative_path: &str,
        content: &str,
    ) -> Result<PathBuf> {
        let path = self.resolve_artifact(id, relative_path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        debug!(
            "Wrote {} bytes to {} in project {}",
            content.len(),
            relative_path,
            id
        );
        Ok(path)
    }
}

fn validate_relative_path(relative_path: &str) -> Result<&Path> {
    let path = Path::new(relative_path);
    if relative_path.is_empty() {
        return Err(AppError::Validation(
            "Artifact path cannot be empty".to_string(),
        ));
    }
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(AppError::Validation(format!(
            "Artifact path '{}' must stay inside the project directory",
            relative_path
        )));
    }
    Ok(path)
}
