//! Project documents that collect generation results.
//!
//! Each project lives in `<projects_dir>/<project_id>/project_config.json`.
//! Completed tasks that name a project are appended to the document's
//! `history` array; every other field of the document is preserved.

use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::Utc;
use easyvideo_core::task::{TaskKind, TaskRecord};
use easyvideo_core::types::{TaskId, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::StoreError;

/// File name of a project's configuration document.
pub const PROJECT_FILE: &str = "project_config.json";

/// One entry in a project's generation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub result: serde_json::Value,
    pub completed_at: Timestamp,
}

impl HistoryEntry {
    /// Build an entry from a completed record. `None` if it has no result.
    pub fn from_record(record: &TaskRecord) -> Option<Self> {
        Some(Self {
            task_id: record.id,
            kind: record.kind,
            result: record.result.clone()?,
            completed_at: record.updated_at,
        })
    }
}

/// File-backed project documents.
pub struct ProjectStore {
    projects_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ProjectStore {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn document_path(&self, project_id: &str) -> Result<PathBuf, StoreError> {
        validate_project_id(project_id)?;
        Ok(self.projects_dir.join(project_id).join(PROJECT_FILE))
    }

    /// Load a project document.
    pub async fn load(&self, project_id: &str) -> Result<serde_json::Value, StoreError> {
        let path = self.document_path(project_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::malformed(&path, e))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::ProjectNotFound(project_id.to_string()))
            }
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// Append an entry to a project's `history` and refresh `last_modified`.
    pub async fn append_history(
        &self,
        project_id: &str,
        entry: &HistoryEntry,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.document_path(project_id)?;
        let mut document = self.load(project_id).await?;

        let Some(object) = document.as_object_mut() else {
            return Err(StoreError::malformed(
                &path,
                <serde_json::Error as serde::de::Error>::custom(
                    "project document is not a JSON object",
                ),
            ));
        };

        let entry_json =
            serde_json::to_value(entry).map_err(|e| StoreError::malformed(&path, e))?;
        match object
            .entry("history")
            .or_insert_with(|| serde_json::Value::Array(Vec::new()))
        {
            serde_json::Value::Array(history) => history.push(entry_json),
            _ => {
                return Err(StoreError::malformed(
                    &path,
                    <serde_json::Error as serde::de::Error>::custom(
                        "project history is not a JSON array",
                    ),
                ))
            }
        }
        object.insert(
            "last_modified".to_string(),
            serde_json::Value::String(Utc::now().to_rfc3339()),
        );

        let body =
            serde_json::to_vec_pretty(&document).map_err(|e| StoreError::malformed(&path, e))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        tracing::info!(
            project_id,
            task_id = %entry.task_id,
            "Result added to project history",
        );
        Ok(())
    }
}

/// Project ids become directory names; only `[A-Za-z0-9_-]` is accepted.
fn validate_project_id(project_id: &str) -> Result<(), StoreError> {
    let valid = !project_id.is_empty()
        && project_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidProjectId(project_id.to_string()))
    }
}
