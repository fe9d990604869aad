//! Durable per-kind log of terminal tasks.
//!
//! Each logged [`TaskKind`] has one JSON document, `<dir>/<kind>.json`,
//! holding an array of terminal [`TaskRecord`]s in the order they finished.
//! Appends rewrite the document through a temporary file and a rename so a
//! crash never leaves a half-written array behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use easyvideo_core::task::{TaskKind, TaskRecord};
use tokio::sync::Mutex;

use crate::error::StoreError;

/// Append-style JSON log of finished image and video tasks.
pub struct TaskLog {
    dir: PathBuf,
    /// Serializes read-modify-write cycles across all kinds.
    write_lock: Mutex<()>,
}

impl TaskLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Directory holding the per-kind documents.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, kind: TaskKind) -> PathBuf {
        self.dir.join(format!("{kind}.json"))
    }

    /// Append a terminal record to its kind's document.
    ///
    /// Returns `false` without touching disk when the kind is not logged.
    pub async fn append(&self, record: &TaskRecord) -> Result<bool, StoreError> {
        if !record.kind.is_logged() {
            return Ok(false);
        }

        let _guard = self.write_lock.lock().await;
        let path = self.path_for(record.kind);

        let mut entries = read_entries(&path).await?;
        entries.push(record.clone());

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        let body = serde_json::to_vec_pretty(&entries).map_err(|e| StoreError::malformed(&path, e))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        tracing::debug!(
            task_id = %record.id,
            kind = %record.kind,
            entries = entries.len(),
            "Task appended to log",
        );
        Ok(true)
    }

    /// Logged records for a kind, most recently finished first.
    pub async fn list(&self, kind: TaskKind) -> Result<Vec<TaskRecord>, StoreError> {
        let mut entries = read_entries(&self.path_for(kind)).await?;
        entries.reverse();
        Ok(entries)
    }
}

/// Read a log document; a missing file is an empty log.
async fn read_entries(path: &Path) -> Result<Vec<TaskRecord>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::malformed(path, e)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;
    use easyvideo_core::task::{TaskParameters, Transition};
    use easyvideo_core::types::TaskId;

    use super::*;

    fn finished(kind: TaskKind, marker: &str) -> TaskRecord {
        let mut record = TaskRecord::new(
            TaskId::new_v4(),
            kind,
            TaskParameters::new(serde_json::json!({"prompt": marker})),
            Utc::now(),
        );
        record.apply(Transition::Start, Utc::now()).unwrap();
        record
            .apply(
                Transition::Complete(serde_json::json!({"marker": marker})),
                Utc::now(),
            )
            .unwrap();
        record
    }

    #[tokio::test]
    async fn missing_log_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = TaskLog::new(dir.path().join("tasks"));
        assert!(log.list(TaskKind::ImageGeneration).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn appends_accumulate_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let log = TaskLog::new(dir.path().join("tasks"));

        let first = finished(TaskKind::ImageGeneration, "first");
        let second = finished(TaskKind::ImageGeneration, "second");
        assert!(log.append(&first).await.unwrap());
        assert!(log.append(&second).await.unwrap());

        let listed = log.list(TaskKind::ImageGeneration).await.unwrap();
        assert_eq!(listed, vec![second, first]);
        assert!(log.list(TaskKind::VideoGeneration).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn storyboard_tasks_are_not_logged() {
        let dir = tempfile::tempdir().unwrap();
        let log = TaskLog::new(dir.path());

        let record = finished(TaskKind::StoryboardGeneration, "scenes");
        assert!(!log.append(&record).await.unwrap());
        assert!(!dir.path().join("storyboard_generation.json").exists());
    }

    #[tokio::test]
    async fn document_is_a_json_array_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let log = TaskLog::new(dir.path());
        log.append(&finished(TaskKind::VideoGeneration, "clip"))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("video_generation.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["status"], "completed");
    }

    #[tokio::test]
    async fn corrupt_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("image_generation.json"), "{not json").unwrap();
        let log = TaskLog::new(dir.path());

        let err = log.list(TaskKind::ImageGeneration).await.unwrap_err();
        assert_matches!(err, StoreError::Malformed { .. });
    }
}
