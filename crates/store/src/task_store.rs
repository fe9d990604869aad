//! In-memory store of live task records.
//!
//! [`TaskStore`] is the single source of truth for tasks that have not yet
//! been evicted. Every mutation goes through one of its atomic operations;
//! two concurrent writers to the same id are serialized by the write lock,
//! and the loser observes [`TaskError`] instead of overwriting the winner.

use std::collections::HashMap;

use chrono::Utc;
use easyvideo_core::error::TaskError;
use easyvideo_core::task::{Applied, TaskRecord, Transition};
use easyvideo_core::types::{TaskId, Timestamp};
use tokio::sync::RwLock;

/// The result of a successful [`TaskStore::update`].
#[derive(Debug, Clone)]
pub struct Updated {
    /// The record as committed.
    pub record: TaskRecord,
    /// Whether the mutator actually changed anything.
    pub applied: Applied,
}

/// Keyed collection of live task records.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, TaskRecord>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record. Fails if the id is already live.
    pub async fn create(&self, record: TaskRecord) -> Result<(), TaskError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&record.id) {
            return Err(TaskError::Duplicate(record.id));
        }
        tasks.insert(record.id, record);
        Ok(())
    }

    /// Snapshot of a record. `None` is an expected outcome, not an error.
    pub async fn get(&self, id: TaskId) -> Option<TaskRecord> {
        self.tasks.read().await.get(&id).cloned()
    }

    /// Atomically apply `mutator` to the record with the given id.
    ///
    /// The mutator runs on a copy; the copy replaces the stored record only
    /// when the mutator succeeds, so a rejected transition leaves the
    /// record exactly as it was.
    pub async fn update<F>(&self, id: TaskId, mutator: F) -> Result<Updated, TaskError>
    where
        F: FnOnce(&mut TaskRecord) -> Result<Applied, TaskError>,
    {
        let mut tasks = self.tasks.write().await;
        let current = tasks.get_mut(&id).ok_or(TaskError::NotFound(id))?;

        let mut next = current.clone();
        let applied = mutator(&mut next)?;
        if applied == Applied::Changed {
            *current = next.clone();
        }

        Ok(Updated {
            record: next,
            applied,
        })
    }

    /// Apply a state-machine transition stamped with the current time.
    pub async fn transition(&self, id: TaskId, transition: Transition) -> Result<Updated, TaskError> {
        self.update(id, |record| record.apply(transition, Utc::now()))
            .await
    }

    /// Remove a record. Removing a missing id is a no-op.
    pub async fn delete(&self, id: TaskId) -> Option<TaskRecord> {
        self.tasks.write().await.remove(&id)
    }

    /// Records matching `predicate`, newest first.
    pub async fn list_all<P>(&self, predicate: P) -> Vec<TaskRecord>
    where
        P: Fn(&TaskRecord) -> bool,
    {
        let mut matching: Vec<TaskRecord> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|record| predicate(record))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching
    }

    /// Number of live records.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Remove terminal records last updated before `cutoff`.
    ///
    /// Non-terminal records are kept regardless of age. Returns the ids
    /// that were removed.
    pub async fn evict_terminal_older_than(&self, cutoff: Timestamp) -> Vec<TaskId> {
        let mut tasks = self.tasks.write().await;
        let expired: Vec<TaskId> = tasks
            .values()
            .filter(|record| record.is_terminal() && record.updated_at < cutoff)
            .map(|record| record.id)
            .collect();
        for id in &expired {
            tasks.remove(id);
        }
        expired
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
