//! Generation task records and their lifecycle state machine.
//!
//! ```text
//! pending ──Start──> processing ──Progress──> processing
//!    │                   │
//!    │                   ├──Complete──> completed
//!    ├──Fail─────────────┼──Fail──────> failed
//!    └──Cancel───────────┴──Cancel────> cancelled
//! ```
//!
//! Terminal states are absorbing. Every committed transition bumps the
//! record's `revision`, which downstream consumers use as the per-task
//! ordering key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, TaskError};
use crate::types::{TaskId, Timestamp};

/// Upper bound of the progress percentage.
pub const MAX_PROGRESS: u8 = 100;

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// What the external service is asked to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "image_generation", alias = "image")]
    ImageGeneration,
    #[serde(rename = "video_generation", alias = "video")]
    VideoGeneration,
    #[serde(rename = "storyboard_generation", alias = "storyboard")]
    StoryboardGeneration,
}

impl TaskKind {
    /// All kinds, in a stable order.
    pub const ALL: [TaskKind; 3] = [
        TaskKind::ImageGeneration,
        TaskKind::VideoGeneration,
        TaskKind::StoryboardGeneration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::ImageGeneration => "image_generation",
            TaskKind::VideoGeneration => "video_generation",
            TaskKind::StoryboardGeneration => "storyboard_generation",
        }
    }

    /// Path on the external generation service that accepts this kind.
    pub fn submit_path(self) -> &'static str {
        match self {
            TaskKind::ImageGeneration => "/image/generate",
            TaskKind::VideoGeneration => "/video/generate",
            TaskKind::StoryboardGeneration => "/storyboard/generate",
        }
    }

    /// Whether terminal records of this kind go to the durable task log.
    pub fn is_logged(self) -> bool {
        matches!(self, TaskKind::ImageGeneration | TaskKind::VideoGeneration)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// `completed`, `failed` and `cancelled` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// The immutable input that produced a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskParameters {
    /// Opaque request payload forwarded to the generation service.
    pub parameters: serde_json::Value,
    /// Project whose history receives the result on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl TaskParameters {
    pub fn new(parameters: serde_json::Value) -> Self {
        Self {
            parameters,
            project_id: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// The payload must be a JSON object so the task id can be attached.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.parameters.is_object() {
            return Err(CoreError::Validation(
                "parameters must be a JSON object".to_string(),
            ));
        }
        if let Some(project_id) = &self.project_id {
            if project_id.trim().is_empty() {
                return Err(CoreError::Validation(
                    "project_id must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// A requested state change.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Submission to the generation service has begun.
    Start,
    /// A progress sample; clamped into `0..=100` when applied.
    Progress(i64),
    /// Generation finished with the given result payload.
    Complete(serde_json::Value),
    /// Generation failed with a human-readable message.
    Fail(String),
    /// The client withdrew the task.
    Cancel,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Start => "start",
            Transition::Progress(_) => "progress",
            Transition::Complete(_) => "complete",
            Transition::Fail(_) => "fail",
            Transition::Cancel => "cancel",
        }
    }
}

/// Outcome of a successfully applied transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The record changed and its revision was bumped.
    Changed,
    /// The transition was legal but carried nothing new (same progress).
    Unchanged,
}

/// Clamp a reported progress value into `0..=100`.
pub fn clamp_progress(value: i64) -> u8 {
    value.clamp(0, i64::from(MAX_PROGRESS)) as u8
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One generation request and its current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: u8,
    pub parameters: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub revision: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TaskRecord {
    /// A fresh `pending` record at revision 0.
    pub fn new(id: TaskId, kind: TaskKind, input: TaskParameters, now: Timestamp) -> Self {
        Self {
            id,
            kind,
            status: TaskStatus::Pending,
            progress: 0,
            parameters: input.parameters,
            project_id: input.project_id,
            result: None,
            error: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The original input, for retries.
    pub fn input(&self) -> TaskParameters {
        TaskParameters {
            parameters: self.parameters.clone(),
            project_id: self.project_id.clone(),
        }
    }

    /// Apply a transition in place.
    ///
    /// On error the record is left untouched. On [`Applied::Changed`] the
    /// revision is incremented and `updated_at` set to `now`.
    pub fn apply(&mut self, transition: Transition, now: Timestamp) -> Result<Applied, TaskError> {
        if self.status.is_terminal() {
            return Err(TaskError::AlreadyTerminal {
                id: self.id,
                status: self.status,
            });
        }

        match (self.status, transition) {
            (TaskStatus::Pending, Transition::Start) => {
                self.status = TaskStatus::Processing;
            }
            (TaskStatus::Processing, Transition::Progress(value)) => {
                let progress = clamp_progress(value);
                if progress == self.progress {
                    return Ok(Applied::Unchanged);
                }
                self.progress = progress;
            }
            (TaskStatus::Processing, Transition::Complete(result)) => {
                self.status = TaskStatus::Completed;
                self.progress = MAX_PROGRESS;
                self.result = Some(result);
            }
            (_, Transition::Fail(message)) => {
                self.status = TaskStatus::Failed;
                self.error = Some(message);
            }
            (_, Transition::Cancel) => {
                self.status = TaskStatus::Cancelled;
            }
            (from, transition) => {
                return Err(TaskError::InvalidTransition {
                    id: self.id,
                    from,
                    transition: transition.name(),
                });
            }
        }

        self.revision += 1;
        self.updated_at = now;
        Ok(Applied::Changed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
