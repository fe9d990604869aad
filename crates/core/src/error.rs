use crate::task::TaskStatus;
use crate::types::TaskId;

/// Errors raised by task store operations and state-machine transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// A record with this id is already live.
    #[error("Task {0} already exists")]
    Duplicate(TaskId),

    /// No live record with this id.
    #[error("Task {0} not found")]
    NotFound(TaskId),

    /// The record is in a terminal state and accepts no further transitions.
    #[error("Task {id} is already {status}")]
    AlreadyTerminal { id: TaskId, status: TaskStatus },

    /// The transition is not an edge of the state machine from `from`.
    #[error("Task {id} cannot apply '{transition}' while {from}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        transition: &'static str,
    },
}

/// Domain errors surfaced to API callers.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<TaskError> for CoreError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound(id) => CoreError::NotFound {
                entity: "Task",
                id: id.to_string(),
            },
            TaskError::Duplicate(_)
            | TaskError::AlreadyTerminal { .. }
            | TaskError::InvalidTransition { .. } => CoreError::Conflict(err.to_string()),
        }
    }
}
