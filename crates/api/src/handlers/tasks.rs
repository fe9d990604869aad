//! Handlers for the `/tasks` resource.
//!
//! Submissions return `202 Accepted` with the new task id; generation runs
//! in the background and is observed through `GET /tasks/{id}` or the
//! event stream.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use easyvideo_core::error::CoreError;
use easyvideo_core::task::{TaskKind, TaskParameters, TaskRecord, TaskStatus};
use easyvideo_core::types::TaskId;
use serde::{Deserialize, Serialize};

use crate::engine::Deleted;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Body of `POST /tasks`.
#[derive(Debug, Deserialize)]
pub struct SubmitTask {
    pub kind: TaskKind,
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Optional filters of `GET /tasks`.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<TaskStatus>,
    pub kind: Option<TaskKind>,
}

/// Acknowledgement of an accepted task.
#[derive(Debug, Serialize)]
pub struct TaskAccepted {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
}

impl From<&TaskRecord> for TaskAccepted {
    fn from(record: &TaskRecord) -> Self {
        Self {
            task_id: record.id,
            kind: record.kind,
            status: record.status,
        }
    }
}

fn accepted(record: &TaskRecord) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: TaskAccepted::from(record),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/tasks
///
/// Submit a generation request of any kind.
pub async fn submit_task(
    State(state): State<AppState>,
    Json(input): Json<SubmitTask>,
) -> AppResult<Response> {
    let mut parameters = TaskParameters::new(input.parameters);
    parameters.project_id = input.project_id;

    let record = state.orchestrator.create(input.kind, parameters).await?;
    Ok(accepted(&record))
}

/// Shared body of the kind-specific submit endpoints: the whole JSON object
/// is the parameter payload, except for an optional `project_id`.
async fn submit_kind(
    state: AppState,
    kind: TaskKind,
    mut body: serde_json::Map<String, serde_json::Value>,
) -> AppResult<Response> {
    let project_id = match body.remove("project_id") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(id)) => Some(id),
        Some(_) => {
            return Err(AppError::BadRequest(
                "project_id must be a string".to_string(),
            ))
        }
    };

    let mut parameters = TaskParameters::new(serde_json::Value::Object(body));
    parameters.project_id = project_id;

    let record = state.orchestrator.create(kind, parameters).await?;
    Ok(accepted(&record))
}

/// POST /api/v1/tasks/image
pub async fn submit_image(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Map<String, serde_json::Value>>,
) -> AppResult<Response> {
    submit_kind(state, TaskKind::ImageGeneration, body).await
}

/// POST /api/v1/tasks/video
///
/// Image-to-video requests go through the same submit-then-poll lifecycle
/// as every other kind.
pub async fn submit_video(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Map<String, serde_json::Value>>,
) -> AppResult<Response> {
    submit_kind(state, TaskKind::VideoGeneration, body).await
}

/// POST /api/v1/tasks/storyboard
pub async fn submit_storyboard(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Map<String, serde_json::Value>>,
) -> AppResult<Response> {
    submit_kind(state, TaskKind::StoryboardGeneration, body).await
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/tasks
///
/// Live tasks, newest first, optionally filtered by `status` and `kind`.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> AppResult<impl IntoResponse> {
    let tasks = state
        .store
        .list_all(|record| {
            query.status.map_or(true, |status| record.status == status)
                && query.kind.map_or(true, |kind| record.kind == kind)
        })
        .await;

    Ok(Json(DataResponse { data: tasks }))
}

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> AppResult<impl IntoResponse> {
    let record = state
        .store
        .get(id)
        .await
        .ok_or_else(|| CoreError::NotFound {
            entity: "Task",
            id: id.to_string(),
        })?;

    Ok(Json(DataResponse { data: record }))
}

/// GET /api/v1/tasks/history/{kind}
///
/// Finished tasks of one kind from the durable log, most recent first.
/// Kinds that are not logged have an empty history.
pub async fn task_history(
    State(state): State<AppState>,
    Path(kind): Path<TaskKind>,
) -> AppResult<impl IntoResponse> {
    let tasks = state.task_log.list(kind).await?;
    Ok(Json(DataResponse { data: tasks }))
}

// ---------------------------------------------------------------------------
// Cancel / delete / retry
// ---------------------------------------------------------------------------

/// POST /api/v1/tasks/{id}/cancel
///
/// Returns 409 if the task already reached a terminal state.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> AppResult<impl IntoResponse> {
    let record = state.orchestrator.cancel(id).await?;
    Ok(Json(DataResponse { data: record }))
}

/// DELETE /api/v1/tasks/{id}
///
/// A live task is cancelled and returned (200); a finished task is removed
/// from the live store (204).
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> AppResult<Response> {
    match state.orchestrator.delete(id).await? {
        Deleted::Cancelled(record) => Ok(Json(DataResponse { data: record }).into_response()),
        Deleted::Removed(_) => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// POST /api/v1/tasks/{id}/retry
///
/// Re-submit a failed task's parameters as a new task.
pub async fn retry_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> AppResult<Response> {
    let record = state.orchestrator.retry(id).await?;
    Ok(accepted(&record))
}
