pub mod health;
pub mod tasks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /tasks                              submit (POST), list (GET)
/// /tasks/image                        submit image generation (POST)
/// /tasks/video                        submit video generation (POST)
/// /tasks/storyboard                   submit storyboard generation (POST)
/// /tasks/history/{kind}               finished tasks from the task log
/// /tasks/{id}                         get, delete
/// /tasks/{id}/cancel                  cancel (POST)
/// /tasks/{id}/retry                   retry a failed task (POST)
/// /tasks/{id}/stream                  progress events (SSE)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/tasks", tasks::router())
}
