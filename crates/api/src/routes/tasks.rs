//! Route definitions for the `/tasks` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{stream, tasks};
use crate::state::AppState;

/// Routes mounted at `/tasks`.
///
/// ```text
/// GET    /                  -> list_tasks
/// POST   /                  -> submit_task
/// POST   /image             -> submit_image
/// POST   /video             -> submit_video
/// POST   /storyboard        -> submit_storyboard
/// GET    /history/{kind}    -> task_history
/// GET    /{id}              -> get_task
/// DELETE /{id}              -> delete_task
/// POST   /{id}/cancel       -> cancel_task
/// POST   /{id}/retry        -> retry_task
/// GET    /{id}/stream       -> stream_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::submit_task))
        .route("/image", post(tasks::submit_image))
        .route("/video", post(tasks::submit_video))
        .route("/storyboard", post(tasks::submit_storyboard))
        .route("/history/{kind}", get(tasks::task_history))
        .route("/{id}", get(tasks::get_task).delete(tasks::delete_task))
        .route("/{id}/cancel", post(tasks::cancel_task))
        .route("/{id}/retry", post(tasks::retry_task))
        .route("/{id}/stream", get(stream::stream_task))
}
