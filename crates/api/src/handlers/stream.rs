//! Server-Sent Events stream of one task's transitions.
//!
//! The stream opens with a `snapshot` event carrying the current record,
//! forwards every later transition as an `update` event, and ends after a
//! record in a terminal state has been sent. An unknown task id yields a
//! single `error` event. Dropping the response (client disconnect) drops
//! the underlying [`Subscription`].

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use easyvideo_core::task::TaskRecord;
use easyvideo_core::task_events::{EVENT_ERROR, EVENT_SNAPSHOT, EVENT_UPDATE};
use easyvideo_core::types::TaskId;
use easyvideo_events::{RecvError, Subscription};
use easyvideo_store::TaskStore;
use futures::stream::{self, BoxStream, StreamExt};

use crate::state::AppState;

/// Interval between keep-alive comments on an idle stream.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

type EventStream = BoxStream<'static, Result<Event, Infallible>>;

/// GET /api/v1/tasks/{id}/stream
pub async fn stream_task(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Sse<KeepAliveStream<EventStream>> {
    let subscribed = match raw_id.parse::<TaskId>() {
        Ok(id) => state.orchestrator.subscribe(id).await,
        Err(_) => None,
    };

    let events: EventStream = match subscribed {
        Some((snapshot, subscription)) => {
            tracing::debug!(task_id = %snapshot.id, revision = snapshot.revision, "Stream opened");
            task_events(Arc::clone(&state.store), snapshot, subscription)
        }
        None => {
            tracing::debug!(task_id = %raw_id, "Stream requested for unknown task");
            stream::once(async move { Ok(not_found_event(&raw_id)) }).boxed()
        }
    };

    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

/// Where the stream is in its lifecycle.
enum Phase {
    /// The opening snapshot has not been sent yet.
    Snapshot {
        record: TaskRecord,
        subscription: Subscription,
        store: Arc<TaskStore>,
    },
    /// Forwarding transitions newer than `last_revision`.
    Live {
        subscription: Subscription,
        store: Arc<TaskStore>,
        last_revision: u64,
    },
    Done,
}

fn task_events(
    store: Arc<TaskStore>,
    record: TaskRecord,
    subscription: Subscription,
) -> EventStream {
    let start = Phase::Snapshot {
        record,
        subscription,
        store,
    };

    stream::unfold(start, |phase| async move {
        match phase {
            Phase::Snapshot {
                record,
                subscription,
                store,
            } => {
                let event = record_event(EVENT_SNAPSHOT, &record);
                Some((Ok(event), after(record, subscription, store)))
            }
            Phase::Live {
                mut subscription,
                store,
                last_revision,
            } => loop {
                match subscription.recv().await {
                    Ok(event) if event.revision <= last_revision => continue,
                    Ok(event) => {
                        let sse = record_event(EVENT_UPDATE, &event.record);
                        return Some((Ok(sse), after(event.record, subscription, store)));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            task_id = %subscription.task_id(),
                            skipped,
                            "Stream lagged, resending snapshot",
                        );
                        match store.get(subscription.task_id()).await {
                            Some(record) if record.revision > last_revision => {
                                let sse = record_event(EVENT_SNAPSHOT, &record);
                                return Some((Ok(sse), after(record, subscription, store)));
                            }
                            Some(_) => continue,
                            None => {
                                let id = subscription.task_id().to_string();
                                return Some((Ok(not_found_event(&id)), Phase::Done));
                            }
                        }
                    }
                    Err(RecvError::Closed) => return None,
                }
            },
            Phase::Done => None,
        }
    })
    .boxed()
}

/// The phase following a sent record: done if it was terminal.
fn after(record: TaskRecord, subscription: Subscription, store: Arc<TaskStore>) -> Phase {
    if record.is_terminal() {
        Phase::Done
    } else {
        Phase::Live {
            subscription,
            store,
            last_revision: record.revision,
        }
    }
}

fn record_event(name: &str, record: &TaskRecord) -> Event {
    Event::default()
        .event(name)
        .id(record.revision.to_string())
        .json_data(record)
        .unwrap_or_else(|e| {
            tracing::error!(task_id = %record.id, error = %e, "Failed to encode task event");
            Event::default()
                .event(EVENT_ERROR)
                .data(r#"{"error":"failed to encode task","code":"INTERNAL_ERROR"}"#)
        })
}

fn not_found_event(id: &str) -> Event {
    let body = serde_json::json!({
        "error": format!("Task with id {id} not found"),
        "code": "NOT_FOUND",
    });
    Event::default().event(EVENT_ERROR).data(body.to_string())
}
