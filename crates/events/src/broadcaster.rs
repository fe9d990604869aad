//! Per-task fan-out of task transitions.
//!
//! [`TaskBroadcaster`] keeps one `tokio::sync::broadcast` channel per task id
//! that currently has subscribers. Publishing to an id nobody listens to is a
//! no-op; nothing is buffered for future subscribers. It is designed to be
//! shared via `Arc<TaskBroadcaster>` across the application.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use easyvideo_core::task::TaskRecord;
use easyvideo_core::task_events::{EVENT_SNAPSHOT, EVENT_UPDATE};
use easyvideo_core::types::{TaskId, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// TaskEvent
// ---------------------------------------------------------------------------

/// A task record as of one committed transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    /// Revision of `record`; strictly increasing per task.
    pub revision: u64,
    /// `"snapshot"` or `"update"`.
    pub event_type: String,
    pub record: TaskRecord,
    /// When the event was created (UTC).
    pub timestamp: Timestamp,
}

impl TaskEvent {
    fn new(event_type: &str, record: TaskRecord) -> Self {
        Self {
            task_id: record.id,
            revision: record.revision,
            event_type: event_type.to_string(),
            record,
            timestamp: Utc::now(),
        }
    }

    /// A live transition.
    pub fn update(record: TaskRecord) -> Self {
        Self::new(EVENT_UPDATE, record)
    }

    /// The state a subscriber starts from.
    pub fn snapshot(record: TaskRecord) -> Self {
        Self::new(EVENT_SNAPSHOT, record)
    }

    /// Whether the carried record is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.record.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// TaskBroadcaster
// ---------------------------------------------------------------------------

/// Default per-task buffer capacity.
const DEFAULT_CAPACITY: usize = 64;

struct Topic {
    sender: broadcast::Sender<TaskEvent>,
    /// Highest revision delivered on this topic.
    last_revision: Option<u64>,
}

/// Publish/subscribe hub keyed by task id.
///
/// Subscribers of one task never see events for another. Within a task,
/// events are delivered in publish order and an event whose revision is
/// not newer than the last one delivered is dropped, so every subscriber
/// observes strictly increasing revisions even when two writers publish
/// out of commit order.
pub struct TaskBroadcaster {
    topics: Mutex<HashMap<TaskId, Topic>>,
    capacity: usize,
}

impl TaskBroadcaster {
    /// Create a hub whose per-task channels buffer `capacity` events.
    ///
    /// A subscriber that falls further behind observes
    /// [`RecvError::Lagged`].
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            topics: Mutex::new(HashMap::new()),
            capacity,
        })
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<TaskId, Topic>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver an event to every current subscriber of its task.
    ///
    /// Returns the number of subscribers reached. Events for tasks without
    /// subscribers, and stale events, are dropped.
    pub fn publish(&self, event: TaskEvent) -> usize {
        let mut topics = self.topics();
        let Some(topic) = topics.get_mut(&event.task_id) else {
            return 0;
        };

        if topic
            .last_revision
            .is_some_and(|last| event.revision <= last)
        {
            tracing::debug!(
                task_id = %event.task_id,
                revision = event.revision,
                "Dropping stale task event",
            );
            return 0;
        }

        topic.last_revision = Some(event.revision);
        // A send error only means every receiver is gone.
        topic.sender.send(event).unwrap_or(0)
    }

    /// Register interest in one task.
    ///
    /// Only events published after this call are received; callers that
    /// need the current state read it after subscribing.
    pub fn subscribe(self: &Arc<Self>, task_id: TaskId) -> Subscription {
        let mut topics = self.topics();
        let topic = topics.entry(task_id).or_insert_with(|| Topic {
            sender: broadcast::channel(self.capacity).0,
            last_revision: None,
        });
        let receiver = topic.sender.subscribe();

        tracing::trace!(
            task_id = %task_id,
            subscribers = topic.sender.receiver_count(),
            "Task subscription added",
        );

        Subscription {
            task_id,
            receiver: Some(receiver),
            hub: Arc::clone(self),
        }
    }

    /// Drop the topic for `task_id` once its last receiver is gone.
    fn release(&self, task_id: TaskId) {
        let mut topics = self.topics();
        if let Some(topic) = topics.get(&task_id) {
            if topic.sender.receiver_count() == 0 {
                topics.remove(&task_id);
                tracing::trace!(task_id = %task_id, "Task topic released");
            }
        }
    }

    /// Number of tasks with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.topics().len()
    }

    /// Number of subscribers for one task.
    pub fn subscriber_count(&self, task_id: TaskId) -> usize {
        self.topics()
            .get(&task_id)
            .map_or(0, |topic| topic.sender.receiver_count())
    }
}

impl Default for TaskBroadcaster {
    fn default() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Why [`Subscription::recv`] returned without an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecvError {
    /// The subscriber fell behind and `n` events were skipped.
    #[error("subscriber lagged behind by {0} events")]
    Lagged(u64),
    /// The topic is gone; no further events will arrive.
    #[error("task topic closed")]
    Closed,
}

/// One subscriber's handle on a task's events.
///
/// Dropping the handle (or calling [`unsubscribe`](Self::unsubscribe))
/// stops delivery and releases the registration.
pub struct Subscription {
    task_id: TaskId,
    receiver: Option<broadcast::Receiver<TaskEvent>>,
    hub: Arc<TaskBroadcaster>,
}

impl Subscription {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Wait for the next event on this task.
    pub async fn recv(&mut self) -> Result<TaskEvent, RecvError> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Err(RecvError::Closed);
        };
        receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(n) => RecvError::Lagged(n),
            broadcast::error::RecvError::Closed => RecvError::Closed,
        })
    }

    /// Stop receiving events.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            drop(receiver);
            self.hub.release(self.task_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("task_id", &self.task_id)
            .field("active", &self.receiver.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use easyvideo_core::task::{TaskKind, TaskParameters, Transition};

    use super::*;

    fn record() -> TaskRecord {
        TaskRecord::new(
            TaskId::new_v4(),
            TaskKind::ImageGeneration,
            TaskParameters::new(serde_json::json!({"prompt": "koi pond"})),
            Utc::now(),
        )
    }

    fn advanced(mut record: TaskRecord, transition: Transition) -> TaskRecord {
        record.apply(transition, Utc::now()).unwrap();
        record
    }

    #[tokio::test]
    async fn subscriber_receives_events_in_publish_order() {
        let hub = TaskBroadcaster::new(16);
        let started = advanced(record(), Transition::Start);
        let mut sub = hub.subscribe(started.id);

        let mut current = started.clone();
        hub.publish(TaskEvent::update(current.clone()));
        for progress in [10, 40, 75] {
            current = advanced(current, Transition::Progress(progress));
            hub.publish(TaskEvent::update(current.clone()));
        }

        let mut seen = Vec::new();
        for _ in 0..4 {
            let event = sub.recv().await.unwrap();
            assert_eq!(event.event_type, EVENT_UPDATE);
            seen.push(event.record.progress);
        }
        assert_eq!(seen, vec![0, 10, 40, 75]);
    }

    #[tokio::test]
    async fn subscribers_of_other_tasks_are_unaffected() {
        let hub = TaskBroadcaster::new(16);
        let a = advanced(record(), Transition::Start);
        let b = advanced(record(), Transition::Start);
        let mut sub_a = hub.subscribe(a.id);
        let mut sub_b = hub.subscribe(b.id);

        hub.publish(TaskEvent::update(b.clone()));
        hub.publish(TaskEvent::update(a.clone()));

        assert_eq!(sub_a.recv().await.unwrap().task_id, a.id);
        assert_eq!(sub_b.recv().await.unwrap().task_id, b.id);
    }

    #[tokio::test]
    async fn every_subscriber_gets_the_event() {
        let hub = TaskBroadcaster::new(16);
        let task = advanced(record(), Transition::Start);
        let mut first = hub.subscribe(task.id);
        let mut second = hub.subscribe(task.id);

        assert_eq!(hub.publish(TaskEvent::update(task.clone())), 2);
        assert_eq!(first.recv().await.unwrap().revision, 1);
        assert_eq!(second.recv().await.unwrap().revision, 1);
    }

    #[test]
    fn publish_without_subscribers_is_dropped() {
        let hub = TaskBroadcaster::new(16);
        let task = record();

        assert_eq!(hub.publish(TaskEvent::update(task.clone())), 0);
        assert_eq!(hub.topic_count(), 0);
    }

    #[tokio::test]
    async fn stale_revisions_are_not_delivered() {
        let hub = TaskBroadcaster::new(16);
        let started = advanced(record(), Transition::Start);
        let progressed = advanced(started.clone(), Transition::Progress(30));
        let mut sub = hub.subscribe(started.id);

        assert_eq!(hub.publish(TaskEvent::update(progressed.clone())), 1);
        assert_eq!(hub.publish(TaskEvent::update(started.clone())), 0);

        let cancelled = advanced(progressed.clone(), Transition::Cancel);
        hub.publish(TaskEvent::update(cancelled));

        assert_eq!(sub.recv().await.unwrap().revision, 2);
        let last = sub.recv().await.unwrap();
        assert_eq!(last.revision, 3);
        assert!(last.is_terminal());
    }

    #[test]
    fn dropping_the_last_subscription_releases_the_topic() {
        let hub = TaskBroadcaster::new(16);
        let id = TaskId::new_v4();

        let first = hub.subscribe(id);
        let second = hub.subscribe(id);
        assert_eq!(hub.subscriber_count(id), 2);

        drop(first);
        assert_eq!(hub.subscriber_count(id), 1);
        assert_eq!(hub.topic_count(), 1);

        second.unsubscribe();
        assert_eq!(hub.subscriber_count(id), 0);
        assert_eq!(hub.topic_count(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_observes_lag() {
        let hub = TaskBroadcaster::new(2);
        let mut current = advanced(record(), Transition::Start);
        let mut sub = hub.subscribe(current.id);

        for progress in 1..=5 {
            current = advanced(current, Transition::Progress(progress));
            hub.publish(TaskEvent::update(current.clone()));
        }

        assert_eq!(sub.recv().await.unwrap_err(), RecvError::Lagged(3));
        assert_eq!(sub.recv().await.unwrap().record.progress, 4);
    }

    #[test]
    fn snapshot_event_carries_record_revision() {
        let task = advanced(record(), Transition::Start);
        let event = TaskEvent::snapshot(task.clone());
        assert_eq!(event.event_type, EVENT_SNAPSHOT);
        assert_eq!(event.revision, task.revision);
        assert_eq!(event.task_id, task.id);
    }
}
