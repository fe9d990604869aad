//! Task lifecycle orchestration.
//!
//! [`TaskOrchestrator`] creates task records, runs one polling loop per
//! live task, and commits every state change through the [`TaskStore`]
//! before publishing it on the [`TaskBroadcaster`]. Client operations
//! (cancel, delete, retry) go through the same commit path, so a client
//! cancellation and a late completion from the service race on the store's
//! atomic update and exactly one of them wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use easyvideo_core::error::{CoreError, TaskError};
use easyvideo_core::task::{Applied, TaskKind, TaskParameters, TaskRecord, TaskStatus, Transition};
use easyvideo_core::types::TaskId;
use easyvideo_events::{Subscription, TaskBroadcaster, TaskEvent};
use easyvideo_genclient::{GenerationService, PollReport, SubmitAccepted};
use easyvideo_store::project_store::HistoryEntry;
use easyvideo_store::task_store::Updated;
use easyvideo_store::{ProjectStore, TaskLog, TaskStore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::progress::{interpret, PollAction};

/// How long shutdown waits for each task loop to exit.
const LOOP_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables of the orchestration loop.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Delay between progress polls of one task.
    pub poll_interval: Duration,
    /// Root under which tasks without an explicit `output_dir` write.
    pub output_dir: PathBuf,
}

/// Outcome of [`TaskOrchestrator::delete`].
#[derive(Debug, Clone)]
pub enum Deleted {
    /// The task was live and has been cancelled; its record stays readable.
    Cancelled(TaskRecord),
    /// The task was terminal and has been removed from the live store.
    Removed(TaskRecord),
}

/// Bookkeeping for one running task loop.
struct ActiveTask {
    /// Per-task cancellation token (child of the master token).
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owner of every task's lifecycle.
///
/// Designed to be shared via `Arc<TaskOrchestrator>` in application state.
pub struct TaskOrchestrator {
    store: Arc<TaskStore>,
    broadcaster: Arc<TaskBroadcaster>,
    service: Arc<dyn GenerationService>,
    task_log: Arc<TaskLog>,
    projects: Arc<ProjectStore>,
    config: OrchestratorConfig,
    active: Mutex<HashMap<TaskId, ActiveTask>>,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
}

impl TaskOrchestrator {
    pub fn new(
        store: Arc<TaskStore>,
        broadcaster: Arc<TaskBroadcaster>,
        service: Arc<dyn GenerationService>,
        task_log: Arc<TaskLog>,
        projects: Arc<ProjectStore>,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            broadcaster,
            service,
            task_log,
            projects,
            config,
            active: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn broadcaster(&self) -> &Arc<TaskBroadcaster> {
        &self.broadcaster
    }

    pub fn task_log(&self) -> &Arc<TaskLog> {
        &self.task_log
    }

    /// Number of task loops currently running.
    pub fn active_count(&self) -> usize {
        self.active().len()
    }

    fn active(&self) -> MutexGuard<'_, HashMap<TaskId, ActiveTask>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Client operations
    // -----------------------------------------------------------------------

    /// Accept a generation request.
    ///
    /// The record is stored as `pending` and returned immediately; the work
    /// happens on a spawned task loop.
    pub async fn create(
        self: &Arc<Self>,
        kind: TaskKind,
        input: TaskParameters,
    ) -> Result<TaskRecord, CoreError> {
        input.validate()?;
        if self.cancel.is_cancelled() {
            return Err(CoreError::Conflict("server is shutting down".to_string()));
        }

        let record = TaskRecord::new(TaskId::new_v4(), kind, input, Utc::now());
        self.store.create(record.clone()).await?;
        self.spawn_loop(&record);

        tracing::info!(task_id = %record.id, kind = %kind, "Task accepted");
        Ok(record)
    }

    /// Cancel a live task and stop its polling loop.
    ///
    /// Fails with [`TaskError::AlreadyTerminal`] if the task already
    /// finished, leaving the record unchanged.
    pub async fn cancel(&self, id: TaskId) -> Result<TaskRecord, TaskError> {
        let record = self.commit(id, Transition::Cancel).await?;
        self.stop_loop(id);
        tracing::info!(task_id = %id, "Task cancelled");
        Ok(record)
    }

    /// Cancel a live task, or remove a terminal one from the live store.
    pub async fn delete(&self, id: TaskId) -> Result<Deleted, TaskError> {
        let record = self.store.get(id).await.ok_or(TaskError::NotFound(id))?;

        if !record.is_terminal() {
            match self.cancel(id).await {
                Ok(record) => return Ok(Deleted::Cancelled(record)),
                // Finished between the lookup and the cancel; remove it.
                Err(TaskError::AlreadyTerminal { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        self.stop_loop(id);
        let removed = self.store.delete(id).await.ok_or(TaskError::NotFound(id))?;
        tracing::info!(task_id = %id, status = %removed.status, "Task removed");
        Ok(Deleted::Removed(removed))
    }

    /// Re-run a failed task's request as a brand-new task.
    pub async fn retry(self: &Arc<Self>, id: TaskId) -> Result<TaskRecord, CoreError> {
        let original = self.store.get(id).await.ok_or(TaskError::NotFound(id))?;
        if original.status != TaskStatus::Failed {
            return Err(CoreError::Validation(format!(
                "Only failed tasks can be retried; task {id} is {}",
                original.status
            )));
        }

        let record = self.create(original.kind, original.input()).await?;
        tracing::info!(task_id = %record.id, retry_of = %id, "Task retried");
        Ok(record)
    }

    /// Subscribe to a task's transitions.
    ///
    /// Returns the current record alongside the subscription, or `None` if
    /// the task is not live. The subscription is registered before the
    /// record is read, so no transition can fall between the two; events
    /// at or below the returned record's revision are already reflected in
    /// it.
    pub async fn subscribe(&self, id: TaskId) -> Option<(TaskRecord, Subscription)> {
        let subscription = self.broadcaster.subscribe(id);
        let record = self.store.get(id).await?;
        Some((record, subscription))
    }

    /// Stop every task loop and wait (bounded) for each to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down task orchestrator");
        self.cancel.cancel();

        let loops: Vec<(TaskId, ActiveTask)> = self.active().drain().collect();
        for (id, task) in loops {
            task.cancel.cancel();
            if tokio::time::timeout(LOOP_EXIT_TIMEOUT, task.handle)
                .await
                .is_err()
            {
                tracing::warn!(task_id = %id, "Task loop did not stop in time");
            }
        }

        tracing::info!("Task orchestrator shut down complete");
    }

    // -----------------------------------------------------------------------
    // Commit path
    // -----------------------------------------------------------------------

    /// Apply a transition, then publish and persist it if it changed the
    /// record.
    async fn commit(&self, id: TaskId, transition: Transition) -> Result<TaskRecord, TaskError> {
        let Updated { record, applied } = self.store.transition(id, transition).await?;
        if applied == Applied::Unchanged {
            return Ok(record);
        }

        self.broadcaster.publish(TaskEvent::update(record.clone()));
        if record.is_terminal() {
            self.persist(&record).await;
        }
        Ok(record)
    }

    /// Record a terminal task in the durable log and its project history.
    ///
    /// Failures are logged and never change the task's own outcome.
    async fn persist(&self, record: &TaskRecord) {
        if let Err(e) = self.task_log.append(record).await {
            tracing::error!(task_id = %record.id, error = %e, "Failed to append task to log");
        }

        if record.status != TaskStatus::Completed {
            return;
        }
        let Some(project_id) = record.project_id.as_deref() else {
            return;
        };
        let Some(entry) = HistoryEntry::from_record(record) else {
            return;
        };
        if let Err(e) = self.projects.append_history(project_id, &entry).await {
            tracing::warn!(
                task_id = %record.id,
                project_id,
                error = %e,
                "Failed to add result to project history",
            );
        }
    }

    // -----------------------------------------------------------------------
    // Task loop
    // -----------------------------------------------------------------------

    fn spawn_loop(self: &Arc<Self>, record: &TaskRecord) {
        let cancel = self.cancel.child_token();
        let orchestrator = Arc::clone(self);
        let id = record.id;
        let kind = record.kind;
        let payload = with_output_dir(&record.parameters, &self.config.output_dir, kind, id);
        let token = cancel.clone();

        // Held across the spawn so the loop cannot deregister before it is
        // registered.
        let mut active = self.active();
        let handle = tokio::spawn(async move {
            orchestrator.run_task(id, kind, payload, token).await;
            orchestrator.active().remove(&id);
        });
        active.insert(id, ActiveTask { cancel, handle });
    }

    fn stop_loop(&self, id: TaskId) {
        if let Some(task) = self.active().get(&id) {
            task.cancel.cancel();
        }
    }

    async fn run_task(
        &self,
        id: TaskId,
        kind: TaskKind,
        payload: serde_json::Value,
        cancel: CancellationToken,
    ) {
        if let Err(e) = self.commit(id, Transition::Start).await {
            tracing::debug!(task_id = %id, error = %e, "Task withdrawn before start");
            return;
        }

        let service = Arc::clone(&self.service);
        let mut submission =
            tokio::spawn(async move { service.submit(id, kind, &payload).await });
        let mut submitted = false;
        let mut status_seen = false;

        let period = self.config.poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(task_id = %id, kind = %kind, "Task loop started");

        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(task_id = %id, "Task loop cancelled");
                    break;
                }
                joined = &mut submission, if !submitted => {
                    submitted = true;
                    match joined {
                        Ok(Ok(SubmitAccepted { result: Some(result) })) => {
                            PollAction::Apply(Transition::Complete(result))
                        }
                        Ok(Ok(SubmitAccepted { result: None })) => PollAction::Wait,
                        Ok(Err(e)) => {
                            tracing::warn!(task_id = %id, error = %e, "Submission failed");
                            PollAction::Apply(Transition::Fail(format!("Submission failed: {e}")))
                        }
                        Err(e) => {
                            tracing::error!(task_id = %id, error = %e, "Submission task aborted");
                            PollAction::Apply(Transition::Fail(format!("Submission aborted: {e}")))
                        }
                    }
                }
                _ = ticker.tick() => {
                    let polled = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        polled = self.service.poll(id) => polled,
                    };
                    match polled {
                        Ok(report) => {
                            let acknowledged = status_seen || submitted;
                            status_seen |= matches!(report, PollReport::Status { .. });
                            interpret(report, acknowledged)
                        }
                        Err(e) => {
                            tracing::warn!(task_id = %id, error = %e, "Progress poll failed, retrying");
                            PollAction::Wait
                        }
                    }
                }
            };

            let PollAction::Apply(transition) = step else {
                continue;
            };
            match self.commit(id, transition).await {
                Ok(record) if record.is_terminal() => {
                    tracing::info!(task_id = %id, status = %record.status, "Task finished");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    // Cancelled or deleted by a client meanwhile.
                    tracing::debug!(task_id = %id, error = %e, "Transition rejected, stopping loop");
                    break;
                }
            }
        }

        submission.abort();
    }
}

/// The submission payload: the request parameters, with `output_dir`
/// defaulted to `<root>/<kind>/<task id>`.
fn with_output_dir(
    parameters: &serde_json::Value,
    root: &Path,
    kind: TaskKind,
    id: TaskId,
) -> serde_json::Value {
    let mut payload = parameters.clone();
    if let Some(object) = payload.as_object_mut() {
        object.entry("output_dir").or_insert_with(|| {
            serde_json::Value::String(
                root.join(kind.as_str())
                    .join(id.to_string())
                    .to_string_lossy()
                    .into_owned(),
            )
        });
    }
    payload
}
