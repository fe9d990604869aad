#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use easyvideo_api::config::ServerConfig;
use easyvideo_api::engine::{OrchestratorConfig, TaskOrchestrator};
use easyvideo_api::router::build_app_router;
use easyvideo_api::state::AppState;
use easyvideo_core::task::{TaskKind, TaskRecord};
use easyvideo_core::types::TaskId;
use easyvideo_events::TaskBroadcaster;
use easyvideo_genclient::{
    GenerationError, GenerationService, PollReport, RemoteStatus, SubmitAccepted,
};
use easyvideo_store::{ProjectStore, TaskLog, TaskStore};

// ---------------------------------------------------------------------------
// Scripted generation service
// ---------------------------------------------------------------------------

/// How the fake service answers submissions.
#[derive(Debug, Clone)]
pub enum SubmitBehavior {
    /// Accept without inline artifacts.
    Accept,
    /// Accept and return these artifacts inline.
    AcceptWith(serde_json::Value),
    /// Answer with this HTTP status.
    Reject(u16),
    /// Never answer.
    Hang,
}

/// A [`GenerationService`] whose answers are scripted by the test.
///
/// Poll answers are consumed in order; `None` entries simulate a transient
/// transport failure. Once the script runs out the last report repeats
/// (a processing report at 0% if none was ever scripted).
pub struct FakeService {
    submit: Mutex<SubmitBehavior>,
    script: Mutex<VecDeque<Option<PollReport>>>,
    last: Mutex<Option<PollReport>>,
    polls: AtomicUsize,
    submissions: Mutex<Vec<(TaskId, TaskKind, serde_json::Value)>>,
}

impl FakeService {
    pub fn new(submit: SubmitBehavior) -> Arc<Self> {
        Arc::new(Self {
            submit: Mutex::new(submit),
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            polls: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
        })
    }

    pub fn set_submit(&self, behavior: SubmitBehavior) {
        *self.submit.lock().unwrap() = behavior;
    }

    pub fn script(&self, answers: impl IntoIterator<Item = Option<PollReport>>) {
        self.script.lock().unwrap().extend(answers);
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<(TaskId, TaskKind, serde_json::Value)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationService for FakeService {
    async fn submit(
        &self,
        task_id: TaskId,
        kind: TaskKind,
        parameters: &serde_json::Value,
    ) -> Result<SubmitAccepted, GenerationError> {
        self.submissions
            .lock()
            .unwrap()
            .push((task_id, kind, parameters.clone()));

        let behavior = self.submit.lock().unwrap().clone();
        match behavior {
            SubmitBehavior::Accept => Ok(SubmitAccepted { result: None }),
            SubmitBehavior::AcceptWith(result) => Ok(SubmitAccepted {
                result: Some(result),
            }),
            SubmitBehavior::Reject(status) => Err(GenerationError::Api {
                status,
                body: "generator unavailable".to_string(),
            }),
            SubmitBehavior::Hang => std::future::pending().await,
        }
    }

    async fn poll(&self, _task_id: TaskId) -> Result<PollReport, GenerationError> {
        self.polls.fetch_add(1, Ordering::SeqCst);

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Some(report)) => {
                *self.last.lock().unwrap() = Some(report.clone());
                Ok(report)
            }
            Some(None) => Err(GenerationError::Api {
                status: 503,
                body: "busy".to_string(),
            }),
            None => Ok(self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| processing(0))),
        }
    }
}

pub fn processing(progress: i64) -> PollReport {
    PollReport::Status {
        progress,
        status: RemoteStatus::Processing,
        result: None,
        error: None,
    }
}

pub fn completed(result: serde_json::Value) -> PollReport {
    PollReport::Status {
        progress: 100,
        status: RemoteStatus::Completed,
        result: Some(result),
        error: None,
    }
}

pub fn remote_failure(message: &str) -> PollReport {
    PollReport::Status {
        progress: 0,
        status: RemoteStatus::Failed,
        result: None,
        error: Some(message.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Application under test
// ---------------------------------------------------------------------------

/// Poll interval used by the HTTP-level tests.
pub const TEST_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Build a test `ServerConfig` whose file-backed stores live in `root`.
pub fn test_config(root: &Path, poll_interval: Duration) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        generation_service_url: "http://generation.invalid".to_string(),
        submit_timeout_secs: 600,
        poll_timeout_secs: 10,
        poll_interval_ms: poll_interval.as_millis() as u64,
        task_retention_secs: 3600,
        sweep_interval_secs: 300,
        data_dir: root.join("data"),
        projects_dir: root.join("projects"),
        output_dir: root.join("outputs"),
    }
}

/// Router, state and the scratch directory backing them.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub service: Arc<FakeService>,
    pub dir: TempDir,
}

impl TestApp {
    pub fn orchestrator(&self) -> &Arc<TaskOrchestrator> {
        &self.state.orchestrator
    }

    pub fn projects_dir(&self) -> std::path::PathBuf {
        self.state.config.projects_dir.clone()
    }
}

/// Per-task event buffer of the test broadcaster.
pub const TEST_BROADCAST_CAPACITY: usize = 16;

/// Build the full application (same router and middleware as `main.rs`)
/// around a scripted generation service.
pub fn build_test_app(service: Arc<FakeService>, poll_interval: Duration) -> TestApp {
    build_test_app_with_capacity(service, poll_interval, TEST_BROADCAST_CAPACITY)
}

/// Like [`build_test_app`], with a custom per-task event buffer.
pub fn build_test_app_with_capacity(
    service: Arc<FakeService>,
    poll_interval: Duration,
    capacity: usize,
) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), poll_interval);

    let store = Arc::new(TaskStore::new());
    let broadcaster = TaskBroadcaster::new(capacity);
    let task_log = Arc::new(TaskLog::new(config.task_log_dir()));
    let projects = Arc::new(ProjectStore::new(&config.projects_dir));
    let orchestrator = TaskOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&broadcaster),
        service.clone(),
        Arc::clone(&task_log),
        projects,
        OrchestratorConfig {
            poll_interval,
            output_dir: config.output_dir.clone(),
        },
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        broadcaster,
        task_log,
        orchestrator,
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        service,
        dir,
    }
}

/// Write a minimal project document under `projects_dir`.
pub fn seed_project(projects_dir: &Path, project_id: &str) {
    let dir = projects_dir.join(project_id);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("project_config.json"),
        serde_json::json!({"project_id": project_id, "project_name": "Lighthouse"}).to_string(),
    )
    .unwrap();
}

/// Wait until the task satisfies `done`, failing the test after `limit`.
pub async fn wait_for_task(
    orchestrator: &TaskOrchestrator,
    id: TaskId,
    limit: Duration,
    done: impl Fn(&TaskRecord) -> bool,
) -> TaskRecord {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if let Some(record) = orchestrator.store().get(id).await {
            if done(&record) {
                return record;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} did not reach the expected state in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until no task loop is running any more.
pub async fn wait_idle(orchestrator: &TaskOrchestrator, limit: Duration) {
    let deadline = tokio::time::Instant::now() + limit;
    while orchestrator.active_count() > 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "task loops still running"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn post(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri, None).await
}

pub async fn delete(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, None).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// One parsed Server-Sent Event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: String,
    pub id: Option<String>,
    pub data: serde_json::Value,
}

/// Parse an SSE body into its named events, skipping keep-alive comments.
pub fn parse_sse(text: &str) -> Vec<SseEvent> {
    text.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut id = None;
            let mut data = String::new();
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    event = Some(value.trim().to_string());
                } else if let Some(value) = line.strip_prefix("id:") {
                    id = Some(value.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push_str(value.trim_start());
                }
            }
            Some(SseEvent {
                event: event?,
                id,
                data: serde_json::from_str(&data).unwrap(),
            })
        })
        .collect()
}
