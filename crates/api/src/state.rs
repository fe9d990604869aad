use std::sync::Arc;

use easyvideo_events::TaskBroadcaster;
use easyvideo_store::{TaskLog, TaskStore};

use crate::config::ServerConfig;
use crate::engine::TaskOrchestrator;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Live task records.
    pub store: Arc<TaskStore>,
    /// Per-task transition fan-out for streaming clients.
    pub broadcaster: Arc<TaskBroadcaster>,
    /// Durable log of finished image and video tasks.
    pub task_log: Arc<TaskLog>,
    /// Lifecycle owner of every task.
    pub orchestrator: Arc<TaskOrchestrator>,
}
