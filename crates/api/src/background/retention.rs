//! Periodic eviction of finished tasks from the live store.
//!
//! Terminal records (`completed`, `failed`, `cancelled`) whose last update
//! is older than the retention window are removed. Live tasks are never
//! touched. Image and video records stay listable through the task log.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use easyvideo_core::types::TaskId;
use easyvideo_store::TaskStore;
use tokio_util::sync::CancellationToken;

/// Shortest period between sweeps; a zero interval is raised to this.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// One sweep: evict terminal tasks older than `retention`.
pub async fn sweep(store: &TaskStore, retention: Duration) -> Vec<TaskId> {
    let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
    let cutoff = Utc::now()
        .checked_sub_signed(retention)
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
    store.evict_terminal_older_than(cutoff).await
}

/// Run the retention loop until `cancel` is triggered.
pub async fn run(
    store: Arc<TaskStore>,
    retention: Duration,
    every: Duration,
    cancel: CancellationToken,
) {
    let every = every.max(MIN_SWEEP_INTERVAL);
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = every.as_secs(),
        "Task retention job started"
    );

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Task retention job stopping");
                break;
            }
            _ = interval.tick() => {
                let evicted = sweep(&store, retention).await;
                if evicted.is_empty() {
                    tracing::debug!("Task retention: nothing to evict");
                } else {
                    tracing::info!(evicted = evicted.len(), "Task retention: evicted finished tasks");
                }
            }
        }
    }
}
