use async_trait::async_trait;
use easyvideo_core::task::TaskKind;
use easyvideo_core::types::TaskId;

use crate::api::GenerationError;
use crate::messages::{PollReport, SubmitAccepted};

/// Operations the orchestrator needs from a generation backend.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Hand a job to the service under our task id.
    ///
    /// May not return until generation has finished; callers run it
    /// concurrently with [`poll`](Self::poll).
    async fn submit(
        &self,
        task_id: TaskId,
        kind: TaskKind,
        parameters: &serde_json::Value,
    ) -> Result<SubmitAccepted, GenerationError>;

    /// Current progress of a previously submitted job.
    async fn poll(&self, task_id: TaskId) -> Result<PollReport, GenerationError>;
}
