//! REST client for the generation service.
//!
//! Wraps the submission endpoints (`POST /image/generate`,
//! `POST /video/generate`, `POST /storyboard/generate`) and the progress
//! endpoint (`GET /task/progress/{task_id}`) using [`reqwest`].

use std::time::Duration;

use async_trait::async_trait;
use easyvideo_core::task::TaskKind;
use easyvideo_core::types::TaskId;
use reqwest::StatusCode;

use crate::messages::{PollReport, SubmitAccepted};
use crate::service::GenerationService;

/// Errors from the generation service client.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The HTTP request itself failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Generation service error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The parameters could not be turned into a request body.
    #[error("Invalid generation parameters: {0}")]
    InvalidParameters(String),
}

/// HTTP client for one generation service deployment.
///
/// Submissions and polls use separate clients: a submission may hold the
/// connection for the whole generation, while a poll must answer quickly.
pub struct GenerationApi {
    submit_client: reqwest::Client,
    poll_client: reqwest::Client,
    base_url: String,
}

impl GenerationApi {
    /// Create a client for the service at `base_url`, e.g.
    /// `http://localhost:8001`.
    pub fn new(
        base_url: impl Into<String>,
        submit_timeout: Duration,
        poll_timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let submit_client = reqwest::Client::builder()
            .timeout(submit_timeout)
            .build()?;
        let poll_client = reqwest::Client::builder().timeout(poll_timeout).build()?;

        Ok(Self {
            submit_client,
            poll_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn submit_url(&self, kind: TaskKind) -> String {
        format!("{}{}", self.base_url, kind.submit_path())
    }

    fn progress_url(&self, task_id: TaskId) -> String {
        format!("{}/task/progress/{}", self.base_url, task_id)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`GenerationError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, GenerationError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body.
    async fn parse_response(
        response: reqwest::Response,
    ) -> Result<serde_json::Value, GenerationError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<serde_json::Value>().await?)
    }
}

/// Build the submission body: the caller's parameters plus our task id.
fn submission_body(
    task_id: TaskId,
    parameters: &serde_json::Value,
) -> Result<serde_json::Value, GenerationError> {
    let mut body = parameters.clone();
    let object = body.as_object_mut().ok_or_else(|| {
        GenerationError::InvalidParameters("parameters must be a JSON object".to_string())
    })?;
    object.insert(
        "task_id".to_string(),
        serde_json::Value::String(task_id.to_string()),
    );
    Ok(body)
}

#[async_trait]
impl GenerationService for GenerationApi {
    async fn submit(
        &self,
        task_id: TaskId,
        kind: TaskKind,
        parameters: &serde_json::Value,
    ) -> Result<SubmitAccepted, GenerationError> {
        let body = submission_body(task_id, parameters)?;

        tracing::debug!(task_id = %task_id, kind = %kind, "Submitting generation job");
        let response = self
            .submit_client
            .post(self.submit_url(kind))
            .json(&body)
            .send()
            .await?;

        let body = Self::parse_response(response).await?;
        Ok(SubmitAccepted::from_body(&body))
    }

    async fn poll(&self, task_id: TaskId) -> Result<PollReport, GenerationError> {
        let response = self
            .poll_client
            .get(self.progress_url(task_id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(PollReport::Unknown);
        }

        let body = Self::parse_response(response).await?;
        Ok(PollReport::from_body(&body))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn api(base: &str) -> GenerationApi {
        GenerationApi::new(base, Duration::from_secs(600), Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let api = api("http://localhost:8001/");
        let id = TaskId::new_v4();

        assert_eq!(api.base_url(), "http://localhost:8001");
        assert_eq!(
            api.submit_url(TaskKind::VideoGeneration),
            "http://localhost:8001/video/generate"
        );
        assert_eq!(
            api.progress_url(id),
            format!("http://localhost:8001/task/progress/{id}")
        );
    }

    #[test]
    fn submission_body_carries_task_id() {
        let id = TaskId::new_v4();
        let body = submission_body(id, &serde_json::json!({"prompt": "fog"})).unwrap();
        assert_eq!(body["prompt"], "fog");
        assert_eq!(body["task_id"], id.to_string());
    }

    #[test]
    fn non_object_parameters_are_rejected() {
        let err = submission_body(TaskId::new_v4(), &serde_json::json!([1, 2])).unwrap_err();
        assert_matches!(err, GenerationError::InvalidParameters(_));
    }
}
