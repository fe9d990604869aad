//! Response shapes of the generation service.
//!
//! The service answers with loosely-typed JSON: progress may be an integer
//! or a float, and generated artifacts appear under kind-specific keys
//! (`images`, `video_path`, ...). This module normalizes both endpoints
//! into [`SubmitAccepted`] and [`PollReport`].

use serde::{Deserialize, Serialize};

/// Keys under which the service returns generated artifacts.
pub const ARTIFACT_KEYS: [&str; 5] = ["images", "video_path", "storyboard", "scenes", "result"];

/// Job status as reported by the service's progress endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Starting,
    Initializing,
    Processing,
    Completed,
    Failed,
}

impl RemoteStatus {
    /// Parse a reported status. `None` for `unknown` and anything
    /// unrecognized.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "starting" => Some(Self::Starting),
            "initializing" => Some(Self::Initializing),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// The service's answer to a submission.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubmitAccepted {
    /// Artifacts returned inline, when generation finished during the call.
    pub result: Option<serde_json::Value>,
}

impl SubmitAccepted {
    pub fn from_body(body: &serde_json::Value) -> Self {
        Self {
            result: extract_artifacts(body),
        }
    }
}

/// One observation of a job's progress.
#[derive(Debug, Clone, PartialEq)]
pub enum PollReport {
    /// The service knows the job.
    Status {
        /// Raw progress, not yet clamped.
        progress: i64,
        status: RemoteStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    },
    /// The service has no record of the job.
    Unknown,
}

impl PollReport {
    /// Interpret a progress endpoint body.
    ///
    /// Status strings other than the five known ones are reported as
    /// [`PollReport::Unknown`] only when they literally say `unknown`;
    /// anything else is treated as still processing.
    pub fn from_body(body: &serde_json::Value) -> Self {
        let status = body
            .get("status")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");
        if status == "unknown" {
            return Self::Unknown;
        }

        let status = RemoteStatus::parse(status).unwrap_or_else(|| {
            tracing::debug!(status, "Unrecognized generation status, treating as processing");
            RemoteStatus::Processing
        });

        Self::Status {
            progress: body.get("progress").map_or(0, progress_value),
            status,
            result: extract_artifacts(body),
            error: body
                .get("error")
                .and_then(serde_json::Value::as_str)
                .filter(|message| !message.is_empty())
                .map(str::to_string),
        }
    }
}

fn progress_value(value: &serde_json::Value) -> i64 {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
        .unwrap_or(0)
}

/// Collect the non-empty artifact fields of a body into one object.
///
/// Returns `None` when the body carries no artifacts at all, e.g. the
/// `{"video_path": ""}` placeholder a queued video job answers with.
pub fn extract_artifacts(body: &serde_json::Value) -> Option<serde_json::Value> {
    let object = body.as_object()?;
    let artifacts: serde_json::Map<String, serde_json::Value> = ARTIFACT_KEYS
        .iter()
        .filter_map(|key| {
            let value = object.get(*key)?;
            (!is_empty(value)).then(|| (key.to_string(), value.clone()))
        })
        .collect();

    (!artifacts.is_empty()).then_some(serde_json::Value::Object(artifacts))
}

fn is_empty(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
