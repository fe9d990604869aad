//! Translation of generation-service progress reports into task transitions.

use easyvideo_core::task::{Transition, MAX_PROGRESS};
use easyvideo_genclient::{PollReport, RemoteStatus};

/// Error recorded when the service forgets a task it had accepted.
pub const TASK_LOST: &str = "external task lost";

/// What the polling loop should do with one report.
#[derive(Debug, Clone, PartialEq)]
pub enum PollAction {
    /// Apply the transition; stop polling if it is terminal.
    Apply(Transition),
    /// Nothing to record yet; poll again.
    Wait,
}

/// Decide how a progress report affects the task.
///
/// `acknowledged` is whether the service has shown it knows the task,
/// either by reporting a status or by answering the submission. Before
/// that, an unknown task is one the service has not registered yet.
pub fn interpret(report: PollReport, acknowledged: bool) -> PollAction {
    match report {
        PollReport::Unknown if acknowledged => {
            PollAction::Apply(Transition::Fail(TASK_LOST.to_string()))
        }
        PollReport::Unknown => PollAction::Wait,
        PollReport::Status {
            status: RemoteStatus::Failed,
            error,
            ..
        } => PollAction::Apply(Transition::Fail(
            error.unwrap_or_else(|| "generation failed".to_string()),
        )),
        PollReport::Status {
            progress,
            status,
            result: Some(result),
            ..
        } if status == RemoteStatus::Completed || progress >= i64::from(MAX_PROGRESS) => {
            PollAction::Apply(Transition::Complete(result))
        }
        // 100% without a result is only a hint; the result may still be
        // on its way through the submission response.
        PollReport::Status { progress, .. } => PollAction::Apply(Transition::Progress(progress)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn status(progress: i64, status: RemoteStatus, result: Option<serde_json::Value>) -> PollReport {
        PollReport::Status {
            progress,
            status,
            result,
            error: None,
        }
    }

    #[test]
    fn progress_is_forwarded() {
        assert_eq!(
            interpret(status(40, RemoteStatus::Processing, None), true),
            PollAction::Apply(Transition::Progress(40))
        );
    }

    #[test]
    fn completion_needs_a_result() {
        assert_eq!(
            interpret(status(100, RemoteStatus::Completed, None), true),
            PollAction::Apply(Transition::Progress(100))
        );

        let result = json!({"video_path": "outputs/videos/a.mp4"});
        assert_eq!(
            interpret(status(100, RemoteStatus::Completed, Some(result.clone())), true),
            PollAction::Apply(Transition::Complete(result))
        );
    }

    #[test]
    fn full_progress_with_result_completes() {
        let result = json!({"images": ["a.png"]});
        assert_eq!(
            interpret(status(100, RemoteStatus::Processing, Some(result.clone())), true),
            PollAction::Apply(Transition::Complete(result))
        );
    }

    #[test]
    fn remote_failure_fails_with_its_message() {
        let report = PollReport::Status {
            progress: 0,
            status: RemoteStatus::Failed,
            result: None,
            error: Some("model not loaded".into()),
        };
        assert_eq!(
            interpret(report, true),
            PollAction::Apply(Transition::Fail("model not loaded".into()))
        );
    }

    #[test]
    fn unknown_before_acknowledgement_waits() {
        assert_eq!(interpret(PollReport::Unknown, false), PollAction::Wait);
    }

    #[test]
    fn unknown_after_acknowledgement_is_lost() {
        assert_eq!(
            interpret(PollReport::Unknown, true),
            PollAction::Apply(Transition::Fail(TASK_LOST.into()))
        );
    }
}
