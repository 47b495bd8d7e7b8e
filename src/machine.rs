//! Pure task lifecycle state machine.
//!
//! [`transition`] maps `(state, event)` to `(state, effects)`. It performs
//! no I/O: timers and network calls are requested through [`Effect`] values
//! that the controller executes. Events tagged with a superseded ticket or
//! task id are stale and leave the state untouched.

use std::fmt;

use serde::Serialize;

use crate::request::{SubmissionRequest, MAX_PROMPT_CHARS};
use crate::types::{RemoteState, ResultPayload, TaskRecord};

pub const MSG_UPLOAD_PENDING: &str = "Please resolve the image upload error before generating.";
pub const MSG_MISSING_IMAGE: &str =
    "Please provide a reference image by uploading a file or pasting a URL.";
pub const MSG_CREATING: &str = "Creating generation task...";
pub const MSG_CREATED: &str = "Task created! Waiting for results...";
pub const MSG_CHECKING: &str = "Checking task status...";
pub const MSG_PROCESSING: &str = "Task is processing, please wait...";
pub const MSG_PARSE_FAILED: &str = "Failed to parse result data.";
pub const MSG_UNKNOWN_FAILURE: &str = "An unknown error occurred.";
pub const MSG_POLL_FAILED: &str = "Failed to poll task status.";
pub const MSG_CREATE_FAILED: &str = "Failed to create task.";

/// Observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Waiting,
    Success,
    Fail,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Success | Phase::Fail)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Waiting => "waiting",
            Phase::Success => "success",
            Phase::Fail => "fail",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which step of the lifecycle produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Input rejected locally; no request was sent.
    Validation,
    /// The API refused to create the task.
    Submission,
    /// Network or HTTP failure while polling.
    PollTransport,
    /// The server reported the job as failed.
    PollApplication,
    /// The success payload could not be decoded.
    ResultParse,
}

/// Terminal failure with a displayable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    /// Creation request in flight for submission `ticket`.
    Submitting { ticket: u64 },
    Waiting { task_id: String },
    Success { task_id: String, images: Vec<String> },
    Fail { failure: TaskFailure },
}

impl TaskState {
    pub fn phase(&self) -> Phase {
        match self {
            TaskState::Idle | TaskState::Submitting { .. } => Phase::Idle,
            TaskState::Waiting { .. } => Phase::Waiting,
            TaskState::Success { .. } => Phase::Success,
            TaskState::Fail { .. } => Phase::Fail,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            TaskState::Waiting { task_id } | TaskState::Success { task_id, .. } => {
                Some(task_id.as_str())
            }
            _ => None,
        }
    }

    fn is_live(&self, id: &str) -> bool {
        matches!(self, TaskState::Waiting { task_id } if task_id == id)
    }

    fn is_submitting(&self, t: u64) -> bool {
        matches!(self, TaskState::Submitting { ticket } if *ticket == t)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Validated submission `ticket` is starting.
    Submit { ticket: u64 },
    /// Submission refused before any network call.
    Rejected(TaskFailure),
    TaskCreated { ticket: u64, task_id: String },
    CreateFailed { ticket: u64, message: String },
    /// The poll timer fired and a status query is about to go out.
    PollTick { task_id: String },
    Polled { task_id: String, record: TaskRecord },
    PollFailed { task_id: String, message: String },
    /// Owner is going away.
    Disposed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Release the poll loop, if one is running.
    CancelPoll,
    CreateTask { ticket: u64 },
    /// Start the single poll loop for `task_id`.
    SchedulePoll { task_id: String },
    /// Replace the user-facing status line (empty = clear).
    Status(String),
}

/// Check a request before anything is sent.
pub fn validate(
    request: &SubmissionRequest,
    upload_error: Option<&str>,
) -> Result<(), TaskFailure> {
    if upload_error.is_some() {
        return Err(TaskFailure::new(FailureKind::Validation, MSG_UPLOAD_PENDING));
    }
    if request.image_url.trim().is_empty() {
        return Err(TaskFailure::new(FailureKind::Validation, MSG_MISSING_IMAGE));
    }
    if request.prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(TaskFailure::new(
            FailureKind::Validation,
            format!("Prompt must be at most {} characters.", MAX_PROMPT_CHARS),
        ));
    }
    Ok(())
}

/// Decode a `resultJson` string. A missing or blank string yields an empty list.
pub fn parse_result(result_json: Option<&str>) -> Result<Vec<String>, serde_json::Error> {
    match result_json.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => Ok(Vec::new()),
        Some(raw) => serde_json::from_str::<ResultPayload>(raw).map(ResultPayload::into_urls),
    }
}

fn non_empty(message: Option<String>) -> Option<String> {
    message.filter(|m| !m.trim().is_empty())
}

fn fail(failure: TaskFailure) -> (TaskState, Vec<Effect>) {
    (
        TaskState::Fail { failure },
        vec![Effect::CancelPoll, Effect::Status(String::new())],
    )
}

/// Apply `event` to `state`.
pub fn transition(state: TaskState, event: Event) -> (TaskState, Vec<Effect>) {
    match event {
        Event::Submit { ticket } => (
            TaskState::Submitting { ticket },
            vec![
                Effect::CancelPoll,
                Effect::Status(MSG_CREATING.to_string()),
                Effect::CreateTask { ticket },
            ],
        ),

        Event::Rejected(failure) => fail(failure),

        Event::TaskCreated { ticket, task_id } if state.is_submitting(ticket) => {
            if task_id.trim().is_empty() {
                return fail(TaskFailure::new(FailureKind::Submission, MSG_CREATE_FAILED));
            }
            (
                TaskState::Waiting {
                    task_id: task_id.clone(),
                },
                vec![
                    Effect::SchedulePoll { task_id },
                    Effect::Status(MSG_CREATED.to_string()),
                ],
            )
        }

        Event::CreateFailed { ticket, message } if state.is_submitting(ticket) => {
            let message = non_empty(Some(message)).unwrap_or_else(|| MSG_CREATE_FAILED.into());
            fail(TaskFailure::new(FailureKind::Submission, message))
        }

        Event::PollTick { task_id } if state.is_live(&task_id) => {
            (state, vec![Effect::Status(MSG_CHECKING.to_string())])
        }

        Event::Polled { task_id, record } if state.is_live(&task_id) => match record.state {
            RemoteState::Success => match parse_result(record.result_json.as_deref()) {
                Ok(images) => (
                    TaskState::Success { task_id, images },
                    vec![Effect::CancelPoll, Effect::Status(String::new())],
                ),
                Err(_) => fail(TaskFailure::new(FailureKind::ResultParse, MSG_PARSE_FAILED)),
            },
            RemoteState::Fail => {
                let message =
                    non_empty(record.fail_msg).unwrap_or_else(|| MSG_UNKNOWN_FAILURE.into());
                fail(TaskFailure::new(FailureKind::PollApplication, message))
            }
            RemoteState::Waiting | RemoteState::Other => {
                (state, vec![Effect::Status(MSG_PROCESSING.to_string())])
            }
        },

        Event::PollFailed { task_id, message } if state.is_live(&task_id) => {
            let message = non_empty(Some(message)).unwrap_or_else(|| MSG_POLL_FAILED.into());
            fail(TaskFailure::new(FailureKind::PollTransport, message))
        }

        Event::Disposed => {
            let next = match state {
                TaskState::Submitting { .. } | TaskState::Waiting { .. } => TaskState::Idle,
                other => other,
            };
            (next, vec![Effect::CancelPoll, Effect::Status(String::new())])
        }

        // Ticket or task id no longer current.
        _ => (state, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting(id: &str) -> TaskState {
        TaskState::Waiting {
            task_id: id.to_string(),
        }
    }

    fn polled(id: &str, record: TaskRecord) -> Event {
        Event::Polled {
            task_id: id.to_string(),
            record,
        }
    }

    #[test]
    fn test_empty_image_fails_validation() {
        let req = SubmissionRequest::new("prompt", "   ");
        let err = validate(&req, None).unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation);
        assert_eq!(err.message, MSG_MISSING_IMAGE);
    }

    #[test]
    fn test_upload_error_checked_first() {
        let req = SubmissionRequest::new("prompt", "");
        let err = validate(&req, Some("too big")).unwrap_err();
        assert_eq!(err.message, MSG_UPLOAD_PENDING);
    }

    #[test]
    fn test_overlong_prompt_fails_validation() {
        let req = SubmissionRequest::new("x".repeat(MAX_PROMPT_CHARS + 1), "https://x/r.png");
        assert!(validate(&req, None).is_err());
        let req = SubmissionRequest::new("x".repeat(MAX_PROMPT_CHARS), "https://x/r.png");
        assert!(validate(&req, None).is_ok());
    }

    #[test]
    fn test_rejected_goes_to_fail_and_cancels() {
        let failure = TaskFailure::new(FailureKind::Validation, MSG_MISSING_IMAGE);
        let (state, effects) = transition(waiting("old"), Event::Rejected(failure.clone()));
        assert_eq!(state, TaskState::Fail { failure });
        assert_eq!(effects[0], Effect::CancelPoll);
        assert!(!effects.iter().any(|e| matches!(e, Effect::CreateTask { .. })));
    }

    #[test]
    fn test_submit_cancels_before_creating() {
        let (state, effects) = transition(waiting("old"), Event::Submit { ticket: 2 });
        assert_eq!(state, TaskState::Submitting { ticket: 2 });
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(effects.first(), Some(&Effect::CancelPoll));
        assert_eq!(effects.last(), Some(&Effect::CreateTask { ticket: 2 }));
    }

    #[test]
    fn test_task_created_schedules_exactly_one_poll() {
        let (state, effects) = transition(
            TaskState::Submitting { ticket: 1 },
            Event::TaskCreated {
                ticket: 1,
                task_id: "abc123".into(),
            },
        );
        assert_eq!(state, waiting("abc123"));
        let schedules: Vec<_> = effects
            .iter()
            .filter(|e| matches!(e, Effect::SchedulePoll { .. }))
            .collect();
        assert_eq!(
            schedules,
            vec![&Effect::SchedulePoll {
                task_id: "abc123".into()
            }]
        );
    }

    #[test]
    fn test_created_with_empty_id_fails() {
        let (state, _) = transition(
            TaskState::Submitting { ticket: 1 },
            Event::TaskCreated {
                ticket: 1,
                task_id: String::new(),
            },
        );
        assert_eq!(state.phase(), Phase::Fail);
    }

    #[test]
    fn test_stale_ticket_is_ignored() {
        let state = TaskState::Submitting { ticket: 2 };
        let (next, effects) = transition(
            state.clone(),
            Event::TaskCreated {
                ticket: 1,
                task_id: "late".into(),
            },
        );
        assert_eq!(next, state);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_create_failed_surfaces_message() {
        let (state, _) = transition(
            TaskState::Submitting { ticket: 1 },
            Event::CreateFailed {
                ticket: 1,
                message: "insufficient credits".into(),
            },
        );
        assert_eq!(
            state,
            TaskState::Fail {
                failure: TaskFailure::new(FailureKind::Submission, "insufficient credits")
            }
        );
    }

    #[test]
    fn test_waiting_response_keeps_timer() {
        let (state, effects) = transition(
            waiting("abc123"),
            polled("abc123", TaskRecord::new("abc123", RemoteState::Waiting)),
        );
        assert_eq!(state, waiting("abc123"));
        assert!(!effects.contains(&Effect::CancelPoll));
        assert_eq!(effects, vec![Effect::Status(MSG_PROCESSING.into())]);
    }

    #[test]
    fn test_unknown_remote_state_keeps_waiting() {
        let (state, effects) = transition(
            waiting("t"),
            polled("t", TaskRecord::new("t", RemoteState::Other)),
        );
        assert_eq!(state.phase(), Phase::Waiting);
        assert!(!effects.contains(&Effect::CancelPoll));
    }

    #[test]
    fn test_success_stores_urls_and_cancels() {
        let record = TaskRecord::new("abc123", RemoteState::Success)
            .with_result_json(r#"{"resultUrls":["https://x/1.png"]}"#);
        let (state, effects) = transition(waiting("abc123"), polled("abc123", record));
        assert_eq!(
            state,
            TaskState::Success {
                task_id: "abc123".into(),
                images: vec!["https://x/1.png".into()],
            }
        );
        assert!(effects.contains(&Effect::CancelPoll));
    }

    #[test]
    fn test_success_without_result_json_is_empty_success() {
        let (state, _) = transition(
            waiting("t"),
            polled("t", TaskRecord::new("t", RemoteState::Success)),
        );
        assert_eq!(
            state,
            TaskState::Success {
                task_id: "t".into(),
                images: vec![],
            }
        );
    }

    #[test]
    fn test_success_with_blank_or_null_result_is_empty_success() {
        for raw in ["", "  ", r#"{"resultUrls":null}"#] {
            let record = TaskRecord::new("t", RemoteState::Success).with_result_json(raw);
            let (state, effects) = transition(waiting("t"), polled("t", record));
            assert_eq!(
                state,
                TaskState::Success {
                    task_id: "t".into(),
                    images: vec![],
                },
                "resultJson {:?}",
                raw
            );
            assert!(effects.contains(&Effect::CancelPoll));
        }
    }

    #[test]
    fn test_success_with_bad_payload_fails() {
        let record = TaskRecord::new("t", RemoteState::Success).with_result_json("not-json");
        let (state, effects) = transition(waiting("t"), polled("t", record));
        assert_eq!(
            state,
            TaskState::Fail {
                failure: TaskFailure::new(FailureKind::ResultParse, MSG_PARSE_FAILED)
            }
        );
        assert!(effects.contains(&Effect::CancelPoll));
    }

    #[test]
    fn test_server_failure_message_surfaces() {
        let record = TaskRecord::new("t", RemoteState::Fail).with_fail_msg("nsfw content detected");
        let (state, effects) = transition(waiting("t"), polled("t", record));
        match state {
            TaskState::Fail { failure } => {
                assert_eq!(failure.kind, FailureKind::PollApplication);
                assert_eq!(failure.message, "nsfw content detected");
            }
            other => panic!("expected fail, got {:?}", other),
        }
        assert!(effects.contains(&Effect::CancelPoll));
    }

    #[test]
    fn test_server_failure_without_message_uses_fallback() {
        let record = TaskRecord::new("t", RemoteState::Fail).with_fail_msg("");
        let (state, _) = transition(waiting("t"), polled("t", record));
        assert_eq!(
            state,
            TaskState::Fail {
                failure: TaskFailure::new(FailureKind::PollApplication, MSG_UNKNOWN_FAILURE)
            }
        );
    }

    #[test]
    fn test_poll_transport_error_is_terminal() {
        let (state, effects) = transition(
            waiting("t"),
            Event::PollFailed {
                task_id: "t".into(),
                message: "connection reset".into(),
            },
        );
        assert_eq!(
            state,
            TaskState::Fail {
                failure: TaskFailure::new(FailureKind::PollTransport, "connection reset")
            }
        );
        assert_eq!(effects[0], Effect::CancelPoll);
    }

    #[test]
    fn test_stale_poll_result_is_ignored() {
        let record = TaskRecord::new("old", RemoteState::Success)
            .with_result_json(r#"{"resultUrls":["https://x/old.png"]}"#);
        let (state, effects) = transition(waiting("new"), polled("old", record));
        assert_eq!(state, waiting("new"));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_poll_after_terminal_is_ignored() {
        let done = TaskState::Success {
            task_id: "t".into(),
            images: vec![],
        };
        let (state, effects) = transition(
            done.clone(),
            Event::PollFailed {
                task_id: "t".into(),
                message: "late".into(),
            },
        );
        assert_eq!(state, done);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_dispose_from_waiting_resets_and_cancels() {
        let (state, effects) = transition(waiting("t"), Event::Disposed);
        assert_eq!(state, TaskState::Idle);
        assert!(effects.contains(&Effect::CancelPoll));

        let (again, _) = transition(state, Event::Disposed);
        assert_eq!(again, TaskState::Idle);
    }

    #[test]
    fn test_dispose_keeps_terminal_result() {
        let done = TaskState::Success {
            task_id: "t".into(),
            images: vec!["https://x/1.png".into()],
        };
        let (state, _) = transition(done.clone(), Event::Disposed);
        assert_eq!(state, done);
    }

    #[test]
    fn test_parse_result_keeps_order() {
        let urls = parse_result(Some(r#"{"resultUrls":["b","a","c"]}"#)).unwrap();
        assert_eq!(urls, vec!["b", "a", "c"]);
        assert!(parse_result(Some(r#"{"other":1}"#)).unwrap().is_empty());
        assert!(parse_result(None).unwrap().is_empty());
    }
}
