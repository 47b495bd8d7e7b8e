//! Task lifecycle controller.
//!
//! Drives [`machine::transition`](crate::machine::transition) and executes
//! its effects: the creation call, the single poll loop, and status
//! updates. Observers read [`TaskSnapshot`]s through a `watch` channel.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::JobApi;
use crate::config::ClientConfig;
use crate::machine::{self, Effect, Event, Phase, TaskFailure, TaskState};
use crate::request::SubmissionRequest;

/// What observers see after every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub phase: Phase,
    pub task_id: Option<String>,
    pub images: Vec<String>,
    pub failure: Option<TaskFailure>,
    /// Informational status line; empty once terminal.
    pub message: String,
    #[serde(skip)]
    disposals: u64,
}

impl TaskSnapshot {
    fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            task_id: None,
            images: Vec::new(),
            failure: None,
            message: String::new(),
            disposals: 0,
        }
    }

    fn capture(inner: &Inner) -> Self {
        let state = &inner.state;
        let (images, failure) = match state {
            TaskState::Success { images, .. } => (images.clone(), None),
            TaskState::Fail { failure } => (Vec::new(), Some(failure.clone())),
            _ => (Vec::new(), None),
        };
        Self {
            phase: state.phase(),
            task_id: state.task_id().map(String::from),
            images,
            failure,
            message: inner.message.clone(),
            disposals: inner.disposals,
        }
    }
}

/// The one running poll loop. Dropping the handle cancels the loop.
struct PollHandle {
    task_id: String,
    cancel: CancellationToken,
    _join: JoinHandle<()>,
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Inner {
    state: TaskState,
    message: String,
    upload_error: Option<String>,
    poll: Option<PollHandle>,
    disposals: u64,
}

struct Shared<A> {
    api: A,
    poll_interval: Duration,
    inner: Mutex<Inner>,
    snapshot: watch::Sender<TaskSnapshot>,
}

impl<A: JobApi + 'static> Shared<A> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // State is replaced whole on every transition, so a poisoned guard
        // still holds a consistent value.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one transition and its synchronous effects. Returns the effects
    /// the caller has to perform itself (task creation).
    fn apply(self: &Arc<Self>, event: Event) -> Vec<Effect> {
        let mut inner = self.lock();
        let previous = std::mem::replace(&mut inner.state, TaskState::Idle);
        let previous_phase = previous.phase();
        let disposing = matches!(event, Event::Disposed);
        let (next, effects) = machine::transition(previous, event);
        inner.state = next;
        if disposing {
            inner.disposals += 1;
        }

        if effects.is_empty() {
            tracing::debug!(state = %inner.state.phase(), "Discarded stale event");
            return effects;
        }

        let mut deferred = Vec::new();
        for effect in effects {
            match effect {
                Effect::CancelPoll => {
                    if let Some(handle) = inner.poll.take() {
                        tracing::debug!(task_id = %handle.task_id, "Poll loop cancelled");
                    }
                }
                Effect::SchedulePoll { task_id } => {
                    inner.poll = Some(self.spawn_poll(task_id));
                }
                Effect::Status(message) => inner.message = message,
                other => deferred.push(other),
            }
        }

        let phase = inner.state.phase();
        if phase != previous_phase {
            match &inner.state {
                TaskState::Success { task_id, images } => {
                    tracing::info!(task_id = %task_id, images = images.len(), "Task succeeded")
                }
                TaskState::Fail { failure } => {
                    tracing::warn!(kind = ?failure.kind, error = %failure.message, "Task failed")
                }
                other => {
                    tracing::debug!(task_id = ?other.task_id(), state = %phase, "State changed")
                }
            }
        }

        let snapshot = TaskSnapshot::capture(&inner);
        drop(inner);
        self.snapshot.send_replace(snapshot);
        deferred
    }

    fn spawn_poll(self: &Arc<Self>, task_id: String) -> PollHandle {
        let cancel = CancellationToken::new();
        let join = tokio::spawn(poll_loop(Arc::clone(self), task_id.clone(), cancel.clone()));
        tracing::debug!(
            task_id = %task_id,
            interval_ms = self.poll_interval.as_millis() as u64,
            "Poll loop scheduled"
        );
        PollHandle {
            task_id,
            cancel,
            _join: join,
        }
    }
}

async fn poll_loop<A: JobApi + 'static>(
    shared: Arc<Shared<A>>,
    task_id: String,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(shared.poll_interval) => {}
        }

        shared.apply(Event::PollTick {
            task_id: task_id.clone(),
        });

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = shared.api.task_status(&task_id) => result,
        };

        if cancel.is_cancelled() {
            return;
        }

        let event = match result {
            Ok(record) => {
                tracing::debug!(task_id = %task_id, state = ?record.state, "Polled task");
                Event::Polled {
                    task_id: task_id.clone(),
                    record,
                }
            }
            Err(e) => Event::PollFailed {
                task_id: task_id.clone(),
                message: e.to_string(),
            },
        };
        shared.apply(event);
    }
}

/// Owns one task lifecycle: submission, polling, and teardown.
///
/// # Example
/// ```no_run
/// use seedream_edit::{ClientConfig, JobClient, SubmissionRequest, TaskController};
///
/// # async fn example() {
/// let config = ClientConfig::from_env();
/// let controller = TaskController::from_config(JobClient::from_config(&config), &config);
///
/// controller
///     .submit(SubmissionRequest::new("add a rainbow", "https://example.com/in.png"))
///     .await;
/// let done = controller.wait_for_terminal().await;
/// println!("{:?} {:?}", done.phase, done.images);
/// # }
/// ```
pub struct TaskController<A: JobApi + 'static> {
    shared: Arc<Shared<A>>,
    model: String,
    tickets: AtomicU64,
}

impl<A: JobApi + 'static> TaskController<A> {
    pub fn new(api: A, poll_interval: Duration) -> Self {
        let (snapshot, _) = watch::channel(TaskSnapshot::idle());
        Self {
            shared: Arc::new(Shared {
                api,
                poll_interval,
                inner: Mutex::new(Inner {
                    state: TaskState::Idle,
                    message: String::new(),
                    upload_error: None,
                    poll: None,
                    disposals: 0,
                }),
                snapshot,
            }),
            model: crate::config::DEFAULT_MODEL.to_string(),
            tickets: AtomicU64::new(0),
        }
    }

    pub fn from_config(api: A, config: &ClientConfig) -> Self {
        Self::new(api, config.poll_interval).with_model(config.model.clone())
    }

    /// Override the model id sent with each task.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Record a pending upload failure; submissions fail until cleared.
    pub fn report_upload_error(&self, message: impl Into<String>) {
        self.shared.lock().upload_error = Some(message.into());
    }

    pub fn clear_upload_error(&self) {
        self.shared.lock().upload_error = None;
    }

    /// Validate and submit `request`, replacing whatever task came before.
    ///
    /// Returns the snapshot after the creation step: `waiting` with a task id
    /// on success, otherwise `fail`. Never returns an error.
    pub async fn submit(&self, request: SubmissionRequest) -> TaskSnapshot {
        let upload_error = self.shared.lock().upload_error.clone();
        if let Err(failure) = machine::validate(&request, upload_error.as_deref()) {
            tracing::warn!(error = %failure.message, "Submission rejected");
            self.shared.apply(Event::Rejected(failure));
            return self.snapshot();
        }

        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed) + 1;
        let deferred = self.shared.apply(Event::Submit { ticket });
        if !deferred.contains(&Effect::CreateTask { ticket }) {
            return self.snapshot();
        }

        let payload = request.to_payload(&self.model);
        tracing::info!(
            ticket,
            size = %payload.input.image_size,
            resolution = %payload.input.image_resolution,
            max_images = payload.input.max_images,
            "Creating generation task"
        );

        let event = match self.shared.api.create_task(&payload).await {
            Ok(task_id) => {
                tracing::info!(ticket, task_id = %task_id, "Task created");
                Event::TaskCreated { ticket, task_id }
            }
            Err(e) => Event::CreateFailed {
                ticket,
                message: e.to_string(),
            },
        };
        self.shared.apply(event);
        self.snapshot()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Receive every snapshot published from now on.
    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// Wait until the current task reaches `success` or `fail`, or until the
    /// controller is disposed. A disposed in-flight task yields an `idle`
    /// snapshot.
    pub async fn wait_for_terminal(&self) -> TaskSnapshot {
        let mut rx = self.subscribe();
        let start = rx.borrow().disposals;
        let outcome = rx
            .wait_for(|s| s.phase.is_terminal() || s.disposals != start)
            .await
            .map(|s| TaskSnapshot::clone(&s));
        // The sender lives in `self`, so the channel cannot close here.
        outcome.unwrap_or_else(|_| self.snapshot())
    }

    /// Whether a poll loop is currently live.
    pub fn is_polling(&self) -> bool {
        self.shared.lock().poll.is_some()
    }

    /// Stop polling and drop any in-flight task. Safe to call repeatedly.
    pub fn dispose(&self) {
        let polling = self.is_polling();
        self.shared.apply(Event::Disposed);
        if polling {
            tracing::info!("Controller disposed while polling");
        }
    }
}

impl<A: JobApi + 'static> Drop for TaskController<A> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SeedreamError};
    use crate::types::{CreateTaskPayload, TaskRecord};

    /// API that must never be reached.
    struct Unreachable;

    impl JobApi for Unreachable {
        async fn create_task(&self, _payload: &CreateTaskPayload) -> Result<String> {
            panic!("create_task must not be called")
        }

        async fn task_status(&self, _task_id: &str) -> Result<TaskRecord> {
            panic!("task_status must not be called")
        }
    }

    struct Refusing;

    impl JobApi for Refusing {
        async fn create_task(&self, _payload: &CreateTaskPayload) -> Result<String> {
            Err(SeedreamError::Api {
                code: 401,
                message: "You do not have access".into(),
            })
        }

        async fn task_status(&self, _task_id: &str) -> Result<TaskRecord> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_empty_image_never_calls_api() {
        let controller = TaskController::new(Unreachable, Duration::from_secs(3));
        let snap = controller.submit(SubmissionRequest::new("prompt", "")).await;
        assert_eq!(snap.phase, Phase::Fail);
        assert_eq!(
            snap.failure.map(|f| f.message),
            Some(machine::MSG_MISSING_IMAGE.to_string())
        );
        assert!(!controller.is_polling());
    }

    #[tokio::test]
    async fn test_pending_upload_error_blocks_submit() {
        let controller = TaskController::new(Unreachable, Duration::from_secs(3));
        controller.report_upload_error("File too large");
        let snap = controller
            .submit(SubmissionRequest::new("p", "https://x/ref.png"))
            .await;
        assert_eq!(
            snap.failure.unwrap().message,
            machine::MSG_UPLOAD_PENDING
        );
    }

    #[tokio::test]
    async fn test_rejected_creation_surfaces_server_message() {
        let controller = TaskController::new(Refusing, Duration::from_secs(3));
        let snap = controller
            .submit(SubmissionRequest::new("p", "https://x/ref.png"))
            .await;
        assert_eq!(snap.phase, Phase::Fail);
        let failure = snap.failure.unwrap();
        assert_eq!(failure.kind, machine::FailureKind::Submission);
        assert_eq!(failure.message, "You do not have access");
        assert!(!controller.is_polling());
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let controller = TaskController::new(Unreachable, Duration::from_secs(3));
        controller.dispose();
        controller.dispose();
        assert_eq!(controller.snapshot().phase, Phase::Idle);
    }
}
