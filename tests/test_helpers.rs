use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use seedream_edit::*;

#[derive(Default)]
struct Script {
    task_ids: VecDeque<Result<String>>,
    statuses: VecDeque<Result<TaskRecord>>,
    status_delay: Duration,
    created: Vec<CreateTaskPayload>,
    polled: Vec<String>,
}

/// Scripted job API. Clones share one script, so a test keeps a handle
/// after moving a clone into the controller.
#[derive(Clone, Default)]
pub struct FakeApi {
    script: Arc<Mutex<Script>>,
}

#[allow(dead_code)]
impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue creation results, consumed one per `create_task` call.
    pub fn with_task_ids(self, ids: &[&str]) -> Self {
        self.script
            .lock()
            .unwrap()
            .task_ids
            .extend(ids.iter().map(|id| Ok(id.to_string())));
        self
    }

    pub fn with_create_error(self, error: SeedreamError) -> Self {
        self.script.lock().unwrap().task_ids.push_back(Err(error));
        self
    }

    /// Queue a status response. Once the queue is empty every poll reports
    /// `waiting`.
    pub fn with_status(self, status: Result<TaskRecord>) -> Self {
        self.script.lock().unwrap().statuses.push_back(status);
        self
    }

    /// Delay every status response by `delay`.
    pub fn with_status_delay(self, delay: Duration) -> Self {
        self.script.lock().unwrap().status_delay = delay;
        self
    }

    pub fn created(&self) -> Vec<CreateTaskPayload> {
        self.script.lock().unwrap().created.clone()
    }

    pub fn polled(&self) -> Vec<String> {
        self.script.lock().unwrap().polled.clone()
    }
}

impl JobApi for FakeApi {
    async fn create_task(&self, payload: &CreateTaskPayload) -> Result<String> {
        let mut script = self.script.lock().unwrap();
        script.created.push(payload.clone());
        let n = script.created.len();
        script
            .task_ids
            .pop_front()
            .unwrap_or_else(|| Ok(format!("task-{}", n)))
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskRecord> {
        let delay = {
            let mut script = self.script.lock().unwrap();
            script.polled.push(task_id.to_string());
            script.status_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .statuses
            .pop_front()
            .unwrap_or_else(|| Ok(TaskRecord::new(task_id, RemoteState::Waiting)))
    }
}

#[allow(dead_code)]
pub fn success(task_id: &str, urls: &[&str]) -> Result<TaskRecord> {
    let json = serde_json::json!({ "resultUrls": urls }).to_string();
    Ok(TaskRecord::new(task_id, RemoteState::Success).with_result_json(json))
}

#[allow(dead_code)]
pub fn request() -> SubmissionRequest {
    SubmissionRequest::new("add a rainbow", "https://example.com/ref.png")
}
