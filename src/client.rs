use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{Result, SeedreamError};
use crate::types::{CreateTaskPayload, CreatedTask, Envelope, TaskRecord};

const MISSING_KEY: &str =
    "API key is not configured. Please set the SEEDREAM_API_KEY environment variable.";
const CREATE_FALLBACK: &str = "Failed to create task.";
const STATUS_FALLBACK: &str = "Failed to get task status.";

fn normalize(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// The two job endpoints the task controller depends on.
///
/// [`JobClient`] talks to the real service; tests substitute a scripted
/// implementation.
pub trait JobApi: Send + Sync {
    /// Create a task. Returns the server-assigned task id.
    fn create_task(
        &self,
        payload: &CreateTaskPayload,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Fetch the current record for `task_id`.
    fn task_status(&self, task_id: &str) -> impl Future<Output = Result<TaskRecord>> + Send;
}

/// Async client for the kie.ai job API.
///
/// # Example
/// ```no_run
/// use seedream_edit::{JobApi, JobClient, SubmissionRequest};
///
/// # async fn example() -> seedream_edit::Result<()> {
/// let client = JobClient::new("https://api.kie.ai/api/v1", "my-key");
/// let payload = SubmissionRequest::new("make it night", "https://example.com/in.png")
///     .to_payload("bytedance/seedream-v4-edit");
/// let task_id = client.create_task(&payload).await?;
/// let record = client.task_status(&task_id).await?;
/// println!("{:?}", record.state);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct JobClient {
    http: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl JobClient {
    /// Create a client for `endpoint` authenticated with `api_key`.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: normalize(endpoint.into()),
            api_key: api_key.into(),
            timeout: crate::config::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.base_url.clone(), config.api_key.clone())
            .with_timeout(config.request_timeout)
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the configured endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn bearer(&self) -> Result<String> {
        if self.api_key.trim().is_empty() {
            return Err(SeedreamError::Config(MISSING_KEY.into()));
        }
        Ok(format!("Bearer {}", self.api_key))
    }

    // ── Tasks ───────────────────────────────────────────────────────

    async fn create(&self, payload: &CreateTaskPayload) -> Result<String> {
        let auth = self.bearer()?;
        let url = format!("{}/jobs/createTask", self.endpoint);
        let resp = self
            .http
            .post(&url)
            .header(AUTHORIZATION, auth)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| SeedreamError::Network {
                context: format!("Cannot reach job API at {}", self.endpoint),
                source: e,
            })?;

        let (status, body) = read_body(resp).await?;
        interpret_created(status, &body)
    }

    async fn status(&self, task_id: &str) -> Result<TaskRecord> {
        let auth = self.bearer()?;
        let url = format!("{}/jobs/recordInfo", self.endpoint);
        let resp = self
            .http
            .get(&url)
            .query(&[("taskId", task_id)])
            .header(AUTHORIZATION, auth)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SeedreamError::Network {
                context: "Failed to fetch task status".into(),
                source: e,
            })?;

        let (status, body) = read_body(resp).await?;
        interpret_status(status, &body)
    }

    // ── Image download ──────────────────────────────────────────────

    /// Download a result image. Returns raw bytes.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SeedreamError::Network {
                context: format!("Failed to fetch image {}", url),
                source: e,
            })?;

        if !resp.status().is_success() {
            return Err(SeedreamError::Http {
                status: resp.status().as_u16(),
                message: format!(
                    "Network response was not ok, status: {}",
                    resp.status().as_u16()
                ),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| SeedreamError::Network {
            context: "Failed to read image bytes".into(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }
}

impl JobApi for JobClient {
    async fn create_task(&self, payload: &CreateTaskPayload) -> Result<String> {
        self.create(payload).await
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskRecord> {
        self.status(task_id).await
    }
}

async fn read_body(resp: Response) -> Result<(u16, String)> {
    let status = resp.status().as_u16();
    let body = resp.text().await.map_err(|e| SeedreamError::Network {
        context: "Failed to read job API response".into(),
        source: e,
    })?;
    Ok((status, body))
}

/// Turn a non-2xx status into [`SeedreamError::Http`], otherwise decode the body.
fn decode_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<Envelope<T>> {
    if !(200..300).contains(&status) {
        return Err(SeedreamError::Http {
            status,
            message: error_message(status, body),
        });
    }
    Ok(serde_json::from_str(body)?)
}

fn api_error<T>(envelope: &Envelope<T>, fallback: &str) -> SeedreamError {
    SeedreamError::Api {
        code: envelope.code,
        message: envelope
            .msg
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| fallback.into()),
    }
}

/// Task id from a `createTask` response.
fn interpret_created(status: u16, body: &str) -> Result<String> {
    let envelope: Envelope<CreatedTask> = decode_envelope(status, body)?;
    if envelope.code != 200 {
        return Err(api_error(&envelope, CREATE_FALLBACK));
    }
    let error = api_error(&envelope, CREATE_FALLBACK);
    envelope
        .data
        .and_then(|d| d.task_id)
        .filter(|id| !id.is_empty())
        .ok_or(error)
}

/// Task record from a `recordInfo` response.
fn interpret_status(status: u16, body: &str) -> Result<TaskRecord> {
    let envelope: Envelope<TaskRecord> = decode_envelope(status, body)?;
    if envelope.code != 200 {
        return Err(api_error(&envelope, STATUS_FALLBACK));
    }
    envelope
        .data
        .ok_or_else(|| SeedreamError::InvalidResponse("Status response missing data".into()))
}

/// The server's `msg` when the error body carries one, else a status line.
fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json.get("msg").and_then(|m| m.as_str()).map(String::from))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP error! status: {}", status))
}
