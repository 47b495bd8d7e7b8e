use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.kie.ai/api/v1";
pub const DEFAULT_MODEL: &str = "bytedance/seedream-v4-edit";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the Seedream client and CLI.
///
/// Use [`ClientConfig::builder()`] for ergonomic construction,
/// [`ClientConfig::from_env()`] to read the process environment, or
/// [`ClientConfig::default()`] for the public kie.ai endpoint with no key.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the job API, without a trailing slash.
    pub base_url: String,

    /// Bearer key for the job API. Empty = calls fail with a config error.
    pub api_key: String,

    /// Model id sent with every task.
    pub model: String,

    /// Fixed delay between status polls.
    pub poll_interval: Duration,

    /// Per-request timeout for job API calls.
    pub request_timeout: Duration,

    /// imgbb key for local file uploads. `None` = uploads unavailable.
    pub upload_api_key: Option<String>,

    /// Passcode for the client-side gate. `None` = gate disabled.
    pub gate_pin: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            upload_api_key: None,
            gate_pin: None,
        }
    }
}

impl ClientConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Read configuration from `SEEDREAM_*` / `IMGBB_API_KEY` variables.
    ///
    /// Does not load `.env`; the binary calls `dotenvy` first.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut builder = ClientConfig::builder();

        if let Some(key) = non_empty("SEEDREAM_API_KEY") {
            builder = builder.with_api_key(key);
        }
        if let Some(url) = non_empty("SEEDREAM_BASE_URL") {
            builder = builder.with_base_url(url);
        }
        if let Some(model) = non_empty("SEEDREAM_MODEL") {
            builder = builder.with_model(model);
        }
        if let Some(ms) = parse_number(
            non_empty("SEEDREAM_POLL_INTERVAL_MS"),
            "SEEDREAM_POLL_INTERVAL_MS",
        ) {
            builder = builder.with_poll_interval(Duration::from_millis(ms));
        }
        if let Some(secs) = parse_number(
            non_empty("SEEDREAM_REQUEST_TIMEOUT_SECS"),
            "SEEDREAM_REQUEST_TIMEOUT_SECS",
        ) {
            builder = builder.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(key) = non_empty("IMGBB_API_KEY") {
            builder = builder.with_upload_api_key(key);
        }
        if let Some(pin) = non_empty("SEEDREAM_PIN") {
            builder = builder.with_gate_pin(pin);
        }

        builder.build()
    }
}

fn parse_number(raw: Option<String>, name: &str) -> Option<u64> {
    let raw = raw?;
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring invalid value, using default");
            None
        }
        Ok(n) => Some(n),
    }
}

/// Builder for [`ClientConfig`].
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the job API base URL. Trailing slashes are stripped.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set the fixed delay between status polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn with_upload_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.upload_api_key = Some(key.into());
        self
    }

    pub fn with_gate_pin(mut self, pin: impl Into<String>) -> Self {
        self.config.gate_pin = Some(pin.into());
        self
    }

    /// Build the final [`ClientConfig`].
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
