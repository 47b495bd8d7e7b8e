use thiserror::Error;

/// Errors returned by Seedream API, upload, and gate-store operations.
#[derive(Error, Debug)]
pub enum SeedreamError {
    /// The server returned a non-success HTTP status.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// The response envelope carried an application code other than 200.
    #[error("{message}")]
    Api { code: i64, message: String },

    /// The response was missing expected fields.
    #[error("{0}")]
    InvalidResponse(String),

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing or invalid client configuration.
    #[error("{0}")]
    Config(String),

    /// The image hosting service rejected an upload.
    #[error("{0}")]
    Upload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SeedreamError>;
