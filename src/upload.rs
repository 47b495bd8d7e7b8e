//! Reference-image upload to a public image host.
//!
//! The job API only accepts image URLs, so local files are first pushed to
//! imgbb and the returned public URL is submitted instead.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SeedreamError};

const UPLOAD_URL: &str = "https://api.imgbb.com/1/upload";
const MSG_INVALID_TYPE: &str = "Invalid file type. Please select a JPG, PNG, or WEBP image.";
const MSG_UPLOAD_FAILED: &str = "Failed to upload image to hosting service.";
const MSG_UNEXPECTED: &str = "Image hosting service returned an unexpected error.";

/// Accepted reference image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    /// Judge the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("jpg") | Some("jpeg") => Ok(ImageFormat::Jpeg),
            Some("png") => Ok(ImageFormat::Png),
            Some("webp") => Ok(ImageFormat::Webp),
            _ => Err(SeedreamError::Upload(MSG_INVALID_TYPE.into())),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
        }
    }
}

/// Anything that turns image bytes into a publicly reachable URL.
pub trait ImageHost: Send + Sync {
    fn upload(
        &self,
        file_name: &str,
        format: ImageFormat,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<UploadData>,
    #[serde(default)]
    error: Option<UploadError>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadError {
    #[serde(default)]
    message: Option<String>,
}

impl UploadResponse {
    fn error_message(&self) -> Option<String> {
        self.error
            .as_ref()
            .and_then(|e| e.message.clone())
            .filter(|m| !m.is_empty())
    }
}

/// imgbb uploader.
#[derive(Debug, Clone)]
pub struct ImgbbUploader {
    http: Client,
    api_key: String,
    endpoint: String,
}

impl ImgbbUploader {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            endpoint: UPLOAD_URL.to_string(),
        }
    }

    /// Point at a different upload endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Read a local file, check its type, and upload it.
    pub async fn upload_file(&self, path: &Path) -> Result<String> {
        let format = ImageFormat::from_path(path)?;
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();
        self.upload(&name, format, bytes).await
    }
}

impl ImageHost for ImgbbUploader {
    async fn upload(&self, file_name: &str, format: ImageFormat, bytes: Vec<u8>) -> Result<String> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(format.mime_type())
            .map_err(|e| SeedreamError::Network {
                context: "Failed to build upload form".into(),
                source: e,
            })?;
        let form = Form::new().part("image", part);

        let resp = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .timeout(Duration::from_secs(60))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SeedreamError::Network {
                context: "Cannot reach image hosting service".into(),
                source: e,
            })?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| SeedreamError::Network {
            context: "Failed to read image hosting response".into(),
            source: e,
        })?;
        interpret(status, &body)
    }
}

fn interpret(status: u16, body: &str) -> Result<String> {
    let parsed = serde_json::from_str::<UploadResponse>(body).ok();
    if !(200..300).contains(&status) {
        let message = parsed.as_ref().and_then(UploadResponse::error_message);
        return Err(SeedreamError::Upload(
            message.unwrap_or_else(|| MSG_UPLOAD_FAILED.into()),
        ));
    }

    let Some(parsed) = parsed else {
        return Err(SeedreamError::Upload(MSG_UNEXPECTED.into()));
    };
    let url = parsed
        .data
        .as_ref()
        .and_then(|d| d.url.clone())
        .filter(|u| !u.is_empty());
    match url {
        Some(url) if parsed.success => Ok(url),
        _ => Err(SeedreamError::Upload(
            parsed
                .error_message()
                .unwrap_or_else(|| MSG_UNEXPECTED.into()),
        )),
    }
}
