use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output aspect category accepted by the Seedream edit model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageSize {
    #[serde(rename = "square")]
    Square,
    #[default]
    #[serde(rename = "square_hd")]
    SquareHd,
    #[serde(rename = "portrait_4_3")]
    Portrait4x3,
    #[serde(rename = "portrait_16_9")]
    Portrait16x9,
    #[serde(rename = "landscape_4_3")]
    Landscape4x3,
    #[serde(rename = "landscape_16_9")]
    Landscape16x9,
}

impl ImageSize {
    pub const ALL: [ImageSize; 6] = [
        ImageSize::Square,
        ImageSize::SquareHd,
        ImageSize::Portrait4x3,
        ImageSize::Portrait16x9,
        ImageSize::Landscape4x3,
        ImageSize::Landscape16x9,
    ];

    /// Wire name sent in `image_size`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::Square => "square",
            ImageSize::SquareHd => "square_hd",
            ImageSize::Portrait4x3 => "portrait_4_3",
            ImageSize::Portrait16x9 => "portrait_16_9",
            ImageSize::Landscape4x3 => "landscape_4_3",
            ImageSize::Landscape16x9 => "landscape_16_9",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            ImageSize::Square => "Square",
            ImageSize::SquareHd => "Square HD",
            ImageSize::Portrait4x3 => "Portrait (3:4)",
            ImageSize::Portrait16x9 => "Portrait (9:16)",
            ImageSize::Landscape4x3 => "Landscape (4:3)",
            ImageSize::Landscape16x9 => "Landscape (16:9)",
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageSize::ALL
            .into_iter()
            .find(|size| size.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<_> = ImageSize::ALL.iter().map(ImageSize::as_str).collect();
                format!("unknown image size '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

/// Output resolution category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageResolution {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl ImageResolution {
    pub const ALL: [ImageResolution; 3] = [
        ImageResolution::OneK,
        ImageResolution::TwoK,
        ImageResolution::FourK,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageResolution::OneK => "1K",
            ImageResolution::TwoK => "2K",
            ImageResolution::FourK => "4K",
        }
    }
}

impl fmt::Display for ImageResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageResolution::ALL
            .into_iter()
            .find(|res| res.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown image resolution '{}' (expected 1K, 2K or 4K)", s))
    }
}

/// `input` object of a task-creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskInput {
    pub prompt: String,
    pub image_urls: Vec<String>,
    pub image_size: ImageSize,
    pub image_resolution: ImageResolution,
    pub max_images: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

/// Full body of `POST /jobs/createTask`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskPayload {
    pub model: String,
    pub input: CreateTaskInput,
}

/// `{ code, msg, data }` envelope shared by both job endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTask {
    #[serde(default)]
    pub task_id: Option<String>,
}

/// Remote job state as reported by `recordInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteState {
    Waiting,
    Success,
    Fail,
    /// Any other value; treated as still in progress.
    #[serde(other)]
    Other,
}

impl RemoteState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteState::Success | RemoteState::Fail)
    }
}

/// `data` object of `GET /jobs/recordInfo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub task_id: String,
    #[serde(default)]
    pub model: Option<String>,
    pub state: RemoteState,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub result_json: Option<String>,
    #[serde(default)]
    pub fail_code: Option<String>,
    #[serde(default)]
    pub fail_msg: Option<String>,
    #[serde(default)]
    pub cost_time: Option<i64>,
    #[serde(default)]
    pub complete_time: Option<i64>,
    #[serde(default)]
    pub create_time: Option<i64>,
}

impl TaskRecord {
    /// Bare record with only an id and state, mostly useful in tests.
    pub fn new(task_id: impl Into<String>, state: RemoteState) -> Self {
        Self {
            task_id: task_id.into(),
            model: None,
            state,
            param: None,
            result_json: None,
            fail_code: None,
            fail_msg: None,
            cost_time: None,
            complete_time: None,
            create_time: None,
        }
    }

    pub fn with_result_json(mut self, json: impl Into<String>) -> Self {
        self.result_json = Some(json.into());
        self
    }

    pub fn with_fail_msg(mut self, msg: impl Into<String>) -> Self {
        self.fail_msg = Some(msg.into());
        self
    }
}

/// Decoded contents of `resultJson`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPayload {
    /// `null` and a missing field both mean no images.
    #[serde(default)]
    pub result_urls: Option<Vec<String>>,
}

impl ResultPayload {
    pub fn into_urls(self) -> Vec<String> {
        self.result_urls.unwrap_or_default()
    }
}
