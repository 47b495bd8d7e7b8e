use crate::types::{CreateTaskInput, CreateTaskPayload, ImageResolution, ImageSize};

pub const MIN_IMAGES: u8 = 1;
pub const MAX_IMAGES: u8 = 6;
pub const MAX_PROMPT_CHARS: usize = 5000;

/// One image-editing submission: prompt, reference image, and output options.
///
/// # Example
/// ```
/// use seedream_edit::{ImageResolution, ImageSize, SubmissionRequest};
///
/// let request = SubmissionRequest::new("make it snow", "https://example.com/cat.png")
///     .size(ImageSize::Landscape16x9)
///     .resolution(ImageResolution::TwoK)
///     .max_images(4)
///     .seed(42);
///
/// let payload = request.to_payload("bytedance/seedream-v4-edit");
/// assert_eq!(payload.input.image_urls, vec!["https://example.com/cat.png"]);
/// assert_eq!(payload.input.max_images, 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRequest {
    pub prompt: String,
    pub image_url: String,
    pub image_size: ImageSize,
    pub image_resolution: ImageResolution,
    pub max_images: u8,
    pub seed: Option<i64>,
}

impl SubmissionRequest {
    /// Create a request with defaults for everything but the prompt and
    /// reference image (square HD, 1K, one image, no seed).
    pub fn new(prompt: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image_url: image_url.into(),
            image_size: ImageSize::default(),
            image_resolution: ImageResolution::default(),
            max_images: MIN_IMAGES,
            seed: None,
        }
    }

    pub fn size(mut self, size: ImageSize) -> Self {
        self.image_size = size;
        self
    }

    pub fn resolution(mut self, resolution: ImageResolution) -> Self {
        self.image_resolution = resolution;
        self
    }

    /// Set the number of images to generate, clamped to 1..=6.
    pub fn max_images(mut self, count: u8) -> Self {
        self.max_images = count.clamp(MIN_IMAGES, MAX_IMAGES);
        self
    }

    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the seed from free text; text without a leading integer clears it.
    pub fn seed_text(mut self, text: &str) -> Self {
        self.seed = parse_seed(text);
        self
    }

    /// Build the task-creation body for `model`.
    pub fn to_payload(&self, model: &str) -> CreateTaskPayload {
        CreateTaskPayload {
            model: model.to_string(),
            input: CreateTaskInput {
                prompt: self.prompt.clone(),
                image_urls: vec![self.image_url.clone()],
                image_size: self.image_size,
                image_resolution: self.image_resolution,
                max_images: self.max_images.clamp(MIN_IMAGES, MAX_IMAGES),
                seed: self.seed,
            },
        }
    }
}

/// Parse the leading integer of `text` (`"42px"` -> 42). Leading whitespace
/// and a single sign are allowed.
pub fn parse_seed(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let digits_start = usize::from(trimmed.starts_with(['-', '+']));
    let digits_len = trimmed[digits_start..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits_len == 0 {
        return None;
    }
    trimmed[..digits_start + digits_len].parse().ok()
}
