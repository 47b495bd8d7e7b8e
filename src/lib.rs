//! # seedream-edit
//!
//! Async Rust client for Seedream V4 image editing on the kie.ai job API.
//!
//! A generation is an asynchronous remote task: it is created, polled at a
//! fixed interval until it completes or fails, and its result URLs are
//! parsed out of the final record. [`TaskController`] owns that lifecycle,
//! keeps at most one poll loop alive, and publishes a [`TaskSnapshot`] after
//! every change.
//!
//! ## Quick Start
//!
//! ```no_run
//! use seedream_edit::{
//!     ClientConfig, ImageResolution, ImageSize, JobClient, Phase, SubmissionRequest,
//!     TaskController,
//! };
//!
//! # async fn example() {
//! let config = ClientConfig::from_env();
//! let controller = TaskController::from_config(JobClient::from_config(&config), &config);
//!
//! let request = SubmissionRequest::new("turn the sky purple", "https://example.com/in.png")
//!     .size(ImageSize::Landscape16x9)
//!     .resolution(ImageResolution::TwoK)
//!     .max_images(2);
//!
//! controller.submit(request).await;
//! let done = controller.wait_for_terminal().await;
//! if done.phase == Phase::Success {
//!     for url in &done.images {
//!         println!("{}", url);
//!     }
//! }
//! # }
//! ```

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod gate;
pub mod machine;
pub mod request;
pub mod types;
pub mod upload;

pub use client::{JobApi, JobClient};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use controller::{TaskController, TaskSnapshot};
pub use error::{Result, SeedreamError};
pub use gate::{FileGateStore, GateOutcome, GateStore, MemoryGateStore, PinGate};
pub use machine::{Effect, Event, FailureKind, Phase, TaskFailure, TaskState};
pub use request::SubmissionRequest;
pub use types::{CreateTaskPayload, ImageResolution, ImageSize, RemoteState, TaskRecord};
pub use upload::{ImageFormat, ImageHost, ImgbbUploader};
