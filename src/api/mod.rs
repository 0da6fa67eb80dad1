// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Remote generation service interface.
//!
//! The application only talks to the service through [`GenerationApi`] so
//! the orchestrators can be driven by an in-memory fake in tests.

pub mod http;

use crate::error::{StudioError, StudioResult};
use crate::util::geometry::AspectRatio;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Still image generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,
    /// Base64 PNG inputs, the canvas snapshot first when there is one.
    pub images: Vec<String>,
    /// Ask the service to honour `aspect_ratio` rather than the inputs' shape.
    pub force_aspect_ratio: bool,
}

/// Single clip video generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRequest {
    pub model: String,
    pub prompt: String,
    /// Base64 PNG first frame.
    pub start_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_image: Option<String>,
    pub aspect_ratio: AspectRatio,
    pub duration_seconds: f64,
    pub with_audio: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotRequest {
    pub prompt: String,
    pub duration_seconds: f64,
}

/// Several prompts rendered as one continuous clip.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiShotRequest {
    pub model: String,
    pub shots: Vec<ShotRequest>,
    pub start_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_image: Option<String>,
    pub aspect_ratio: AspectRatio,
    pub total_duration: f64,
    pub with_audio: bool,
}

/// Encoded image bytes returned by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
}

/// Location of a finished video.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedVideo {
    pub url: String,
}

/// Calls the remote generation backend. Implementations block, so they
/// are only used from worker threads.
pub trait GenerationApi: Send + Sync {
    fn generate_image(&self, request: &ImageRequest) -> StudioResult<GeneratedImage>;
    fn generate_video(&self, request: &VideoRequest) -> StudioResult<GeneratedVideo>;
    fn generate_multi_shot_video(&self, request: &MultiShotRequest) -> StudioResult<GeneratedVideo>;
    /// Remaining credit balance for the signed-in user.
    fn credits(&self) -> StudioResult<i64>;
}

/// One observation of a remote job.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    Pending,
    Completed(T),
    Failed(String),
}

/// Bounded polling of a long-running remote job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 120,
            interval: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self { max_attempts, interval }
    }

    /// Call `check` until it reports a terminal state or the attempts run
    /// out. Errors from `check` end polling immediately.
    pub fn poll<T>(&self, mut check: impl FnMut(u32) -> StudioResult<PollStatus<T>>) -> StudioResult<T> {
        for attempt in 1..=self.max_attempts {
            match check(attempt)? {
                PollStatus::Completed(value) => return Ok(value),
                PollStatus::Failed(message) => return Err(StudioError::classify(&message)),
                PollStatus::Pending => {
                    log::debug!("Job pending (attempt {}/{})", attempt, self.max_attempts);
                    if attempt < self.max_attempts && !self.interval.is_zero() {
                        std::thread::sleep(self.interval);
                    }
                }
            }
        }
        Err(StudioError::service(format!(
            "timed out waiting for the job after {} attempts",
            self.max_attempts
        )))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_completes() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let result = policy.poll(|attempt| {
            Ok(if attempt < 3 {
                PollStatus::Pending
            } else {
                PollStatus::Completed(attempt)
            })
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_poll_times_out() {
        let policy = RetryPolicy::new(4, Duration::ZERO);
        let mut seen = 0;
        let result: StudioResult<()> = policy.poll(|_| {
            seen += 1;
            Ok(PollStatus::Pending)
        });
        assert!(matches!(result, Err(StudioError::Service(_))));
        assert_eq!(seen, 4);
    }

    #[test]
    fn test_poll_failure_is_classified() {
        let policy = RetryPolicy::new(4, Duration::ZERO);
        let result: StudioResult<()> = policy.poll(|_| Ok(PollStatus::Failed("blocked by safety filter".into())));
        assert!(matches!(result, Err(StudioError::SafetyFilterBlocked)));
    }

    #[test]
    fn test_request_wire_names() {
        let req = ImageRequest {
            model: "m".into(),
            prompt: "p".into(),
            aspect_ratio: AspectRatio::Wide,
            image_size: None,
            images: vec![],
            force_aspect_ratio: true,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["aspectRatio"], "16:9");
        assert_eq!(json["forceAspectRatio"], true);
        assert!(json.get("imageSize").is_none());
    }
}
