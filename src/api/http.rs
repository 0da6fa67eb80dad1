// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Blocking HTTP client for the generation backend.

use super::{
    GeneratedImage, GeneratedVideo, GenerationApi, ImageRequest, MultiShotRequest, PollStatus, RetryPolicy,
    VideoRequest,
};
use crate::error::{StudioError, StudioResult};
use crate::io::media;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// HTTP status the backend uses for an exhausted credit balance.
const PAYMENT_REQUIRED: u16 = 402;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResponse {
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    status: String,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreditsResponse {
    credits: i64,
}

/// [`GenerationApi`] over JSON/HTTP.
pub struct HttpGenerationApi {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
    user_id: String,
    poll: RetryPolicy,
}

impl HttpGenerationApi {
    pub fn new(base_url: &str, token: Option<String>, user_id: impl Into<String>, poll: RetryPolicy) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(300))
            .timeout_write(Duration::from_secs(60))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            user_id: user_id.into(),
            poll,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, req: ureq::Request) -> ureq::Request {
        let req = req
            .set("Accept", "application/json")
            .set("X-User-Id", &self.user_id);
        match &self.token {
            Some(token) => req.set("Authorization", &format!("Bearer {token}")),
            None => req,
        }
    }

    fn read_body(result: Result<ureq::Response, ureq::Error>, what: &str) -> StudioResult<String> {
        match result {
            Ok(resp) => resp
                .into_string()
                .map_err(|e| StudioError::service(format!("failed to read {what} response: {e}"))),
            Err(ureq::Error::Status(code, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                log::warn!("{} returned HTTP {}: {}", what, code, text);
                if code == PAYMENT_REQUIRED {
                    return Err(StudioError::InsufficientCredits);
                }
                Err(StudioError::classify(&error_message(&text).unwrap_or_else(|| format!("HTTP {code}"))))
            }
            Err(e) => Err(StudioError::service(format!("failed to reach {what}: {e}"))),
        }
    }

    fn post_json<T: serde::Serialize>(&self, path: &str, body: &T) -> StudioResult<String> {
        let payload =
            serde_json::to_string(body).map_err(|e| StudioError::local(format!("failed to encode request: {e}")))?;
        let req = self
            .authorize(self.agent.post(&self.url(path)))
            .set("Content-Type", "application/json");
        Self::read_body(req.send_string(&payload), path)
    }

    fn get(&self, path: &str) -> StudioResult<String> {
        let req = self.authorize(self.agent.get(&self.url(path)));
        Self::read_body(req.call(), path)
    }

    fn parse<T: serde::de::DeserializeOwned>(body: &str, what: &str) -> StudioResult<T> {
        if let Some(message) = error_message(body) {
            return Err(StudioError::classify(&message));
        }
        serde_json::from_str(body).map_err(|e| StudioError::service(format!("invalid {what} response: {e}")))
    }

    /// Resolve a video response, polling the job when it is not ready yet.
    fn finish_video(&self, body: &str) -> StudioResult<GeneratedVideo> {
        let resp: VideoResponse = Self::parse(body, "video")?;
        if let Some(url) = resp.video_url {
            return Ok(GeneratedVideo { url });
        }
        let Some(job_id) = resp.job_id else {
            return Err(StudioError::service("video response has neither a URL nor a job id"));
        };
        log::info!("Polling video job {}", job_id);
        self.poll.poll(|_| {
            let body = self.get(&format!("videoStatus/{job_id}"))?;
            let status: JobStatus = Self::parse(&body, "job status")?;
            Ok(job_status(status))
        })
    }
}

fn job_status(status: JobStatus) -> PollStatus<GeneratedVideo> {
    match status.status.to_lowercase().as_str() {
        "completed" | "succeeded" | "done" => match status.video_url {
            Some(url) => PollStatus::Completed(GeneratedVideo { url }),
            None => PollStatus::Failed("job completed without a video".to_string()),
        },
        "failed" | "error" | "cancelled" => {
            PollStatus::Failed(status.error.unwrap_or_else(|| "video generation failed".to_string()))
        }
        _ => PollStatus::Pending,
    }
}

/// Extract `error` (string or `{message}`) from a JSON body.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    match error {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| map.get("code").and_then(Value::as_str).map(str::to_string)),
        _ => None,
    }
}

impl GenerationApi for HttpGenerationApi {
    fn generate_image(&self, request: &ImageRequest) -> StudioResult<GeneratedImage> {
        log::info!("Requesting image from {} ({})", request.model, request.aspect_ratio.label());
        let body = self.post_json("generateImage", request)?;
        let resp: ImageResponse = Self::parse(&body, "image")?;
        let bytes = match (resp.image, resp.image_url) {
            (Some(b64), _) => media::from_base64(&b64)
                .map_err(|e| StudioError::service(format!("invalid image payload: {e}")))?,
            (None, Some(url)) => media::load_source_bytes(&url)
                .map_err(|e| StudioError::service(format!("failed to download image: {e}")))?,
            (None, None) => return Err(StudioError::service("image response has no image")),
        };
        Ok(GeneratedImage { bytes })
    }

    fn generate_video(&self, request: &VideoRequest) -> StudioResult<GeneratedVideo> {
        log::info!("Requesting {}s video ({})", request.duration_seconds, request.aspect_ratio.label());
        let body = self.post_json("generateVideo", request)?;
        self.finish_video(&body)
    }

    fn generate_multi_shot_video(&self, request: &MultiShotRequest) -> StudioResult<GeneratedVideo> {
        log::info!(
            "Requesting {}-shot video, {}s total",
            request.shots.len(),
            request.total_duration
        );
        let body = self.post_json("generateMultiShotVideo", request)?;
        self.finish_video(&body)
    }

    fn credits(&self) -> StudioResult<i64> {
        let body = self.get("credits")?;
        let resp: CreditsResponse = Self::parse(&body, "credits")?;
        Ok(resp.credits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(r#"{"error":"insufficient credits"}"#).as_deref(), Some("insufficient credits"));
        assert_eq!(
            error_message(r#"{"error":{"code":"resource-exhausted","message":"Not enough credits"}}"#).as_deref(),
            Some("Not enough credits")
        );
        assert!(error_message(r#"{"videoUrl":"x"}"#).is_none());
        assert!(error_message("not json").is_none());
    }

    #[test]
    fn test_job_status_mapping() {
        let done = JobStatus {
            status: "COMPLETED".into(),
            video_url: Some("https://v/1.mp4".into()),
            error: None,
        };
        assert_eq!(
            job_status(done),
            PollStatus::Completed(GeneratedVideo {
                url: "https://v/1.mp4".into()
            })
        );
        let running = JobStatus {
            status: "running".into(),
            video_url: None,
            error: None,
        };
        assert_eq!(job_status(running), PollStatus::Pending);
        let failed = JobStatus {
            status: "failed".into(),
            video_url: None,
            error: Some("safety".into()),
        };
        assert_eq!(job_status(failed), PollStatus::Failed("safety".into()));
    }

    #[test]
    fn test_body_error_is_classified() {
        let err = HttpGenerationApi::parse::<CreditsResponse>(r#"{"error":"insufficient_credits"}"#, "credits")
            .unwrap_err();
        assert!(matches!(err, StudioError::InsufficientCredits));
        let ok: CreditsResponse = HttpGenerationApi::parse(r#"{"credits":42}"#, "credits").unwrap();
        assert_eq!(ok.credits, 42);
    }
}
