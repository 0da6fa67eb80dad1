// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Error taxonomy for generation, studio and export operations.
//!
//! Every remote or media failure is converted to a [`StudioError`] at the
//! operation boundary and shown to the user as one notification.

pub type StudioResult<T> = Result<T, StudioError>;

/// Phrases that mark a content policy rejection. Bare words like "blocked"
/// also show up in rate limit and firewall responses, so they are not enough.
const SAFETY_PHRASES: &[&str] = &[
    "safety",
    "content policy",
    "content_policy",
    "responsible ai",
    "raimediafiltered",
    "prohibited content",
];

#[derive(thiserror::Error, Debug)]
pub enum StudioError {
    #[error("insufficient credits")]
    InsufficientCredits,

    #[error("blocked by the safety filter")]
    SafetyFilterBlocked,

    #[error("service error: {0}")]
    Service(String),

    #[error("local resource error: {0}")]
    LocalResource(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StudioError {
    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }

    pub fn local(msg: impl Into<String>) -> Self {
        Self::LocalResource(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Classify a failure message reported by the remote service.
    ///
    /// Credit exhaustion and safety rejections get their own variants, anything
    /// else is a generic service failure.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("insufficient credits")
            || lower.contains("insufficient_credits")
            || lower.contains("not enough credits")
            || lower.contains("resource-exhausted")
        {
            Self::InsufficientCredits
        } else if SAFETY_PHRASES.iter().any(|p| lower.contains(p)) {
            Self::SafetyFilterBlocked
        } else {
            Self::Service(message.to_string())
        }
    }

    /// Text of the notification shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::InsufficientCredits => {
                "You have run out of credits. Top up your balance to keep generating.".to_string()
            }
            Self::SafetyFilterBlocked => {
                "The request was blocked by the safety filter. Try a different prompt or image."
                    .to_string()
            }
            Self::Service(_) | Self::Other(_) => "Generation failed. Please try again.".to_string(),
            Self::LocalResource(msg) | Self::Validation(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_credit_and_safety_messages() {
        assert!(matches!(
            StudioError::classify("Insufficient credits: need 4, have 1"),
            StudioError::InsufficientCredits
        ));
        assert!(matches!(
            StudioError::classify("video was filtered by safety policy"),
            StudioError::SafetyFilterBlocked
        ));
        assert!(matches!(StudioError::classify("HTTP 500"), StudioError::Service(_)));
    }

    #[test]
    fn test_generic_blocks_are_service_errors() {
        for message in [
            "Too many requests: client temporarily blocked",
            "Request blocked by firewall",
            "parameter filtered: unsupported size",
        ] {
            assert!(matches!(StudioError::classify(message), StudioError::Service(_)), "{message}");
        }
        assert!(matches!(
            StudioError::classify("Video generation failed: RAIMediaFiltered"),
            StudioError::SafetyFilterBlocked
        ));
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let credits = StudioError::InsufficientCredits.user_message();
        let safety = StudioError::SafetyFilterBlocked.user_message();
        let generic = StudioError::service("timeout").user_message();
        assert_ne!(credits, safety);
        assert_ne!(credits, generic);
        assert_ne!(safety, generic);
        assert_eq!(StudioError::validation("Add a start frame").user_message(), "Add a start frame");
    }

    #[test]
    fn test_other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = StudioError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
