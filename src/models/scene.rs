// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Studio scene data structures.
//!
//! A scene is one generated clip slot of the movie timeline: its frames,
//! its prompt shots and the videos generated for it so far.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of shots in a multi-shot scene.
pub const MAX_SHOTS: usize = 6;
/// Allowed total duration of a multi-shot scene, in seconds.
pub const MULTI_SHOT_MIN_SECONDS: f64 = 3.0;
pub const MULTI_SHOT_MAX_SECONDS: f64 = 15.0;
/// Duration given to a freshly added shot.
pub const DEFAULT_SHOT_SECONDS: f64 = 5.0;

/// One prompt segment of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub prompt: String,
    /// Seconds.
    pub duration: f64,
}

impl Default for Shot {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            duration: DEFAULT_SHOT_SECONDS,
        }
    }
}

/// Output orientation of generated clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Decided from the start frame's pixel dimensions.
    #[default]
    Auto,
    Horizontal,
    Vertical,
}

/// A frame image stored by source reference plus its natural size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameImage {
    pub src: String,
    pub width: u32,
    pub height: u32,
}

/// A studio scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: Uuid,
    pub start_frame: Option<FrameImage>,
    pub end_frame: Option<FrameImage>,
    pub shots: Vec<Shot>,
    pub videos: Vec<String>,
    pub selected_video_index: Option<usize>,
    #[serde(default, skip_serializing)]
    pub is_generating: bool,
    pub variation_count: u32,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            start_frame: None,
            end_frame: None,
            shots: vec![Shot::default()],
            videos: Vec::new(),
            selected_video_index: None,
            is_generating: false,
            variation_count: 1,
        }
    }

    /// Total duration of all shots in seconds.
    pub fn total_duration(&self) -> f64 {
        self.shots.iter().map(|s| s.duration).sum()
    }

    pub fn is_multi_shot(&self) -> bool {
        self.shots.len() >= 2
    }

    /// Add a shot unless the scene already holds the maximum.
    pub fn add_shot(&mut self) -> bool {
        if self.shots.len() >= MAX_SHOTS {
            return false;
        }
        self.shots.push(Shot::default());
        true
    }

    /// Remove a shot; the last remaining shot is never removed.
    pub fn remove_shot(&mut self, index: usize) -> bool {
        if self.shots.len() <= 1 || index >= self.shots.len() {
            return false;
        }
        self.shots.remove(index);
        true
    }

    /// URL of the video chosen for export, if any.
    pub fn selected_video(&self) -> Option<&str> {
        self.selected_video_index
            .and_then(|i| self.videos.get(i))
            .map(String::as_str)
    }

    /// Append a generated video, selecting it when nothing is selected yet.
    pub fn push_video(&mut self, url: String) {
        self.videos.push(url);
        if self.selected_video_index.is_none() {
            self.selected_video_index = Some(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shot_bounds() {
        let mut scene = Scene::new();
        assert!(!scene.remove_shot(0));
        for _ in 1..MAX_SHOTS {
            assert!(scene.add_shot());
        }
        assert!(!scene.add_shot());
        assert_eq!(scene.shots.len(), MAX_SHOTS);
        assert!((scene.total_duration() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_push_video_selects_first() {
        let mut scene = Scene::new();
        scene.push_video("a.mp4".into());
        scene.push_video("b.mp4".into());
        assert_eq!(scene.selected_video(), Some("a.mp4"));
    }
}
