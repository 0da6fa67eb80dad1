// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Application configuration.
//!
//! Read from `visualizae.yaml` in the working directory, or from the file
//! named by `VISUALIZAE_CONFIG`. Every field has a default, so a partial
//! file (or none at all) is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "VISUALIZAE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "visualizae.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the generation backend.
    pub api_base_url: String,
    /// Environment variable holding the bearer token.
    pub api_token_env: String,
    pub user_id: String,
    /// Projects, thumbnails and generated assets live here.
    pub data_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub export_fps: u32,
    pub poll_interval_secs: u64,
    pub poll_max_attempts: u32,
    pub autosave_debounce_ms: u64,
    pub label_font_path: Option<PathBuf>,
    pub image_model: String,
    pub video_model: String,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".visualizae"))
            .unwrap_or_else(|| PathBuf::from("visualizae-data"));
        Self {
            api_base_url: "http://localhost:5001/visualizae/us-central1".to_string(),
            api_token_env: "VISUALIZAE_API_TOKEN".to_string(),
            user_id: "local-user".to_string(),
            data_dir,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            export_fps: 30,
            poll_interval_secs: 5,
            poll_max_attempts: 120,
            autosave_debounce_ms: 2000,
            label_font_path: None,
            image_model: "gemini-2.5-flash-image".to_string(),
            video_model: "veo-3.1-fast-generate-preview".to_string(),
            canvas_width: 1920,
            canvas_height: 1080,
        }
    }
}

impl AppConfig {
    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Load the configuration, falling back to defaults when the file is
    /// missing or malformed.
    pub fn load() -> Self {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::from_file(&path) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("{:#}; using defaults", e);
                Self::default()
            }
        }
    }

    /// Bearer token from the configured environment variable.
    pub fn api_token(&self) -> Option<String> {
        std::env::var(&self.api_token_env).ok()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.data_dir.join("assets")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visualizae.yaml");
        std::fs::write(&path, "export_fps: 24\nuser_id: alice\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.export_fps, 24);
        assert_eq!(config.user_id, "alice");
        assert_eq!(config.poll_max_attempts, AppConfig::default().poll_max_attempts);
        assert_eq!(config.autosave_debounce(), Duration::from_millis(2000));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "export_fps: [not a number").unwrap();
        assert!(AppConfig::from_file(&path).is_err());
    }
}
