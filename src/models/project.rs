// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Project state management.
//!
//! This module defines the persisted form of a project: its layers, studio
//! scenes, orientation and the summary kept in the recent-projects index.

use super::layer::Layer;
use super::scene::{Orientation, Scene};
use serde::{Deserialize, Serialize};

/// Complete project data for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectData {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub orientation: Orientation,
    /// Seconds since the Unix epoch.
    pub updated_at: u64,
}

impl ProjectData {
    /// Create an empty project with the given identity and canvas size.
    pub fn new(id: String, owner_id: String, canvas_width: u32, canvas_height: u32) -> Self {
        Self {
            name: "Untitled".to_string(),
            id,
            owner_id,
            canvas_width,
            canvas_height,
            layers: Vec::new(),
            scenes: Vec::new(),
            orientation: Orientation::default(),
            updated_at: 0,
        }
    }
}

/// Entry of the recent-projects index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub updated_at: u64,
    /// Path of the PNG thumbnail, when one was saved.
    pub thumbnail: Option<String>,
    pub layer_count: usize,
    pub scene_count: usize,
}

/// Layer layout document used by JSON/YAML import and export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutDocument {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub layers: Vec<Layer>,
}
