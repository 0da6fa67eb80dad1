// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Local project store.
//!
//! Projects are JSON files under `<data dir>/projects/`, thumbnails sit
//! next to them and `index.json` lists the most recent ones.

use crate::error::{StudioError, StudioResult};
use crate::models::layer::Layer;
use crate::models::project::{ProjectData, ProjectSummary};
use crate::models::scene::{Orientation, Scene};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Number of projects kept; saving past it evicts the oldest.
pub const MAX_PROJECTS: usize = 20;

/// Everything a save writes.
#[derive(Debug, Clone, Copy)]
pub struct SaveRequest<'a> {
    pub owner_id: &'a str,
    pub layers: &'a [Layer],
    /// PNG bytes.
    pub thumbnail: Option<&'a [u8]>,
    pub canvas_size: (u32, u32),
    /// Existing project to overwrite; a new one is created when absent.
    pub project_id: Option<&'a str>,
    pub scenes: Option<&'a [Scene]>,
    pub orientation: Option<Orientation>,
}

/// Persistence for projects.
pub trait ProjectStore {
    /// Save and return the project id.
    fn save(&mut self, request: SaveRequest<'_>) -> StudioResult<String>;
    fn load(&self, id: &str) -> StudioResult<ProjectData>;
    /// Most recently updated first.
    fn list(&self) -> StudioResult<Vec<ProjectSummary>>;
    fn delete(&mut self, id: &str) -> StudioResult<()>;
    fn rename(&mut self, id: &str, name: &str) -> StudioResult<()>;
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn io_err(action: &str, path: &Path, e: impl std::fmt::Display) -> StudioError {
    StudioError::local(format!("failed to {action} {}: {e}", path.display()))
}

/// JSON files in a directory.
#[derive(Debug)]
pub struct LocalProjectStore {
    root: PathBuf,
}

impl LocalProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn projects_dir(&self) -> PathBuf {
        self.root.join("projects")
    }

    fn project_path(&self, id: &str) -> PathBuf {
        self.projects_dir().join(format!("{id}.json"))
    }

    fn thumbnail_path(&self, id: &str) -> PathBuf {
        self.projects_dir().join(format!("{id}.png"))
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    fn read_index(&self) -> StudioResult<Vec<ProjectSummary>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&path).map_err(|e| io_err("read", &path, e))?;
        match serde_json::from_str(&text) {
            Ok(index) => Ok(index),
            Err(e) => {
                log::warn!("Project index is unreadable, starting fresh: {}", e);
                Ok(Vec::new())
            }
        }
    }

    fn write_index(&self, index: &[ProjectSummary]) -> StudioResult<()> {
        let path = self.index_path();
        let json = serde_json::to_string_pretty(index).map_err(|e| io_err("encode", &path, e))?;
        std::fs::write(&path, json).map_err(|e| io_err("write", &path, e))
    }

    fn remove_files(&self, id: &str) {
        for path in [self.project_path(id), self.thumbnail_path(id)] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    log::warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }
    }

    fn write_project(&self, project: &ProjectData) -> StudioResult<()> {
        let path = self.project_path(&project.id);
        let json = serde_json::to_string_pretty(project).map_err(|e| io_err("encode", &path, e))?;
        std::fs::write(&path, json).map_err(|e| io_err("write", &path, e))
    }

    /// Put `summary` first, then evict past the limit.
    fn upsert_summary(&self, summary: ProjectSummary) -> StudioResult<()> {
        let mut index = self.read_index()?;
        index.retain(|s| s.id != summary.id);
        index.insert(0, summary);
        index.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        while index.len() > MAX_PROJECTS {
            if let Some(evicted) = index.pop() {
                log::info!("Evicting old project '{}'", evicted.name);
                self.remove_files(&evicted.id);
            }
        }
        self.write_index(&index)
    }
}

impl ProjectStore for LocalProjectStore {
    fn save(&mut self, request: SaveRequest<'_>) -> StudioResult<String> {
        let dir = self.projects_dir();
        std::fs::create_dir_all(&dir).map_err(|e| io_err("create", &dir, e))?;

        let existing = match request.project_id {
            Some(id) => self.load(id).ok(),
            None => None,
        };
        let id = request
            .project_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let (width, height) = request.canvas_size;
        let mut project = existing.unwrap_or_else(|| ProjectData::new(id.clone(), request.owner_id.to_string(), width, height));
        project.canvas_width = width;
        project.canvas_height = height;
        project.layers = request.layers.to_vec();
        if let Some(scenes) = request.scenes {
            project.scenes = scenes.to_vec();
        }
        if let Some(orientation) = request.orientation {
            project.orientation = orientation;
        }
        // Keep recency strictly increasing so rapid saves still order correctly.
        let index = self.read_index()?;
        let previous = index.first().map(|s| s.updated_at).unwrap_or(0);
        project.updated_at = now_secs().max(previous + 1);

        let thumbnail = match request.thumbnail {
            Some(png) => {
                let path = self.thumbnail_path(&id);
                std::fs::write(&path, png).map_err(|e| io_err("write", &path, e))?;
                Some(path.to_string_lossy().into_owned())
            }
            None => index.into_iter().find(|s| s.id == id).and_then(|s| s.thumbnail),
        };
        self.write_project(&project)?;
        self.upsert_summary(ProjectSummary {
            id: id.clone(),
            name: project.name.clone(),
            owner_id: project.owner_id.clone(),
            updated_at: project.updated_at,
            thumbnail,
            layer_count: project.layers.len(),
            scene_count: project.scenes.len(),
        })?;
        log::info!("Saved project {} ({} layers)", id, project.layers.len());
        Ok(id)
    }

    fn load(&self, id: &str) -> StudioResult<ProjectData> {
        let path = self.project_path(id);
        let text = std::fs::read_to_string(&path).map_err(|e| io_err("read", &path, e))?;
        serde_json::from_str(&text).map_err(|e| io_err("parse", &path, e))
    }

    fn list(&self) -> StudioResult<Vec<ProjectSummary>> {
        self.read_index()
    }

    fn delete(&mut self, id: &str) -> StudioResult<()> {
        let mut index = self.read_index()?;
        index.retain(|s| s.id != id);
        self.remove_files(id);
        self.write_index(&index)?;
        log::info!("Deleted project {}", id);
        Ok(())
    }

    fn rename(&mut self, id: &str, name: &str) -> StudioResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StudioError::validation("A project name cannot be empty."));
        }
        let mut project = self.load(id)?;
        project.name = name.to_string();
        self.write_project(&project)?;

        let mut index = self.read_index()?;
        if let Some(summary) = index.iter_mut().find(|s| s.id == id) {
            summary.name = project.name.clone();
        }
        self.write_index(&index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::layer::LayerKind;
    use crate::models::shapes::Rect;

    fn save_new(store: &mut LocalProjectStore, layers: &[Layer]) -> String {
        store
            .save(SaveRequest {
                owner_id: "user-1",
                layers,
                thumbnail: None,
                canvas_size: (1920, 1080),
                project_id: None,
                scenes: None,
                orientation: None,
            })
            .unwrap()
    }

    #[test]
    fn test_save_load_and_update() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = LocalProjectStore::new(dir.path());
        let layers = vec![Layer::new("a", LayerKind::Image, "/a.png", Rect::new(0.0, 0.0, 10.0, 10.0))];
        let id = save_new(&mut store, &layers);

        let loaded = store.load(&id).unwrap();
        assert_eq!(loaded.layers, layers);
        assert_eq!(loaded.owner_id, "user-1");

        let scenes = vec![Scene::new(), Scene::new()];
        let same = store
            .save(SaveRequest {
                owner_id: "user-1",
                layers: &[],
                thumbnail: Some(&[1, 2, 3]),
                canvas_size: (800, 600),
                project_id: Some(&id),
                scenes: Some(&scenes),
                orientation: Some(Orientation::Vertical),
            })
            .unwrap();
        assert_eq!(same, id);
        let loaded = store.load(&id).unwrap();
        assert!(loaded.layers.is_empty());
        assert_eq!(loaded.scenes.len(), 2);
        assert_eq!(loaded.orientation, Orientation::Vertical);
        let list = store.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].scene_count, 2);
        assert!(list[0].thumbnail.is_some());

        // Saving without a fresh thumbnail keeps the previous one.
        let thumbnail = list[0].thumbnail.clone();
        store
            .save(SaveRequest {
                owner_id: "user-1",
                layers: &layers,
                thumbnail: None,
                canvas_size: (800, 600),
                project_id: Some(&id),
                scenes: None,
                orientation: None,
            })
            .unwrap();
        let list = store.list().unwrap();
        assert_eq!(list[0].thumbnail, thumbnail);
        assert_eq!(list[0].layer_count, 1);
    }

    #[test]
    fn test_list_is_most_recent_first_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = LocalProjectStore::new(dir.path());
        let ids: Vec<String> = (0..MAX_PROJECTS + 2).map(|_| save_new(&mut store, &[])).collect();

        let list = store.list().unwrap();
        assert_eq!(list.len(), MAX_PROJECTS);
        assert_eq!(list[0].id, ids[ids.len() - 1]);
        assert!(store.load(&ids[0]).is_err());
        assert!(store.load(&ids[1]).is_err());
        assert!(store.load(&ids[2]).is_ok());
    }

    #[test]
    fn test_rename_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = LocalProjectStore::new(dir.path());
        let id = save_new(&mut store, &[]);

        store.rename(&id, "  Harbour  ").unwrap();
        assert_eq!(store.load(&id).unwrap().name, "Harbour");
        assert_eq!(store.list().unwrap()[0].name, "Harbour");
        assert!(store.rename(&id, " ").is_err());

        store.delete(&id).unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(store.load(&id).is_err());
    }
}
