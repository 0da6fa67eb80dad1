// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Studio timeline: ordered scenes, per-scene video generation and
//! last-frame chaining between neighbouring scenes.

use crate::api::{GenerationApi, MultiShotRequest, ShotRequest, VideoRequest};
use crate::error::{StudioError, StudioResult};
use crate::io::media;
use crate::models::scene::{
    FrameImage, Orientation, Scene, MAX_SHOTS, MULTI_SHOT_MAX_SECONDS, MULTI_SHOT_MIN_SECONDS,
};
use crate::render::assets::AssetCache;
use crate::util::geometry::AspectRatio;
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use uuid::Uuid;

/// Upper bound on variations generated per scene.
pub const MAX_SCENE_VARIATIONS: u32 = 4;

/// Pulls still frames out of a rendered clip.
pub trait FrameExtractor: Send + Sync {
    /// Encoded PNG of the final frame of `video`.
    fn last_frame(&self, video: &str) -> StudioResult<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SceneRequest {
    Single(VideoRequest),
    MultiShot(MultiShotRequest),
}

/// A validated scene generation ready to dispatch.
#[derive(Debug, Clone)]
pub struct SceneJob {
    pub scene_id: Uuid,
    pub request: SceneRequest,
    pub runs: u32,
}

/// Progress reported by scene workers.
#[derive(Debug)]
pub enum SceneEvent {
    VideoReady { scene_id: Uuid, url: String },
    LastFrame { scene_id: Uuid, png: Vec<u8> },
    Failed { scene_id: Uuid, error: StudioError },
    Finished { scene_id: Uuid },
}

/// What the UI should react to after applying a [`SceneEvent`].
#[derive(Debug)]
pub enum SceneUpdate {
    VideoAdded { scene_index: usize },
    Chained { next_index: usize },
    Failed(StudioError),
    Finished,
    Ignored,
}

/// Pick the request aspect ratio for a scene.
pub fn resolve_orientation(orientation: Orientation, start_frame: Option<&FrameImage>) -> AspectRatio {
    match orientation {
        Orientation::Horizontal => AspectRatio::Wide,
        Orientation::Vertical => AspectRatio::Tall,
        Orientation::Auto => match start_frame {
            Some(frame) if frame.height > frame.width => AspectRatio::Tall,
            _ => AspectRatio::Wide,
        },
    }
}

/// Check a scene can be sent to the service.
pub fn validate_scene(scene: &Scene) -> StudioResult<()> {
    if scene.start_frame.is_none() {
        return Err(StudioError::validation("Add a start frame before generating this scene."));
    }
    if scene.shots.iter().all(|s| s.prompt.trim().is_empty()) {
        return Err(StudioError::validation("Describe at least one shot before generating."));
    }
    if scene.is_multi_shot() {
        if scene.shots.len() > MAX_SHOTS {
            return Err(StudioError::validation(format!("A scene can have at most {MAX_SHOTS} shots.")));
        }
        if let Some(i) = scene.shots.iter().position(|s| s.prompt.trim().is_empty()) {
            return Err(StudioError::validation(format!("Shot {} needs a prompt.", i + 1)));
        }
        let total = scene.total_duration();
        if !(MULTI_SHOT_MIN_SECONDS..=MULTI_SHOT_MAX_SECONDS).contains(&total) {
            return Err(StudioError::validation(format!(
                "Multi-shot scenes must last between {MULTI_SHOT_MIN_SECONDS} and {MULTI_SHOT_MAX_SECONDS} seconds \
                 (currently {total}s)."
            )));
        }
    }
    Ok(())
}

fn frame_base64(frame: &FrameImage) -> StudioResult<String> {
    let bytes = media::load_source_bytes(&frame.src)?;
    Ok(media::to_base64(&bytes))
}

/// The ordered scenes of a project and the settings shared by them.
#[derive(Debug, Clone)]
pub struct Timeline {
    pub scenes: Vec<Scene>,
    pub orientation: Orientation,
    pub model: String,
    pub with_audio: bool,
}

impl Default for Timeline {
    fn default() -> Self {
        Self {
            scenes: vec![Scene::new()],
            orientation: Orientation::Auto,
            model: "veo-3.1-fast-generate-preview".to_string(),
            with_audio: true,
        }
    }
}

impl Timeline {
    pub fn index_of(&self, id: Uuid) -> Option<usize> {
        self.scenes.iter().position(|s| s.id == id)
    }

    pub fn scene_mut(&mut self, id: Uuid) -> Option<&mut Scene> {
        self.scenes.iter_mut().find(|s| s.id == id)
    }

    pub fn add_scene(&mut self) -> Uuid {
        let scene = Scene::new();
        let id = scene.id;
        self.scenes.push(scene);
        id
    }

    /// Remove a scene; the timeline always keeps one.
    pub fn remove_scene(&mut self, id: Uuid) -> bool {
        match self.index_of(id) {
            Some(idx) if self.scenes.len() > 1 && !self.scenes[idx].is_generating => {
                self.scenes.remove(idx);
                true
            }
            _ => false,
        }
    }

    /// Copy a scene (frames, shots and videos) right after the original.
    pub fn duplicate_scene(&mut self, id: Uuid) -> Option<Uuid> {
        let idx = self.index_of(id)?;
        let mut copy = self.scenes[idx].clone();
        copy.id = Uuid::new_v4();
        copy.is_generating = false;
        let new_id = copy.id;
        self.scenes.insert(idx + 1, copy);
        Some(new_id)
    }

    pub fn move_scene(&mut self, id: Uuid, new_index: usize) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let target = new_index.min(self.scenes.len() - 1);
        if target == idx {
            return false;
        }
        let scene = self.scenes.remove(idx);
        self.scenes.insert(target, scene);
        true
    }

    pub fn select_video(&mut self, id: Uuid, index: usize) -> bool {
        match self.scene_mut(id) {
            Some(scene) if index < scene.videos.len() => {
                scene.selected_video_index = Some(index);
                true
            }
            _ => false,
        }
    }

    /// Validate a scene and build its request. Nothing is sent yet.
    pub fn prepare_scene(&mut self, id: Uuid) -> StudioResult<SceneJob> {
        let orientation = self.orientation;
        let (model, with_audio) = (self.model.clone(), self.with_audio);
        let scene = self
            .scene_mut(id)
            .ok_or_else(|| StudioError::validation("That scene no longer exists."))?;
        if scene.is_generating {
            return Err(StudioError::validation("This scene is already generating."));
        }
        validate_scene(scene)?;

        let Some(start) = scene.start_frame.as_ref() else {
            return Err(StudioError::validation("Add a start frame before generating this scene."));
        };
        let aspect_ratio = resolve_orientation(orientation, Some(start));
        let start_image = frame_base64(start)?;
        let end_image = scene.end_frame.as_ref().map(frame_base64).transpose()?;

        let request = if scene.is_multi_shot() {
            let shots: Vec<ShotRequest> = scene
                .shots
                .iter()
                .map(|s| ShotRequest {
                    prompt: s.prompt.trim().to_string(),
                    duration_seconds: s.duration,
                })
                .collect();
            SceneRequest::MultiShot(MultiShotRequest {
                model,
                shots,
                start_image,
                end_image,
                aspect_ratio,
                total_duration: scene.total_duration(),
                with_audio,
            })
        } else {
            let shot = &scene.shots[0];
            SceneRequest::Single(VideoRequest {
                model,
                prompt: shot.prompt.trim().to_string(),
                start_image,
                end_image,
                aspect_ratio,
                duration_seconds: shot.duration,
                with_audio,
            })
        };

        scene.is_generating = true;
        Ok(SceneJob {
            scene_id: id,
            request,
            runs: scene.variation_count.clamp(1, MAX_SCENE_VARIATIONS),
        })
    }

    /// Run a scene job: variations in sequence, each success followed by a
    /// last-frame extraction. Stops at the first failure.
    pub fn run_scene_job(
        api: &dyn GenerationApi,
        extractor: &dyn FrameExtractor,
        job: &SceneJob,
        mut emit: impl FnMut(SceneEvent),
    ) {
        let scene_id = job.scene_id;
        for run in 0..job.runs {
            let result = match &job.request {
                SceneRequest::Single(req) => api.generate_video(req),
                SceneRequest::MultiShot(req) => api.generate_multi_shot_video(req),
            };
            let url = match result {
                Ok(video) => video.url,
                Err(error) => {
                    log::error!("Scene {} variation {}/{} failed: {}", scene_id, run + 1, job.runs, error);
                    emit(SceneEvent::Failed { scene_id, error });
                    break;
                }
            };
            emit(SceneEvent::VideoReady {
                scene_id,
                url: url.clone(),
            });
            match extractor.last_frame(&url) {
                Ok(png) => emit(SceneEvent::LastFrame { scene_id, png }),
                Err(e) => log::warn!("Could not extract last frame of {}: {}", url, e),
            }
        }
        emit(SceneEvent::Finished { scene_id });
    }

    pub fn spawn_scene_job(
        api: Arc<dyn GenerationApi>,
        extractor: Arc<dyn FrameExtractor>,
        job: SceneJob,
    ) -> Receiver<SceneEvent> {
        let (sender, receiver) = channel();
        std::thread::spawn(move || {
            Self::run_scene_job(api.as_ref(), extractor.as_ref(), &job, |event| {
                let _ = sender.send(event);
            });
        });
        receiver
    }

    /// Extract the last frame of a scene's chosen video in the background
    /// so it can seed the following scene.
    pub fn spawn_last_frame(&self, id: Uuid, extractor: Arc<dyn FrameExtractor>) -> StudioResult<Receiver<SceneEvent>> {
        let url = self
            .scenes
            .iter()
            .find(|s| s.id == id)
            .and_then(|s| s.selected_video())
            .ok_or_else(|| StudioError::validation("Pick a video for this scene first."))?
            .to_string();
        let (sender, receiver) = channel();
        std::thread::spawn(move || {
            let event = match extractor.last_frame(&url) {
                Ok(png) => SceneEvent::LastFrame { scene_id: id, png },
                Err(error) => SceneEvent::Failed { scene_id: id, error },
            };
            let _ = sender.send(event);
        });
        Ok(receiver)
    }

    /// Apply one worker event on the UI thread.
    pub fn apply_event(&mut self, event: SceneEvent, assets: &mut AssetCache) -> SceneUpdate {
        match event {
            SceneEvent::VideoReady { scene_id, url } => match self.index_of(scene_id) {
                Some(scene_index) => {
                    self.scenes[scene_index].push_video(url);
                    SceneUpdate::VideoAdded { scene_index }
                }
                None => SceneUpdate::Ignored,
            },
            SceneEvent::LastFrame { scene_id, png } => {
                let Some(index) = self.index_of(scene_id) else {
                    return SceneUpdate::Ignored;
                };
                match self.chain_frame(index, &png, assets) {
                    Ok(next_index) => SceneUpdate::Chained { next_index },
                    Err(e) => SceneUpdate::Failed(e),
                }
            }
            SceneEvent::Failed { scene_id, error } => {
                if let Some(scene) = self.scene_mut(scene_id) {
                    scene.is_generating = false;
                }
                SceneUpdate::Failed(error)
            }
            SceneEvent::Finished { scene_id } => {
                if let Some(scene) = self.scene_mut(scene_id) {
                    scene.is_generating = false;
                }
                SceneUpdate::Finished
            }
        }
    }

    /// Store `png` as the start frame of the scene after `index`, creating
    /// that scene when `index` is the last one.
    pub fn chain_frame(&mut self, index: usize, png: &[u8], assets: &mut AssetCache) -> StudioResult<usize> {
        let (width, height) = media::image_size(png)
            .map_err(|e| StudioError::local(format!("extracted frame is not an image: {e}")))?;
        let src = assets.store_png(png)?;
        let next = index + 1;
        if next >= self.scenes.len() {
            self.scenes.push(Scene::new());
            log::info!("Created scene {} for chaining", next + 1);
        }
        self.scenes[next].start_frame = Some(FrameImage { src, width, height });
        Ok(next)
    }
}
