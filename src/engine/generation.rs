// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Generation orchestrator.
//!
//! Turns the current selection, the layers under it and the reference
//! images into a remote request, runs the request off the UI thread and
//! writes the results back as new layers. Only one generation runs at a
//! time.

use super::interaction::CanvasEngine;
use super::layers::LayerStore;
use crate::api::{GenerationApi, ImageRequest, VideoRequest};
use crate::error::{StudioError, StudioResult};
use crate::io::media;
use crate::models::layer::{Layer, LayerKind, RenderMode};
use crate::models::shapes::Rect;
use crate::render::assets::AssetCache;
use crate::render::snapshot::snapshot_selection;
use crate::util::geometry::{self, AspectRatio};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use uuid::Uuid;

pub const MAX_REFERENCE_IMAGES: usize = 10;
pub const MAX_VARIATIONS: u32 = 4;

/// Appended to the prompt when the canvas snapshot is sent along.
pub const BLEND_INSTRUCTION: &str = "Use the first image as the base composition. Blend every element into one \
coherent, photorealistic scene with consistent lighting, perspective and color.";

pub const UPSCALE_PROMPT: &str = "Upscale this image to 4K. Restore fine detail and sharpen edges without \
changing the composition, colors or content.";
pub const UPSCALE_PIXEL_BUDGET: f64 = 8_000_000.0;
pub const UPSCALE_MAX_SIDE: u32 = 4096;
pub const UPSCALE_SIZE_LABEL: &str = "4K";

/// What the request produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    #[default]
    Image,
    Video,
}

/// User-facing generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub model: String,
    pub kind: OutputKind,
    pub variation_count: u32,
    pub image_size: Option<String>,
    pub with_audio: bool,
    pub duration_seconds: f64,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-image".to_string(),
            kind: OutputKind::Image,
            variation_count: 1,
            image_size: None,
            with_audio: false,
            duration_seconds: 5.0,
        }
    }
}

/// Auxiliary input images, independent of the layers.
#[derive(Debug, Clone, Default)]
pub struct ReferenceImages {
    images: Vec<Vec<u8>>,
}

impl ReferenceImages {
    /// Add an encoded image; refused once the set is full.
    pub fn add(&mut self, bytes: Vec<u8>) -> bool {
        if self.images.len() >= MAX_REFERENCE_IMAGES {
            return false;
        }
        self.images.push(bytes);
        true
    }

    pub fn remove(&mut self, index: usize) -> Option<Vec<u8>> {
        (index < self.images.len()).then(|| self.images.remove(index))
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.images.iter().map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobRequest {
    Image(ImageRequest),
    Video(VideoRequest),
}

/// A prepared request plus how many times to run it.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub request: JobRequest,
    pub runs: u32,
}

/// Progress reported by a running job.
#[derive(Debug)]
pub enum GenerationEvent {
    ImageReady(Vec<u8>),
    VideoReady(String),
    Failed(StudioError),
    Finished,
}

/// Result of applying one event on the UI thread.
#[derive(Debug)]
pub enum GenerationUpdate {
    LayerAdded(Uuid),
    Failed(StudioError),
    /// The job is over; the caller schedules an autosave.
    Finished,
}

/// Where results land.
#[derive(Debug, Clone)]
struct Placement {
    target: Rect,
    render_mode: RenderMode,
    name: String,
}

#[derive(Debug, Default)]
pub struct GenerationOrchestrator {
    pending: Option<Placement>,
    produced: u32,
}

impl GenerationOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Build a generation job for the current selection and mark the
    /// orchestrator busy.
    ///
    /// Returns `Ok(None)` when a job is already running or there is no
    /// selection. A job that cannot be built clears the selection.
    pub fn prepare(
        &mut self,
        prompt: &str,
        options: &GenerationOptions,
        references: &ReferenceImages,
        engine: &mut CanvasEngine,
        layers: &LayerStore,
        assets: &mut AssetCache,
    ) -> StudioResult<Option<GenerationJob>> {
        if self.is_busy() {
            return Ok(None);
        }
        let Some(selection) = engine.selection() else {
            return Ok(None);
        };
        let (request, runs, name, render_mode) =
            build_generation(prompt, options, references, selection, layers, assets)
                .map_err(|e| abandon(engine, e))?;

        self.begin(engine, selection, render_mode, name);
        Ok(Some(GenerationJob { request, runs }))
    }

    /// Build an upscale job for the current selection.
    pub fn prepare_upscale(
        &mut self,
        model: &str,
        engine: &mut CanvasEngine,
        layers: &LayerStore,
        assets: &mut AssetCache,
    ) -> StudioResult<Option<GenerationJob>> {
        if self.is_busy() {
            return Ok(None);
        }
        let Some(selection) = engine.selection() else {
            return Ok(None);
        };
        let (request, target) = build_upscale(model, selection, layers, assets).map_err(|e| abandon(engine, e))?;

        self.begin(engine, target, RenderMode::Fill, "Upscale");
        Ok(Some(GenerationJob { request, runs: 1 }))
    }

    fn begin(&mut self, engine: &mut CanvasEngine, target: Rect, render_mode: RenderMode, name: &str) {
        self.pending = Some(Placement {
            target,
            render_mode,
            name: name.to_string(),
        });
        self.produced = 0;
        engine.set_busy(true);
    }

    /// Run a job to completion, reporting every result. Stops at the first
    /// failure and always ends with [`GenerationEvent::Finished`].
    pub fn run_job(api: &dyn GenerationApi, job: &GenerationJob, mut emit: impl FnMut(GenerationEvent)) {
        for run in 0..job.runs {
            let result = match &job.request {
                JobRequest::Image(req) => api.generate_image(req).map(|img| GenerationEvent::ImageReady(img.bytes)),
                JobRequest::Video(req) => api.generate_video(req).map(|v| GenerationEvent::VideoReady(v.url)),
            };
            match result {
                Ok(event) => emit(event),
                Err(e) => {
                    log::error!("Generation {}/{} failed: {}", run + 1, job.runs, e);
                    emit(GenerationEvent::Failed(e));
                    break;
                }
            }
        }
        emit(GenerationEvent::Finished);
    }

    /// Run a job on a worker thread.
    pub fn spawn(api: Arc<dyn GenerationApi>, job: GenerationJob) -> Receiver<GenerationEvent> {
        let (sender, receiver) = channel();
        std::thread::spawn(move || {
            Self::run_job(api.as_ref(), &job, |event| {
                let _ = sender.send(event);
            });
        });
        receiver
    }

    /// Apply one event from the worker on the UI thread.
    pub fn apply(
        &mut self,
        event: GenerationEvent,
        engine: &mut CanvasEngine,
        layers: &mut LayerStore,
        assets: &mut AssetCache,
    ) -> GenerationUpdate {
        match event {
            GenerationEvent::ImageReady(bytes) => match assets.store_png(&bytes) {
                Ok(src) => self.add_layer(LayerKind::Generation, src, engine, layers),
                Err(e) => {
                    log::error!("Failed to store generated image: {}", e);
                    GenerationUpdate::Failed(e)
                }
            },
            GenerationEvent::VideoReady(url) => self.add_layer(LayerKind::Video, url, engine, layers),
            GenerationEvent::Failed(e) => GenerationUpdate::Failed(e),
            GenerationEvent::Finished => {
                self.pending = None;
                engine.set_busy(false);
                engine.clear_selection();
                log::info!("Generation finished with {} result(s)", self.produced);
                GenerationUpdate::Finished
            }
        }
    }

    fn add_layer(
        &mut self,
        kind: LayerKind,
        src: String,
        engine: &mut CanvasEngine,
        layers: &mut LayerStore,
    ) -> GenerationUpdate {
        let Some(placement) = &self.pending else {
            return GenerationUpdate::Failed(StudioError::local("result arrived without a pending generation"));
        };
        self.produced += 1;
        let name = format!("{} {}", placement.name, self.produced);
        let mut layer = Layer::new(name, kind, src, placement.target);
        layer.render_mode = placement.render_mode;
        if kind == LayerKind::Video {
            layer.is_playing = Some(true);
        }
        let id = layer.id;
        layers.push_top(layer);
        engine.select_layer(Some(id));
        GenerationUpdate::LayerAdded(id)
    }
}

/// Video models only produce landscape or portrait clips.
fn video_aspect(ratio: f64) -> AspectRatio {
    if ratio < 1.0 {
        AspectRatio::Tall
    } else {
        AspectRatio::Wide
    }
}

fn abandon(engine: &mut CanvasEngine, err: StudioError) -> StudioError {
    log::warn!("Generation not started: {}", err);
    engine.clear_selection();
    err
}

fn build_generation(
    prompt: &str,
    options: &GenerationOptions,
    references: &ReferenceImages,
    selection: Rect,
    layers: &LayerStore,
    assets: &mut AssetCache,
) -> StudioResult<(JobRequest, u32, &'static str, RenderMode)> {
    let snapshot = match snapshot_selection(layers.layers(), selection, assets)? {
        Some(surface) => Some(surface.encode_png()?),
        None => None,
    };
    let render_mode = match (&snapshot, references.is_empty()) {
        (None, false) => RenderMode::Cover,
        _ => RenderMode::Fill,
    };
    let mut images: Vec<String> = snapshot.iter().map(|b| media::to_base64(b)).collect();
    images.extend(references.iter().map(media::to_base64));

    let prompt = prompt.trim();
    let full_prompt = if snapshot.is_some() {
        format!("{prompt}\n\n{BLEND_INSTRUCTION}")
    } else {
        prompt.to_string()
    };
    let ratio = selection.w / selection.h;

    match options.kind {
        OutputKind::Image => {
            let request = ImageRequest {
                model: options.model.clone(),
                prompt: full_prompt,
                aspect_ratio: AspectRatio::nearest(ratio),
                image_size: options.image_size.clone(),
                images,
                force_aspect_ratio: snapshot.is_none(),
            };
            let runs = options.variation_count.clamp(1, MAX_VARIATIONS);
            Ok((JobRequest::Image(request), runs, "Generation", render_mode))
        }
        OutputKind::Video => {
            let mut images = images.into_iter();
            let Some(start_image) = images.next() else {
                return Err(StudioError::validation(
                    "Video generation needs layers under the selection or a reference image.",
                ));
            };
            let request = VideoRequest {
                model: options.model.clone(),
                prompt: full_prompt,
                start_image,
                end_image: None,
                aspect_ratio: video_aspect(ratio),
                duration_seconds: options.duration_seconds,
                with_audio: options.with_audio,
            };
            Ok((JobRequest::Video(request), 1, "Video", render_mode))
        }
    }
}

fn build_upscale(
    model: &str,
    selection: Rect,
    layers: &LayerStore,
    assets: &mut AssetCache,
) -> StudioResult<(JobRequest, Rect)> {
    let Some(snapshot) = snapshot_selection(layers.layers(), selection, assets)? else {
        return Err(StudioError::validation("There is nothing under the selection to upscale."));
    };
    let (width, height) =
        geometry::fit_pixel_budget(snapshot.width(), snapshot.height(), UPSCALE_PIXEL_BUDGET, UPSCALE_MAX_SIDE);
    let resampled = snapshot.resampled(width, height)?;
    let request = ImageRequest {
        model: model.to_string(),
        prompt: UPSCALE_PROMPT.to_string(),
        aspect_ratio: AspectRatio::nearest(width as f64 / height as f64),
        image_size: Some(UPSCALE_SIZE_LABEL.to_string()),
        images: vec![media::to_base64(&resampled.encode_png()?)],
        force_aspect_ratio: false,
    };
    log::info!("Upscaling {}x{} selection to {}x{}", snapshot.width(), snapshot.height(), width, height);

    let target = Rect::new(selection.x, selection.y, width as f64, height as f64);
    Ok((JobRequest::Image(request), target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{png_bytes, Call, FakeApi};
    use crate::api::{GeneratedImage, GeneratedVideo};
    use crate::render::surface::{Rgba, Surface};

    struct Fixture {
        _dir: tempfile::TempDir,
        assets: AssetCache,
        engine: CanvasEngine,
        layers: LayerStore,
        orchestrator: GenerationOrchestrator,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let assets = AssetCache::new(dir.path());
        Fixture {
            _dir: dir,
            assets,
            engine: CanvasEngine::default(),
            layers: LayerStore::new(),
            orchestrator: GenerationOrchestrator::new(),
        }
    }

    fn add_image_layer(f: &mut Fixture, bounds: Rect) {
        let mut surface = Surface::new(16, 16).unwrap();
        surface.clear(Rgba::WHITE);
        f.assets.insert("mem://base", surface);
        f.layers.push_top(Layer::new("base", LayerKind::Image, "mem://base", bounds));
    }

    fn drive(f: &mut Fixture, api: &FakeApi, job: &GenerationJob) -> Vec<GenerationUpdate> {
        let mut events = Vec::new();
        GenerationOrchestrator::run_job(api, job, |e| events.push(e));
        events
            .into_iter()
            .map(|e| f.orchestrator.apply(e, &mut f.engine, &mut f.layers, &mut f.assets))
            .collect()
    }

    #[test]
    fn test_no_selection_is_silent() {
        let mut f = fixture();
        let job = f
            .orchestrator
            .prepare("cat", &GenerationOptions::default(), &ReferenceImages::default(), &mut f.engine, &f.layers, &mut f.assets)
            .unwrap();
        assert!(job.is_none());
        assert!(!f.orchestrator.is_busy());
    }

    #[test]
    fn test_text_only_request() {
        let mut f = fixture();
        f.engine.set_selection(Some(Rect::new(0.0, 0.0, 160.0, 90.0)));
        let job = f
            .orchestrator
            .prepare("a lighthouse", &GenerationOptions::default(), &ReferenceImages::default(), &mut f.engine, &f.layers, &mut f.assets)
            .unwrap()
            .unwrap();
        let JobRequest::Image(req) = &job.request else {
            panic!("expected an image request");
        };
        assert_eq!(req.aspect_ratio, AspectRatio::Wide);
        assert!(req.images.is_empty());
        assert!(req.force_aspect_ratio);
        assert_eq!(req.prompt, "a lighthouse");
        assert!(f.orchestrator.is_busy());
        assert!(f.engine.is_busy());
    }

    #[test]
    fn test_snapshot_becomes_primary_input() {
        let mut f = fixture();
        add_image_layer(&mut f, Rect::new(0.0, 0.0, 100.0, 100.0));
        f.engine.set_selection(Some(Rect::new(10.0, 10.0, 50.0, 50.0)));
        let mut refs = ReferenceImages::default();
        refs.add(png_bytes(2, 2));

        let job = f
            .orchestrator
            .prepare("make it night", &GenerationOptions::default(), &refs, &mut f.engine, &f.layers, &mut f.assets)
            .unwrap()
            .unwrap();
        let JobRequest::Image(req) = &job.request else {
            panic!("expected an image request");
        };
        assert_eq!(req.images.len(), 2);
        assert!(!req.force_aspect_ratio);
        assert!(req.prompt.contains(BLEND_INSTRUCTION));
        assert_eq!(req.aspect_ratio, AspectRatio::Square);
    }

    #[test]
    fn test_variations_prepend_layers_and_finish() {
        let mut f = fixture();
        let selection = Rect::new(5.0, 5.0, 120.0, 90.0);
        f.engine.set_selection(Some(selection));
        let options = GenerationOptions {
            variation_count: 2,
            ..GenerationOptions::default()
        };
        let job = f
            .orchestrator
            .prepare("x", &options, &ReferenceImages::default(), &mut f.engine, &f.layers, &mut f.assets)
            .unwrap()
            .unwrap();
        let api = FakeApi::with_images(vec![
            Ok(GeneratedImage { bytes: png_bytes(4, 3) }),
            Ok(GeneratedImage { bytes: png_bytes(4, 3) }),
        ]);

        let updates = drive(&mut f, &api, &job);
        assert_eq!(updates.len(), 3);
        assert_eq!(f.layers.len(), 2);
        let top = &f.layers.layers()[0];
        assert_eq!(top.bounds(), selection);
        assert_eq!(top.kind, LayerKind::Generation);
        assert_eq!(top.render_mode, RenderMode::Fill);
        assert_eq!(f.engine.selected_layer(), Some(top.id));
        assert!(!f.orchestrator.is_busy());
        assert!(!f.engine.is_busy());
        assert!(f.engine.selection().is_none());
    }

    #[test]
    fn test_credit_exhaustion_stops_loop() {
        let mut f = fixture();
        f.engine.set_selection(Some(Rect::new(0.0, 0.0, 100.0, 100.0)));
        let options = GenerationOptions {
            variation_count: 3,
            ..GenerationOptions::default()
        };
        let job = f
            .orchestrator
            .prepare("x", &options, &ReferenceImages::default(), &mut f.engine, &f.layers, &mut f.assets)
            .unwrap()
            .unwrap();
        let api = FakeApi::with_images(vec![Err(StudioError::InsufficientCredits)]);

        let updates = drive(&mut f, &api, &job);
        assert_eq!(api.calls().len(), 1);
        assert!(matches!(updates[0], GenerationUpdate::Failed(StudioError::InsufficientCredits)));
        assert!(matches!(updates[1], GenerationUpdate::Finished));
        assert!(f.layers.is_empty());
        assert!(!f.engine.is_busy());
        assert!(f.engine.selection().is_none());
    }

    #[test]
    fn test_second_prepare_while_busy_is_ignored() {
        let mut f = fixture();
        f.engine.set_selection(Some(Rect::new(0.0, 0.0, 100.0, 100.0)));
        let refs = ReferenceImages::default();
        let opts = GenerationOptions::default();
        assert!(f.orchestrator.prepare("a", &opts, &refs, &mut f.engine, &f.layers, &mut f.assets).unwrap().is_some());
        assert!(f.orchestrator.prepare("b", &opts, &refs, &mut f.engine, &f.layers, &mut f.assets).unwrap().is_none());
    }

    #[test]
    fn test_video_runs_once_and_plays() {
        let mut f = fixture();
        add_image_layer(&mut f, Rect::new(0.0, 0.0, 100.0, 200.0));
        f.engine.set_selection(Some(Rect::new(0.0, 0.0, 90.0, 160.0)));
        let options = GenerationOptions {
            kind: OutputKind::Video,
            variation_count: 3,
            ..GenerationOptions::default()
        };
        let job = f
            .orchestrator
            .prepare("waves", &options, &ReferenceImages::default(), &mut f.engine, &f.layers, &mut f.assets)
            .unwrap()
            .unwrap();
        assert_eq!(job.runs, 1);
        let api = FakeApi::with_videos(vec![Ok(GeneratedVideo {
            url: "https://cdn/v.mp4".into(),
        })]);

        drive(&mut f, &api, &job);
        let Call::Video(req) = &api.calls()[0] else {
            panic!("expected a video call");
        };
        assert_eq!(req.aspect_ratio, AspectRatio::Tall);
        let top = &f.layers.layers()[0];
        assert_eq!(top.kind, LayerKind::Video);
        assert_eq!(top.is_playing, Some(true));
    }

    #[test]
    fn test_video_without_input_is_rejected() {
        let mut f = fixture();
        f.engine.set_selection(Some(Rect::new(0.0, 0.0, 90.0, 160.0)));
        let options = GenerationOptions {
            kind: OutputKind::Video,
            ..GenerationOptions::default()
        };
        let err = f
            .orchestrator
            .prepare("waves", &options, &ReferenceImages::default(), &mut f.engine, &f.layers, &mut f.assets)
            .unwrap_err();
        assert!(matches!(err, StudioError::Validation(_)));
        assert!(!f.orchestrator.is_busy());
        assert!(f.engine.selection().is_none());
    }

    #[test]
    fn test_empty_upscale_clears_selection() {
        let mut f = fixture();
        f.engine.set_selection(Some(Rect::new(0.0, 0.0, 160.0, 90.0)));
        let err = f
            .orchestrator
            .prepare_upscale("m", &mut f.engine, &f.layers, &mut f.assets)
            .unwrap_err();
        assert!(matches!(err, StudioError::Validation(_)));
        assert!(!f.orchestrator.is_busy());
        assert!(f.engine.selection().is_none());
    }

    #[test]
    fn test_upscale_targets_pixel_budget() {
        let mut f = fixture();
        add_image_layer(&mut f, Rect::new(0.0, 0.0, 400.0, 400.0));
        f.engine.set_selection(Some(Rect::new(20.0, 30.0, 160.0, 90.0)));
        let job = f
            .orchestrator
            .prepare_upscale("m", &mut f.engine, &f.layers, &mut f.assets)
            .unwrap()
            .unwrap();
        let JobRequest::Image(req) = &job.request else {
            panic!("expected an image request");
        };
        assert_eq!(req.prompt, UPSCALE_PROMPT);
        assert_eq!(req.image_size.as_deref(), Some("4K"));

        let api = FakeApi::with_images(vec![Ok(GeneratedImage { bytes: png_bytes(8, 8) })]);
        drive(&mut f, &api, &job);
        let top = &f.layers.layers()[0];
        assert_eq!((top.x, top.y), (20.0, 30.0));
        assert_eq!((top.w, top.h), (3771.0, 2121.0));
    }

    #[test]
    fn test_reference_set_is_bounded() {
        let mut refs = ReferenceImages::default();
        for _ in 0..MAX_REFERENCE_IMAGES {
            assert!(refs.add(vec![1]));
        }
        assert!(!refs.add(vec![2]));
        assert_eq!(refs.remove(0), Some(vec![1]));
        assert!(refs.remove(42).is_none());
        assert_eq!(refs.len(), MAX_REFERENCE_IMAGES - 1);
    }
}
