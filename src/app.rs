// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Main application state and egui App implementation.
//!
//! The application owns every piece of editor state on the UI thread.
//! Remote generation, media loading, frame extraction and movie export run
//! on worker threads and report back through channels drained once per
//! frame, so all mutation stays single-writer.

use crate::api::http::HttpGenerationApi;
use crate::api::{GenerationApi, RetryPolicy};
use crate::config::AppConfig;
use crate::engine::generation::{
    GenerationEvent, GenerationJob, GenerationOptions, GenerationOrchestrator, GenerationUpdate, ReferenceImages,
};
use crate::engine::interaction::{CanvasAction, CanvasEngine, Tool};
use crate::engine::layers::LayerStore;
use crate::engine::polygon::{self, PolygonTool};
use crate::error::{StudioError, StudioResult};
use crate::io::ffmpeg::{FfmpegClipDecoder, FfmpegFrameExtractor, FfmpegRecorder, FfmpegTools};
use crate::io::store::{LocalProjectStore, ProjectStore, SaveRequest};
use crate::io::{media, serialization};
use crate::models::layer::{Layer, LayerKind};
use crate::models::project::{LayoutDocument, ProjectSummary};
use crate::models::scene::FrameImage;
use crate::models::shapes::{Point, Rect};
use crate::render::assets::AssetCache;
use crate::render::snapshot::snapshot_selection;
use crate::render::surface::Surface;
use crate::render::text::TextRenderer;
use crate::studio::export::{self, ExportEvent, ExportState};
use crate::studio::timeline::{FrameExtractor, SceneEvent, SceneUpdate, Timeline};
use crate::ui::canvas::{CanvasInput, CanvasView};
use crate::ui::generate::GenerateAction;
use crate::ui::history::{HistoryAction, HistoryState};
use crate::ui::properties::{LayerCommand, PropertiesAction, PropertiesState};
use crate::ui::studio::{ExportStatus, FrameSlot, StudioAction};
use crate::ui::textures::TextureCache;
use crate::ui::toolbar::{ToolbarAction, ToolbarState};
use crate::ui::{canvas, generate, history, properties, studio, toolbar};
use crate::util::debounce::Debounce;
use crate::util::geometry;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Longest side of a freshly uploaded layer, in world units.
const MAX_UPLOAD_SIDE: f64 = 1024.0;
/// Offset between layers added in one batch.
const UPLOAD_CASCADE: f64 = 24.0;
const THUMBNAIL_MAX_SIDE: u32 = 320;
const NOTICE_LIFETIME: Duration = Duration::from_secs(6);

/// Top-level workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Canvas,
    Studio,
}

/// Something to load as a new layer.
enum UploadInput {
    Src(String),
    Bytes { name: String, bytes: Vec<u8> },
}

/// Where an uploaded layer's pixels live.
enum UploadSource {
    /// Path or URL used as the layer source directly.
    Src(String),
    /// Decoded content re-encoded as PNG, still to be stored as an asset.
    Png(Vec<u8>),
}

/// Result of background media loading.
struct LoadedUpload {
    name: String,
    kind: LayerKind,
    source: UploadSource,
    width: u32,
    height: u32,
}

struct Notice {
    text: String,
    error: bool,
    at: Instant,
}

/// A background studio job and the scene it belongs to.
struct SceneWorker {
    scene_id: Uuid,
    rx: Receiver<SceneEvent>,
    /// Generation jobs hold the scene's busy flag until `Finished` arrives.
    holds_scene: bool,
}

impl SceneWorker {
    /// Move pending events into `events`. Returns false once the worker is
    /// gone. A generation worker that vanishes without reporting `Finished`
    /// gets a failure and `Finished` synthesized so its scene is released.
    fn drain(&mut self, events: &mut Vec<SceneEvent>) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    if matches!(event, SceneEvent::Finished { .. }) {
                        self.holds_scene = false;
                    }
                    events.push(event);
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => {
                    if self.holds_scene {
                        log::error!("Scene worker for {} stopped without finishing", self.scene_id);
                        events.push(SceneEvent::Failed {
                            scene_id: self.scene_id,
                            error: StudioError::service("scene worker stopped unexpectedly"),
                        });
                        events.push(SceneEvent::Finished { scene_id: self.scene_id });
                        self.holds_scene = false;
                    }
                    return false;
                }
            }
        }
    }
}

fn display_name(src: &str) -> String {
    if src.starts_with("data:") {
        return "Pasted image".to_string();
    }
    let tail = src.rsplit(['/', '\\']).next().unwrap_or(src);
    let tail = tail.split(['?', '#']).next().unwrap_or(tail);
    match tail.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ if !tail.is_empty() => tail.to_string(),
        _ => "Layer".to_string(),
    }
}

fn reencode_png(bytes: &[u8]) -> anyhow::Result<(Vec<u8>, u32, u32)> {
    let img = media::decode_image(bytes)?;
    let png = Surface::from_rgba(img.width, img.height, &img.pixels)?.encode_png()?;
    Ok((png, img.width, img.height))
}

/// Read an upload on a worker thread.
fn load_upload(input: UploadInput, tools: &FfmpegTools) -> anyhow::Result<LoadedUpload> {
    match input {
        UploadInput::Src(src) if media::looks_like_video(&src) => {
            let info = tools.probe(&src)?;
            Ok(LoadedUpload {
                name: display_name(&src),
                kind: LayerKind::Video,
                width: info.width,
                height: info.height,
                source: UploadSource::Src(src),
            })
        }
        UploadInput::Src(src) if src.starts_with("data:") => {
            let (png, width, height) = reencode_png(&media::load_source_bytes(&src)?)?;
            Ok(LoadedUpload {
                name: display_name(&src),
                kind: LayerKind::Image,
                source: UploadSource::Png(png),
                width,
                height,
            })
        }
        UploadInput::Src(src) => {
            let (width, height) = media::image_size(&media::load_source_bytes(&src)?)?;
            Ok(LoadedUpload {
                name: display_name(&src),
                kind: LayerKind::Image,
                source: UploadSource::Src(src),
                width,
                height,
            })
        }
        UploadInput::Bytes { name, bytes } => {
            let (png, width, height) = reencode_png(&bytes)?;
            Ok(LoadedUpload {
                name: display_name(&name),
                kind: LayerKind::Image,
                source: UploadSource::Png(png),
                width,
                height,
            })
        }
    }
}

/// Text that a paste can turn into a layer.
fn pasted_source(text: &str) -> Option<String> {
    let text = text.trim();
    if text.starts_with("data:image/") || media::is_remote(text) {
        return Some(text.to_string());
    }
    let path = std::path::Path::new(text);
    path.is_file().then(|| text.to_string())
}

/// Main application state.
pub struct VisualizaeApp {
    config: AppConfig,
    api: Arc<dyn GenerationApi>,
    ffmpeg: FfmpegTools,
    extractor: Arc<dyn FrameExtractor>,
    store: LocalProjectStore,
    assets: AssetCache,
    text: TextRenderer,
    textures: TextureCache,

    mode: AppMode,
    engine: CanvasEngine,
    layers: LayerStore,
    polygon: PolygonTool,
    canvas_input: CanvasInput,
    /// Canvas size from the previous frame, used as the zoom center.
    canvas_size: egui::Vec2,
    properties_state: PropertiesState,

    orchestrator: GenerationOrchestrator,
    generation_rx: Option<Receiver<GenerationEvent>>,
    references: ReferenceImages,
    prompt: String,
    options: GenerationOptions,

    timeline: Timeline,
    scene_jobs: Vec<SceneWorker>,
    export_rx: Option<Receiver<ExportEvent>>,
    export_status: ExportStatus,

    credits: Option<i64>,
    credits_rx: Option<Receiver<StudioResult<i64>>>,

    project_id: Option<String>,
    projects: Vec<ProjectSummary>,
    show_history: bool,
    history_state: HistoryState,
    autosave: Debounce,

    upload_rx: Option<Receiver<Vec<Result<LoadedUpload, String>>>>,
    loading_message: Option<String>,
    notice: Option<Notice>,
    show_about: bool,
}

impl VisualizaeApp {
    pub fn new(config: AppConfig) -> Self {
        let poll = RetryPolicy::new(config.poll_max_attempts, config.poll_interval());
        let api: Arc<dyn GenerationApi> = Arc::new(HttpGenerationApi::new(
            &config.api_base_url,
            config.api_token(),
            config.user_id.clone(),
            poll,
        ));
        let ffmpeg = FfmpegTools::new(&config.ffmpeg_path, &config.ffprobe_path);
        let extractor: Arc<dyn FrameExtractor> = Arc::new(FfmpegFrameExtractor::new(ffmpeg.clone()));

        let options = GenerationOptions {
            model: config.image_model.clone(),
            ..GenerationOptions::default()
        };
        let timeline = Timeline {
            model: config.video_model.clone(),
            ..Timeline::default()
        };

        let mut app = Self {
            api,
            extractor,
            store: LocalProjectStore::new(&config.data_dir),
            assets: AssetCache::new(config.assets_dir()),
            text: TextRenderer::load(config.label_font_path.as_deref()),
            textures: TextureCache::default(),
            mode: AppMode::Canvas,
            engine: CanvasEngine::default(),
            layers: LayerStore::new(),
            polygon: PolygonTool::default(),
            canvas_input: CanvasInput::default(),
            canvas_size: egui::vec2(1280.0, 720.0),
            properties_state: PropertiesState::default(),
            orchestrator: GenerationOrchestrator::new(),
            generation_rx: None,
            references: ReferenceImages::default(),
            prompt: String::new(),
            options,
            timeline,
            scene_jobs: Vec::new(),
            export_rx: None,
            export_status: ExportStatus::default(),
            credits: None,
            credits_rx: None,
            project_id: None,
            projects: Vec::new(),
            show_history: false,
            history_state: HistoryState::default(),
            autosave: Debounce::new(config.autosave_debounce()),
            upload_rx: None,
            loading_message: None,
            notice: None,
            show_about: false,
            ffmpeg,
            config,
        };
        app.refresh_projects();
        app.refresh_credits();
        app
    }

    fn notify(&mut self, text: impl Into<String>, error: bool) {
        let text = text.into();
        if error {
            log::error!("{}", text);
        } else {
            log::info!("{}", text);
        }
        self.notice = Some(Notice {
            text,
            error,
            at: Instant::now(),
        });
    }

    fn notify_error(&mut self, error: &StudioError) {
        log::debug!("Error detail: {:?}", error);
        self.notify(error.user_message(), true);
    }

    /// Schedule an autosave after the debounce delay.
    fn mark_dirty(&mut self) {
        self.autosave.schedule(Instant::now());
    }

    fn canvas_center(&self) -> Point {
        Point::new(self.canvas_size.x as f64 / 2.0, self.canvas_size.y as f64 / 2.0)
    }

    // --- Credits and projects ---

    fn refresh_credits(&mut self) {
        if self.credits_rx.is_some() {
            return;
        }
        let (sender, receiver) = channel();
        let api = Arc::clone(&self.api);
        std::thread::spawn(move || {
            let _ = sender.send(api.credits());
        });
        self.credits_rx = Some(receiver);
    }

    fn refresh_projects(&mut self) {
        match self.store.list() {
            Ok(projects) => self.projects = projects,
            Err(e) => log::warn!("Could not list projects: {}", e),
        }
    }

    /// PNG thumbnail of everything visible on the canvas.
    fn thumbnail(&mut self) -> Option<Vec<u8>> {
        let bounds: Vec<Point> = self
            .layers
            .layers()
            .iter()
            .filter(|l| l.visible && !l.is_video())
            .flat_map(|l| [Point::new(l.x, l.y), Point::new(l.x + l.w, l.y + l.h)])
            .collect();
        let area = geometry::bounding_box(&bounds)?;
        let snapshot = match snapshot_selection(self.layers.layers(), area, &mut self.assets) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Thumbnail snapshot failed: {}", e);
                return None;
            }
        };
        let budget = (THUMBNAIL_MAX_SIDE * THUMBNAIL_MAX_SIDE) as f64;
        let (w, h) = geometry::fit_pixel_budget(snapshot.width(), snapshot.height(), budget, THUMBNAIL_MAX_SIDE);
        snapshot
            .resampled(w.max(1), h.max(1))
            .and_then(|s| s.encode_png())
            .map_err(|e| log::warn!("Thumbnail encoding failed: {}", e))
            .ok()
    }

    fn save_project(&mut self) {
        let thumbnail = self.thumbnail();
        let request = SaveRequest {
            owner_id: &self.config.user_id,
            layers: self.layers.layers(),
            thumbnail: thumbnail.as_deref(),
            canvas_size: (self.config.canvas_width, self.config.canvas_height),
            project_id: self.project_id.as_deref(),
            scenes: Some(&self.timeline.scenes),
            orientation: Some(self.timeline.orientation),
        };
        match self.store.save(request) {
            Ok(id) => {
                log::info!("Autosaved project {}", id);
                self.project_id = Some(id);
                self.refresh_projects();
            }
            Err(e) => log::warn!("Autosave failed: {}", e),
        }
    }

    fn new_project(&mut self) {
        self.flush_autosave();
        self.layers.replace_all(Vec::new());
        self.engine.clear_selection();
        self.engine.select_layer(None);
        self.polygon.clear();
        self.timeline = Timeline {
            model: self.config.video_model.clone(),
            ..Timeline::default()
        };
        self.project_id = None;
        log::info!("Started a new project");
    }

    fn open_project(&mut self, id: &str) {
        self.flush_autosave();
        match self.store.load(id) {
            Ok(data) => {
                self.layers.replace_all(data.layers);
                self.engine.clear_selection();
                self.engine.select_layer(None);
                self.engine.reset_view();
                self.polygon.clear();
                let mut timeline = Timeline {
                    model: self.config.video_model.clone(),
                    orientation: data.orientation,
                    ..Timeline::default()
                };
                if !data.scenes.is_empty() {
                    timeline.scenes = data.scenes;
                }
                self.timeline = timeline;
                self.project_id = Some(data.id);
                self.notify(format!("Opened '{}'", data.name), false);
            }
            Err(e) => self.notify_error(&e),
        }
    }

    /// Save pending edits before switching projects.
    fn flush_autosave(&mut self) {
        if self.autosave.is_pending() {
            self.autosave.cancel();
            self.save_project();
        }
    }

    // --- Uploads ---

    fn start_uploads(&mut self, inputs: Vec<UploadInput>) {
        if inputs.is_empty() || self.upload_rx.is_some() {
            return;
        }
        let (sender, receiver) = channel();
        self.upload_rx = Some(receiver);
        self.loading_message = Some(format!("Loading {} file(s)...", inputs.len()));
        let tools = self.ffmpeg.clone();

        std::thread::spawn(move || {
            let results = inputs
                .into_iter()
                .map(|input| load_upload(input, &tools).map_err(|e| format!("{e:#}")))
                .collect();
            let _ = sender.send(results);
        });
    }

    fn pick_uploads(&mut self) {
        if let Some(paths) = rfd::FileDialog::new()
            .add_filter("Media", &["png", "jpg", "jpeg", "webp", "bmp", "gif", "mp4", "webm", "mov"])
            .pick_files()
        {
            let inputs = paths
                .into_iter()
                .map(|p| UploadInput::Src(p.to_string_lossy().to_string()))
                .collect();
            self.start_uploads(inputs);
        }
    }

    fn add_uploads(&mut self, uploads: Vec<Result<LoadedUpload, String>>) {
        let center = self.engine.viewport.screen_to_world(self.canvas_center());
        let mut offset = 0.0;
        for upload in uploads {
            let upload = match upload {
                Ok(upload) => upload,
                Err(e) => {
                    self.notify(format!("Could not load file: {e}"), true);
                    continue;
                }
            };
            let src = match upload.source {
                UploadSource::Src(src) => src,
                UploadSource::Png(png) => match self.assets.store_png(&png) {
                    Ok(src) => src,
                    Err(e) => {
                        self.notify_error(&e);
                        continue;
                    }
                },
            };
            let (w, h) = (upload.width.max(1) as f64, upload.height.max(1) as f64);
            let scale = (MAX_UPLOAD_SIDE / w.max(h)).min(1.0);
            let (w, h) = (w * scale, h * scale);
            let bounds = Rect::new(center.x - w / 2.0 + offset, center.y - h / 2.0 + offset, w, h);
            let layer = Layer::new(upload.name, upload.kind, src, bounds);
            let id = layer.id;
            self.layers.push_top(layer);
            self.engine.select_layer(Some(id));
            offset += UPLOAD_CASCADE;
        }
        self.mark_dirty();
    }

    // --- Layout files and PNG downloads ---

    fn export_layout(&mut self, path: PathBuf) {
        let doc = LayoutDocument {
            canvas_width: self.config.canvas_width,
            canvas_height: self.config.canvas_height,
            layers: self.layers.layers().to_vec(),
        };
        match serialization::export_layout(&doc, &path) {
            Ok(()) => self.notify(format!("Exported layout to {}", path.display()), false),
            Err(e) => self.notify(format!("Failed to export layout: {e}"), true),
        }
    }

    fn import_layout(&mut self, path: PathBuf) {
        match serialization::import_layout(&path) {
            Ok(doc) => {
                self.layers.replace_all(doc.layers);
                self.engine.select_layer(None);
                self.engine.clear_selection();
                self.mark_dirty();
                self.notify(format!("Imported {} layers", self.layers.len()), false);
            }
            Err(e) => self.notify(format!("Failed to import layout: {e}"), true),
        }
    }

    fn save_png(&mut self, png: StudioResult<Vec<u8>>, file_name: &str) {
        let png = match png {
            Ok(png) => png,
            Err(e) => return self.notify_error(&e),
        };
        let Some(path) = rfd::FileDialog::new()
            .add_filter("PNG", &["png"])
            .set_file_name(file_name)
            .save_file()
        else {
            return;
        };
        match std::fs::write(&path, png) {
            Ok(()) => self.notify(format!("Saved {}", path.display()), false),
            Err(e) => self.notify(format!("Failed to save {}: {e}", path.display()), true),
        }
    }

    fn download_selection(&mut self) {
        let Some(selection) = self.engine.selection() else {
            return;
        };
        let png = snapshot_selection(self.layers.layers(), selection, &mut self.assets).and_then(|snapshot| {
            snapshot
                .ok_or_else(|| StudioError::validation("There is nothing under the selection."))?
                .encode_png()
        });
        self.save_png(png, "selection.png");
    }

    fn download_layer(&mut self, id: Uuid) {
        let Some(layer) = self.layers.get(id) else {
            return;
        };
        let file_name = format!("{}.png", layer.name);
        let src = layer.src.clone();
        let png = self.assets.load(&src).and_then(|surface| surface.encode_png());
        self.save_png(png, &file_name);
    }

    // --- Generation ---

    fn generate(&mut self) {
        let prepared = self.orchestrator.prepare(
            &self.prompt,
            &self.options,
            &self.references,
            &mut self.engine,
            &self.layers,
            &mut self.assets,
        );
        self.dispatch(prepared);
    }

    fn upscale(&mut self) {
        let prepared = self.orchestrator.prepare_upscale(
            &self.config.image_model,
            &mut self.engine,
            &self.layers,
            &mut self.assets,
        );
        self.dispatch(prepared);
    }

    fn dispatch(&mut self, prepared: StudioResult<Option<GenerationJob>>) {
        match prepared {
            Ok(Some(job)) => {
                self.generation_rx = Some(GenerationOrchestrator::spawn(Arc::clone(&self.api), job));
            }
            Ok(None) => {}
            Err(e) => self.notify_error(&e),
        }
    }

    fn add_references(&mut self) {
        let Some(paths) = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "webp", "bmp"])
            .pick_files()
        else {
            return;
        };
        for path in paths {
            match std::fs::read(&path) {
                Ok(bytes) => {
                    if !self.references.add(bytes) {
                        self.notify("Reference image limit reached", true);
                        break;
                    }
                }
                Err(e) => self.notify(format!("Failed to read {}: {e}", path.display()), true),
            }
        }
    }

    fn commit_zone(&mut self, points: Vec<Point>) {
        match polygon::zone_layer(points, &self.polygon.label, self.polygon.font_size, &self.text, &mut self.assets) {
            Ok(layer) => {
                let id = layer.id;
                self.layers.push_top(layer);
                self.engine.select_layer(Some(id));
                self.mark_dirty();
            }
            Err(e) => self.notify_error(&e),
        }
    }

    fn apply_zone(&mut self, id: Uuid, label: &str, font_size: f32) -> bool {
        let Some(mut layer) = self.layers.get(id).cloned() else {
            return false;
        };
        let old_src = layer.src.clone();
        match polygon::rerasterize(&mut layer, label, font_size, &self.text, &mut self.assets) {
            Ok(()) => {
                self.textures.forget(&old_src);
                self.layers.update(id, |l| *l = layer)
            }
            Err(e) => {
                self.notify_error(&e);
                false
            }
        }
    }

    fn apply_layer_command(&mut self, id: Uuid, command: LayerCommand) {
        let changed = match command {
            LayerCommand::ToggleVisible => self.layers.update(id, |l| l.visible = !l.visible),
            LayerCommand::ToggleLocked => self.layers.update(id, |l| l.locked = !l.locked),
            LayerCommand::Raise => self.layers.raise(id),
            LayerCommand::Lower => self.layers.lower(id),
            LayerCommand::ToTop => self.layers.reorder(id, 0),
            LayerCommand::ToBottom => self.layers.reorder(id, usize::MAX),
            LayerCommand::Duplicate => match self.layers.duplicate(id) {
                Some(copy) => {
                    self.engine.select_layer(Some(copy));
                    true
                }
                None => false,
            },
            LayerCommand::Delete => {
                let removed = self.layers.remove(id).is_some();
                if removed {
                    self.engine.select_layer(None);
                }
                removed
            }
            LayerCommand::Reset => self.layers.update(id, Layer::reset_geometry),
            LayerCommand::TogglePlay => self.layers.update(id, |l| l.is_playing = l.is_playing.map(|p| !p)),
            LayerCommand::SetRenderMode(mode) => self.layers.update(id, |l| l.render_mode = mode),
            LayerCommand::DownloadPng => {
                self.download_layer(id);
                false
            }
            LayerCommand::ApplyZone { label, font_size } => self.apply_zone(id, &label, font_size),
        };
        if changed {
            self.mark_dirty();
        }
    }

    fn delete_selected(&mut self) {
        if let Some(id) = self.engine.selected_layer() {
            self.apply_layer_command(id, LayerCommand::Delete);
        }
    }

    fn undo(&mut self) {
        if self.layers.undo() {
            self.mark_dirty();
        }
    }

    fn redo(&mut self) {
        if self.layers.redo() {
            self.mark_dirty();
        }
    }

    // --- Studio ---

    fn pick_frame(&mut self, scene_id: Uuid, slot: FrameSlot) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "webp"])
            .pick_file()
        else {
            return;
        };
        let frame = media::load_image(&path).map(|img| FrameImage {
            src: path.to_string_lossy().to_string(),
            width: img.width,
            height: img.height,
        });
        match frame {
            Ok(frame) => {
                if let Some(scene) = self.timeline.scene_mut(scene_id) {
                    match slot {
                        FrameSlot::Start => scene.start_frame = Some(frame),
                        FrameSlot::End => scene.end_frame = Some(frame),
                    }
                    self.mark_dirty();
                }
            }
            Err(e) => self.notify(format!("Could not read {}: {e}", path.display()), true),
        }
    }

    fn generate_scene(&mut self, scene_id: Uuid) {
        match self.timeline.prepare_scene(scene_id) {
            Ok(job) => {
                let rx = Timeline::spawn_scene_job(Arc::clone(&self.api), Arc::clone(&self.extractor), job);
                self.scene_jobs.push(SceneWorker {
                    scene_id,
                    rx,
                    holds_scene: true,
                });
            }
            Err(e) => self.notify_error(&e),
        }
    }

    fn use_last_frame(&mut self, scene_id: Uuid) {
        match self.timeline.spawn_last_frame(scene_id, Arc::clone(&self.extractor)) {
            Ok(rx) => self.scene_jobs.push(SceneWorker {
                scene_id,
                rx,
                holds_scene: false,
            }),
            Err(e) => self.notify_error(&e),
        }
    }

    fn start_export(&mut self) {
        if self.export_rx.is_some() {
            return;
        }
        let clips = match export::plan_export(&self.timeline.scenes) {
            Ok(clips) => clips,
            Err(e) => return self.notify_error(&e),
        };
        let dir = self.config.exports_dir();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            return self.notify(format!("Cannot create {}: {e}", dir.display()), true);
        }
        let codec = self.ffmpeg.negotiate_codec();
        let output = dir.join(export::output_file_name(codec));
        log::info!("Exporting {} clip(s) as {} to {}", clips.len(), codec.label(), output.display());

        self.export_status = ExportStatus {
            state: ExportState::Probing,
            ..ExportStatus::default()
        };
        self.export_rx = Some(export::spawn_export(
            FfmpegClipDecoder::new(self.ffmpeg.clone()),
            FfmpegRecorder::new(self.ffmpeg.clone()),
            self.config.export_fps,
            clips,
            codec,
            output,
        ));
    }

    // --- Channel draining ---

    fn drain_workers(&mut self) {
        if let Some(rx) = &self.upload_rx {
            if let Ok(uploads) = rx.try_recv() {
                self.upload_rx = None;
                self.loading_message = None;
                self.add_uploads(uploads);
            }
        }

        if let Some(rx) = &self.credits_rx {
            match rx.try_recv() {
                Ok(result) => {
                    self.credits_rx = None;
                    match result {
                        Ok(credits) => self.credits = Some(credits),
                        Err(e) => log::warn!("Could not fetch credits: {}", e),
                    }
                }
                Err(TryRecvError::Disconnected) => self.credits_rx = None,
                Err(TryRecvError::Empty) => {}
            }
        }

        self.drain_generation();
        self.drain_scenes();
        self.drain_export();
    }

    fn drain_generation(&mut self) {
        let Some(rx) = &self.generation_rx else {
            return;
        };
        let mut events = Vec::new();
        let mut disconnected = false;
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        for event in events {
            let update = self
                .orchestrator
                .apply(event, &mut self.engine, &mut self.layers, &mut self.assets);
            match update {
                GenerationUpdate::LayerAdded(_) => self.mark_dirty(),
                GenerationUpdate::Failed(e) => self.notify_error(&e),
                GenerationUpdate::Finished => {
                    self.generation_rx = None;
                    self.mark_dirty();
                    self.refresh_credits();
                }
            }
        }

        if disconnected && self.generation_rx.is_some() {
            // Worker vanished without reporting; release the canvas.
            let update = self.orchestrator.apply(
                GenerationEvent::Finished,
                &mut self.engine,
                &mut self.layers,
                &mut self.assets,
            );
            log::warn!("Generation worker stopped unexpectedly: {:?}", update);
            self.generation_rx = None;
        }
    }

    fn drain_scenes(&mut self) {
        let mut events = Vec::new();
        self.scene_jobs.retain_mut(|worker| worker.drain(&mut events));

        for event in events {
            match self.timeline.apply_event(event, &mut self.assets) {
                SceneUpdate::VideoAdded { scene_index } => {
                    log::info!("Scene {} received a video", scene_index + 1);
                    self.mark_dirty();
                }
                SceneUpdate::Chained { next_index } => {
                    log::info!("Chained last frame into scene {}", next_index + 1);
                    self.mark_dirty();
                }
                SceneUpdate::Failed(e) => self.notify_error(&e),
                SceneUpdate::Finished => {
                    self.mark_dirty();
                    self.refresh_credits();
                }
                SceneUpdate::Ignored => {}
            }
        }
    }

    fn drain_export(&mut self) {
        let Some(rx) = &self.export_rx else {
            return;
        };
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !events
                        .iter()
                        .any(|e| matches!(e, ExportEvent::Done(_) | ExportEvent::Failed(_)))
                    {
                        events.push(ExportEvent::Failed(StudioError::local("Export stopped unexpectedly.")));
                    }
                    break;
                }
            }
        }
        for event in events {
            match event {
                ExportEvent::State(state) => self.export_status.state = state,
                ExportEvent::Progress { frames_written, .. } => self.export_status.frames_written = frames_written,
                ExportEvent::Done(path) => {
                    self.export_rx = None;
                    self.export_status.state = ExportState::Idle;
                    self.export_status.last_output = Some(path.display().to_string());
                    self.notify(format!("Movie saved to {}", path.display()), false);
                }
                ExportEvent::Failed(e) => {
                    self.export_rx = None;
                    self.export_status.state = ExportState::Idle;
                    self.notify_error(&e);
                }
            }
        }
    }

    fn workers_active(&self) -> bool {
        self.generation_rx.is_some()
            || !self.scene_jobs.is_empty()
            || self.export_rx.is_some()
            || self.upload_rx.is_some()
            || self.credits_rx.is_some()
    }

    // --- Input outside the canvas ---

    fn handle_dropped_and_pasted(&mut self, ctx: &egui::Context) {
        let (dropped, events) = ctx.input(|i| (i.raw.dropped_files.clone(), i.events.clone()));

        let mut inputs: Vec<UploadInput> = dropped
            .into_iter()
            .filter_map(|file| match (file.path, file.bytes) {
                (Some(path), _) => Some(UploadInput::Src(path.to_string_lossy().to_string())),
                (None, Some(bytes)) => Some(UploadInput::Bytes {
                    name: file.name,
                    bytes: bytes.to_vec(),
                }),
                (None, None) => None,
            })
            .collect();

        if !ctx.wants_keyboard_input() {
            for event in events {
                if let egui::Event::Paste(text) = event {
                    match pasted_source(&text) {
                        Some(src) => inputs.push(UploadInput::Src(src)),
                        None => log::debug!("Ignoring paste that is not a path or URL"),
                    }
                }
            }
        }

        self.start_uploads(inputs);
    }

    fn handle_keyboard(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() || self.mode != AppMode::Canvas {
            return;
        }
        let polygon_active = self.engine.tool == Tool::Polygon && !self.polygon.is_empty();

        if ctx.input(|i| i.key_pressed(egui::Key::Enter)) && polygon_active {
            if let Some(points) = self.polygon.close() {
                self.commit_zone(points);
            }
        }

        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            if polygon_active {
                self.polygon.clear();
            } else {
                self.engine.clear_selection();
                self.engine.select_layer(None);
            }
        }

        if ctx.input(|i| i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace)) {
            if polygon_active {
                self.polygon.undo_point();
            } else {
                self.delete_selected();
            }
        }

        if ctx.input(|i| i.modifiers.command && i.key_pressed(egui::Key::Z) && !i.modifiers.shift) {
            self.undo();
        }
        if ctx.input(|i| {
            (i.modifiers.command && i.modifiers.shift && i.key_pressed(egui::Key::Z))
                || (i.modifiers.command && i.key_pressed(egui::Key::Y))
        }) {
            self.redo();
        }

        let shortcut = ctx.input(|i| {
            if i.modifiers.any() {
                return None;
            }
            [
                (egui::Key::V, Tool::Select),
                (egui::Key::M, Tool::Move),
                (egui::Key::H, Tool::Hand),
                (egui::Key::E, Tool::Eraser),
                (egui::Key::P, Tool::Polygon),
            ]
            .into_iter()
            .find(|(key, _)| i.key_pressed(*key))
            .map(|(_, tool)| tool)
        });
        if let Some(tool) = shortcut {
            self.set_tool(tool);
        }
    }

    fn set_tool(&mut self, tool: Tool) {
        if self.engine.is_busy() {
            return;
        }
        if tool != Tool::Polygon {
            self.polygon.clear();
        }
        self.engine.set_tool(tool);
    }

    // --- Panels ---

    fn menu_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("New Project").clicked() {
                        self.new_project();
                        ui.close_menu();
                    }
                    if ui.button("Projects...").clicked() {
                        self.refresh_projects();
                        self.show_history = true;
                        ui.close_menu();
                    }
                    if ui.button("Save Now").clicked() {
                        self.autosave.cancel();
                        self.save_project();
                        ui.close_menu();
                    }
                    ui.separator();
                    if ui.button("Upload...").clicked() {
                        self.pick_uploads();
                        ui.close_menu();
                    }
                    if ui.button("Import Layout...").clicked() {
                        if let Some(path) = rfd::FileDialog::new()
                            .add_filter("Layout", &["yaml", "yml", "json"])
                            .pick_file()
                        {
                            self.import_layout(path);
                        }
                        ui.close_menu();
                    }
                    ui.menu_button("Export Layout", |ui| {
                        if ui.button("Export as YAML...").clicked() {
                            if let Some(path) = rfd::FileDialog::new()
                                .add_filter("YAML", &["yaml", "yml"])
                                .set_file_name("layout.yaml")
                                .save_file()
                            {
                                self.export_layout(path);
                            }
                            ui.close_menu();
                        }
                        if ui.button("Export as JSON...").clicked() {
                            if let Some(path) = rfd::FileDialog::new()
                                .add_filter("JSON", &["json"])
                                .set_file_name("layout.json")
                                .save_file()
                            {
                                self.export_layout(path);
                            }
                            ui.close_menu();
                        }
                    });
                    let has_selection = self.engine.selection().is_some();
                    if ui
                        .add_enabled(has_selection, egui::Button::new("Download Selection PNG..."))
                        .clicked()
                    {
                        self.download_selection();
                        ui.close_menu();
                    }
                    ui.separator();
                    if ui.button("Quit").clicked() {
                        self.flush_autosave();
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });

                ui.menu_button("Edit", |ui| {
                    if ui
                        .add_enabled(self.layers.can_undo(), egui::Button::new("Undo (Ctrl+Z)"))
                        .clicked()
                    {
                        self.undo();
                        ui.close_menu();
                    }
                    if ui
                        .add_enabled(self.layers.can_redo(), egui::Button::new("Redo (Ctrl+Shift+Z)"))
                        .clicked()
                    {
                        self.redo();
                        ui.close_menu();
                    }
                    ui.separator();
                    let has_layer = self.engine.selected_layer().is_some();
                    if ui.add_enabled(has_layer, egui::Button::new("Delete Selected")).clicked() {
                        self.delete_selected();
                        ui.close_menu();
                    }
                    if ui.button("Clear Selection").clicked() {
                        self.engine.clear_selection();
                        self.engine.select_layer(None);
                        ui.close_menu();
                    }
                });

                ui.menu_button("View", |ui| {
                    if ui.button("Zoom In").clicked() {
                        self.engine.zoom_in(self.canvas_center());
                        ui.close_menu();
                    }
                    if ui.button("Zoom Out").clicked() {
                        self.engine.zoom_out(self.canvas_center());
                        ui.close_menu();
                    }
                    if ui.button("Reset Zoom").clicked() {
                        self.engine.reset_view();
                        ui.close_menu();
                    }
                });

                ui.menu_button("Help", |ui| {
                    if ui.button("About").clicked() {
                        self.show_about = true;
                        ui.close_menu();
                    }
                });
            });
        });
    }

    fn toolbar(&mut self, ctx: &egui::Context) {
        let state = ToolbarState {
            tool: self.engine.tool,
            mode: self.mode,
            zoom: self.engine.viewport.zoom,
            can_undo: self.layers.can_undo(),
            can_redo: self.layers.can_redo(),
            credits: self.credits,
            busy: self.engine.is_busy(),
        };
        let action = egui::TopBottomPanel::top("toolbar")
            .show(ctx, |ui| toolbar::show(ui, &state))
            .inner;

        match action {
            ToolbarAction::SetTool(tool) => self.set_tool(tool),
            ToolbarAction::SetMode(mode) => self.mode = mode,
            ToolbarAction::ZoomIn => self.engine.zoom_in(self.canvas_center()),
            ToolbarAction::ZoomOut => self.engine.zoom_out(self.canvas_center()),
            ToolbarAction::ResetView => self.engine.reset_view(),
            ToolbarAction::Undo => self.undo(),
            ToolbarAction::Redo => self.redo(),
            ToolbarAction::RefreshCredits => self.refresh_credits(),
            ToolbarAction::None => {}
        }
    }

    fn status_bar(&mut self, ctx: &egui::Context) {
        if self
            .notice
            .as_ref()
            .is_some_and(|n| n.at.elapsed() > NOTICE_LIFETIME)
        {
            self.notice = None;
        }

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                match &self.notice {
                    Some(notice) if notice.error => {
                        ui.colored_label(egui::Color32::from_rgb(240, 100, 100), &notice.text);
                    }
                    Some(notice) => {
                        ui.label(&notice.text);
                    }
                    None => {
                        ui.label(egui::RichText::new("Ready").weak());
                    }
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(format!("{} layers", self.layers.len()));
                    if self.autosave.is_pending() {
                        ui.label(egui::RichText::new("unsaved").weak());
                    }
                });
            });
        });
    }

    fn side_panel(&mut self, ctx: &egui::Context) {
        let (generate_action, properties_actions) = egui::SidePanel::right("properties")
            .default_width(300.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    let generate_action = generate::show(
                        ui,
                        &mut self.prompt,
                        &mut self.options,
                        &self.references,
                        self.engine.selection().is_some(),
                        self.orchestrator.is_busy(),
                    );

                    if self.engine.tool == Tool::Polygon {
                        ui.separator();
                        ui.heading("Zone");
                        ui.horizontal(|ui| {
                            ui.label("Label:");
                            ui.text_edit_singleline(&mut self.polygon.label);
                        });
                        ui.add(egui::Slider::new(&mut self.polygon.font_size, 8.0..=72.0).text("Font size"));
                        ui.label(format!("{} vertices", self.polygon.points().len()));
                        if !self.text.has_font() {
                            ui.label(egui::RichText::new("No label font found; labels draw without text").weak());
                        }
                    }

                    ui.separator();
                    let properties_actions = properties::show(
                        ui,
                        &self.layers,
                        self.engine.selected_layer(),
                        &mut self.properties_state,
                    );
                    (generate_action, properties_actions)
                })
                .inner
            })
            .inner;

        match generate_action {
            GenerateAction::Generate => self.generate(),
            GenerateAction::Upscale => self.upscale(),
            GenerateAction::AddReferences => self.add_references(),
            GenerateAction::RemoveReference(idx) => {
                self.references.remove(idx);
            }
            GenerateAction::ClearReferences => self.references.clear(),
            GenerateAction::None => {}
        }

        for action in properties_actions {
            match action {
                PropertiesAction::Select(id) => self.engine.select_layer(Some(id)),
                PropertiesAction::Checkpoint => self.layers.checkpoint(),
                PropertiesAction::Edited(layer) => {
                    if let Some(slot) = self.layers.get_mut(layer.id) {
                        *slot = layer;
                        self.mark_dirty();
                    }
                }
                PropertiesAction::Command(id, command) => self.apply_layer_command(id, command),
            }
        }
    }

    fn canvas_panel(&mut self, ctx: &egui::Context) {
        let actions = egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                self.canvas_size = ui.available_size();
                if let Some(message) = &self.loading_message {
                    ui.centered_and_justified(|ui| {
                        ui.vertical_centered(|ui| {
                            ui.add_space(20.0);
                            ui.spinner();
                            ui.label(egui::RichText::new(message).size(16.0).color(egui::Color32::from_gray(200)));
                        });
                    });
                    return Vec::new();
                }
                canvas::show(
                    ui,
                    CanvasView {
                        engine: &mut self.engine,
                        layers: &mut self.layers,
                        polygon: &self.polygon,
                        textures: &mut self.textures,
                        assets: &mut self.assets,
                        input: &mut self.canvas_input,
                    },
                )
            })
            .inner;

        for action in actions {
            match action {
                CanvasAction::PolygonPoint(p) => {
                    if let Some(points) = self.polygon.add_point(p) {
                        self.commit_zone(points);
                    }
                }
                CanvasAction::SelectionCommitted(rect) => {
                    log::debug!("Selection {:.0}x{:.0} at ({:.0}, {:.0})", rect.w, rect.h, rect.x, rect.y);
                }
                CanvasAction::LayerMoved(_) | CanvasAction::LayerErased(_) => self.mark_dirty(),
                CanvasAction::LayerSelected(_)
                | CanvasAction::SelectionDiscarded
                | CanvasAction::RenderNeeded
                | CanvasAction::None => {}
            }
        }
    }

    fn studio_panel(&mut self, ctx: &egui::Context) {
        let before = (self.timeline.scenes.clone(), self.timeline.orientation, self.timeline.with_audio);
        let actions = egui::CentralPanel::default()
            .show(ctx, |ui| {
                studio::show(
                    ui,
                    &mut self.timeline,
                    &mut self.textures,
                    &mut self.assets,
                    &self.export_status,
                )
            })
            .inner;
        if before != (self.timeline.scenes.clone(), self.timeline.orientation, self.timeline.with_audio) {
            self.mark_dirty();
        }

        for action in actions {
            match action {
                StudioAction::PickFrame(id, slot) => self.pick_frame(id, slot),
                StudioAction::Generate(id) => self.generate_scene(id),
                StudioAction::UseLastFrame(id) => self.use_last_frame(id),
                StudioAction::CopyVideoUrl(url) => {
                    ctx.output_mut(|o| o.copied_text = url);
                    self.notify("Video URL copied to the clipboard", false);
                }
                StudioAction::Export => self.start_export(),
            }
        }
    }

    fn windows(&mut self, ctx: &egui::Context) {
        if self.show_history {
            let mut open = true;
            let action = history::show(
                ctx,
                &mut open,
                &self.projects,
                self.project_id.as_deref(),
                &mut self.history_state,
                &mut self.textures,
                &mut self.assets,
            );
            self.show_history = open;
            match action {
                HistoryAction::Open(id) => {
                    self.open_project(&id);
                    self.show_history = false;
                }
                HistoryAction::Rename(id, name) => {
                    if let Err(e) = self.store.rename(&id, &name) {
                        self.notify_error(&e);
                    }
                    self.refresh_projects();
                }
                HistoryAction::Delete(id) => {
                    if let Err(e) = self.store.delete(&id) {
                        self.notify_error(&e);
                    }
                    if self.project_id.as_deref() == Some(id.as_str()) {
                        self.project_id = None;
                    }
                    self.refresh_projects();
                }
                HistoryAction::NewProject => {
                    self.new_project();
                    self.show_history = false;
                }
                HistoryAction::None => {}
            }
        }

        if self.show_about {
            egui::Window::new("About Visualizae")
                .open(&mut self.show_about)
                .collapsible(false)
                .show(ctx, |ui| {
                    ui.label("Visual compositing canvas with AI image and video generation.");
                    ui.label(format!("Version {}", env!("CARGO_PKG_VERSION")));
                });
        }
    }
}

impl eframe::App for VisualizaeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_workers();

        if self.autosave.fire(Instant::now()) {
            self.save_project();
        }

        self.handle_dropped_and_pasted(ctx);
        self.handle_keyboard(ctx);

        self.menu_bar(ctx);
        self.toolbar(ctx);
        self.status_bar(ctx);

        match self.mode {
            AppMode::Canvas => {
                self.side_panel(ctx);
                self.canvas_panel(ctx);
            }
            AppMode::Studio => self.studio_panel(ctx),
        }

        self.windows(ctx);

        // Keep polling workers and the autosave timer.
        if self.workers_active() || self.loading_message.is_some() {
            ctx.request_repaint_after(Duration::from_millis(100));
        } else if let Some(remaining) = self.autosave.remaining(Instant::now()) {
            ctx.request_repaint_after(remaining);
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.flush_autosave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn test_vanished_scene_worker_releases_scene() {
        let scene_id = Uuid::new_v4();
        let (sender, rx) = channel();
        sender
            .send(SceneEvent::VideoReady {
                scene_id,
                url: "https://cdn/a.mp4".to_string(),
            })
            .unwrap();
        drop(sender);
        let mut worker = SceneWorker {
            scene_id,
            rx,
            holds_scene: true,
        };
        let mut events = Vec::new();
        assert!(!worker.drain(&mut events));
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], SceneEvent::Failed { .. }));
        assert!(matches!(events[2], SceneEvent::Finished { scene_id: id } if id == scene_id));
    }

    #[test]
    fn test_finished_scene_worker_is_not_released_twice() {
        let scene_id = Uuid::new_v4();
        let (sender, rx) = channel();
        sender.send(SceneEvent::Finished { scene_id }).unwrap();
        let mut worker = SceneWorker {
            scene_id,
            rx,
            holds_scene: true,
        };
        let mut events = Vec::new();
        assert!(worker.drain(&mut events));
        drop(sender);
        assert!(!worker.drain(&mut events));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_display_name_strips_path_and_extension() {
        assert_eq!(display_name("/home/me/photos/beach.jpg"), "beach");
        assert_eq!(display_name("C:\\img\\cat.png"), "cat");
        assert_eq!(display_name("https://cdn.example.com/v/clip.mp4?sig=1"), "clip");
        assert_eq!(display_name("data:image/png;base64,AAAA"), "Pasted image");
        assert_eq!(display_name("noext"), "noext");
    }

    #[test]
    fn test_pasted_source_accepts_urls_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"x").unwrap();

        assert!(pasted_source("https://example.com/a.png").is_some());
        assert!(pasted_source("  data:image/png;base64,AAAA ").is_some());
        assert_eq!(pasted_source(file.to_str().unwrap()), Some(file.to_string_lossy().to_string()));
        assert!(pasted_source("just some words").is_none());
    }

    #[test]
    fn test_bytes_upload_is_reencoded_as_png() {
        let png = crate::api::fake::png_bytes(6, 4);
        let upload = load_upload(
            UploadInput::Bytes {
                name: "drop.bin".to_string(),
                bytes: png,
            },
            &FfmpegTools::default(),
        )
        .unwrap();
        assert_eq!((upload.width, upload.height), (6, 4));
        assert_eq!(upload.kind, LayerKind::Image);
        assert_eq!(upload.name, "drop");
        assert!(matches!(upload.source, UploadSource::Png(_)));
    }
}
