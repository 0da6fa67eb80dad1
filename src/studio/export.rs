// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Movie export: plays the chosen clip of every scene in order into one
//! recorder, redrawing each frame onto a fixed-size canvas and keeping a
//! single audio track in step with the video.

use crate::error::{StudioError, StudioResult};
use crate::models::layer::RenderMode;
use crate::models::scene::Scene;
use crate::models::shapes::Rect;
use crate::render::surface::{Rgba, Surface};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::{SystemTime, UNIX_EPOCH};

pub const FALLBACK_WIDTH: u32 = 1920;
pub const FALLBACK_HEIGHT: u32 = 1080;
pub const DEFAULT_FPS: u32 = 30;
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;
pub const AUDIO_CHANNELS: u32 = 2;

/// Report progress every this many frames.
const PROGRESS_EVERY: u64 = 15;

/// Basic facts about a clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipInfo {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
    pub has_audio: bool,
}

/// Sequential clip reader. One decoder is reused for every clip.
pub trait ClipDecoder: Send {
    fn probe(&mut self, src: &str) -> StudioResult<ClipInfo>;
    /// Start reading `src`, producing frames at `fps`.
    fn open(&mut self, src: &str, fps: u32) -> StudioResult<ClipInfo>;
    /// Next frame of the open clip, `None` at the end.
    fn next_frame(&mut self) -> StudioResult<Option<Surface>>;
    /// Interleaved stereo `f32` samples at [`AUDIO_SAMPLE_RATE`] for the
    /// open clip. Empty when the clip is silent.
    fn take_audio(&mut self) -> StudioResult<Vec<f32>>;
}

/// Encoder for the exported movie.
pub trait MovieRecorder: Send {
    fn start(&mut self, width: u32, height: u32, fps: u32, codec: ExportCodec) -> StudioResult<()>;
    fn write_frame(&mut self, frame: &Surface) -> StudioResult<()>;
    /// Interleaved stereo samples at [`AUDIO_SAMPLE_RATE`].
    fn write_audio(&mut self, samples: &[f32]) -> StudioResult<()>;
    fn finish(&mut self, output: &Path) -> StudioResult<()>;
    /// Drop everything recorded so far without producing a file.
    fn abort(&mut self);
}

/// Output codec and container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportCodec {
    H264Mp4,
    Vp9Webm,
    Vp8Webm,
    /// Whatever the WebM muxer picks by default.
    DefaultWebm,
}

impl ExportCodec {
    /// Pick the best codec among the available encoder names.
    pub fn negotiate(encoders: &[String]) -> ExportCodec {
        let has = |names: &[&str]| encoders.iter().any(|e| names.contains(&e.as_str()));
        if has(&["libx264", "libopenh264", "h264_videotoolbox", "h264_nvenc", "h264_qsv", "h264_vaapi"]) {
            ExportCodec::H264Mp4
        } else if has(&["libvpx-vp9", "vp9_vaapi", "vp9_qsv"]) {
            ExportCodec::Vp9Webm
        } else if has(&["libvpx"]) {
            ExportCodec::Vp8Webm
        } else {
            ExportCodec::DefaultWebm
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportCodec::H264Mp4 => "mp4",
            _ => "webm",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExportCodec::H264Mp4 => "H.264 / MP4",
            ExportCodec::Vp9Webm => "VP9 / WebM",
            ExportCodec::Vp8Webm => "VP8 / WebM",
            ExportCodec::DefaultWebm => "WebM",
        }
    }
}

/// Export pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportState {
    #[default]
    Idle,
    Probing,
    Recording { scene_index: usize, scene_count: usize },
    Finalizing,
}

#[derive(Debug)]
pub enum ExportEvent {
    State(ExportState),
    Progress { scene_index: usize, frames_written: u64 },
    Done(PathBuf),
    Failed(StudioError),
}

/// Chosen clips of the scenes that can be exported, in timeline order.
pub fn plan_export(scenes: &[Scene]) -> StudioResult<Vec<String>> {
    let clips: Vec<String> = scenes
        .iter()
        .filter_map(|s| s.selected_video().map(str::to_string))
        .collect();
    if clips.is_empty() {
        return Err(StudioError::validation("No scene has a video to export yet."));
    }
    Ok(clips)
}

/// Timestamped output file name.
pub fn output_file_name(codec: ExportCodec) -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("visualizae-movie-{secs}.{}", codec.extension())
}

/// Force even dimensions, which most encoders require.
fn even(v: u32) -> u32 {
    (v & !1).max(2)
}

/// Audio samples per channel that belong to `frames` video frames.
fn audio_samples_for(frames: u64, fps: u32) -> u64 {
    (frames as f64 / fps as f64 * AUDIO_SAMPLE_RATE as f64).round() as u64
}

/// Drives one export from start to finish.
pub struct MovieExporter<D: ClipDecoder, R: MovieRecorder> {
    decoder: D,
    recorder: R,
    fps: u32,
    state: ExportState,
}

impl<D: ClipDecoder, R: MovieRecorder> MovieExporter<D, R> {
    pub fn new(decoder: D, recorder: R, fps: u32) -> Self {
        Self {
            decoder,
            recorder,
            fps: fps.max(1),
            state: ExportState::Idle,
        }
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    fn set_state(&mut self, state: ExportState, emit: &mut impl FnMut(ExportEvent)) {
        self.state = state;
        emit(ExportEvent::State(state));
    }

    /// Export `clips` to `output`. On failure nothing is written and the
    /// exporter is back to idle.
    pub fn run(
        &mut self,
        clips: &[String],
        codec: ExportCodec,
        output: &Path,
        mut emit: impl FnMut(ExportEvent),
    ) -> StudioResult<PathBuf> {
        let result = self.record(clips, codec, output, &mut emit);
        if let Err(e) = &result {
            log::error!("Export failed: {}", e);
            self.recorder.abort();
        }
        self.set_state(ExportState::Idle, &mut emit);
        result
    }

    fn record(
        &mut self,
        clips: &[String],
        codec: ExportCodec,
        output: &Path,
        emit: &mut impl FnMut(ExportEvent),
    ) -> StudioResult<PathBuf> {
        let Some(first) = clips.first() else {
            return Err(StudioError::validation("No scene has a video to export yet."));
        };

        self.set_state(ExportState::Probing, emit);
        let (width, height) = match self.decoder.probe(first) {
            Ok(info) if info.width > 0 && info.height > 0 => (even(info.width), even(info.height)),
            Ok(_) => (FALLBACK_WIDTH, FALLBACK_HEIGHT),
            Err(e) => {
                log::warn!("Could not probe {}: {}; using {}x{}", first, e, FALLBACK_WIDTH, FALLBACK_HEIGHT);
                (FALLBACK_WIDTH, FALLBACK_HEIGHT)
            }
        };
        let mut canvas = Surface::new(width, height)?;
        let area = Rect::new(0.0, 0.0, width as f64, height as f64);
        self.recorder.start(width, height, self.fps, codec)?;
        log::info!("Exporting {} clip(s) at {}x{} {} fps as {}", clips.len(), width, height, self.fps, codec.label());

        let mut frames_written: u64 = 0;
        let mut audio_written: u64 = 0;
        for (scene_index, clip) in clips.iter().enumerate() {
            self.set_state(
                ExportState::Recording {
                    scene_index,
                    scene_count: clips.len(),
                },
                emit,
            );
            self.decoder.open(clip, self.fps)?;
            while let Some(frame) = self.decoder.next_frame()? {
                canvas.clear(Rgba::BLACK);
                canvas.draw_surface(&frame, area, RenderMode::Cover, 0.0);
                self.recorder.write_frame(&canvas)?;
                frames_written += 1;
                if frames_written % PROGRESS_EVERY == 0 {
                    emit(ExportEvent::Progress {
                        scene_index,
                        frames_written,
                    });
                }
            }

            // Keep the audio track exactly as long as the video so far.
            let target = audio_samples_for(frames_written, self.fps);
            let needed = (target.saturating_sub(audio_written) * AUDIO_CHANNELS as u64) as usize;
            let mut samples = self.decoder.take_audio()?;
            samples.resize(needed, 0.0);
            self.recorder.write_audio(&samples)?;
            audio_written = target;
            emit(ExportEvent::Progress {
                scene_index,
                frames_written,
            });
        }

        self.set_state(ExportState::Finalizing, emit);
        self.recorder.finish(output)?;
        log::info!("Exported {} frames to {}", frames_written, output.display());
        Ok(output.to_path_buf())
    }
}

/// Run an export on a worker thread.
pub fn spawn_export<D, R>(
    decoder: D,
    recorder: R,
    fps: u32,
    clips: Vec<String>,
    codec: ExportCodec,
    output: PathBuf,
) -> Receiver<ExportEvent>
where
    D: ClipDecoder + 'static,
    R: MovieRecorder + 'static,
{
    let (sender, receiver) = channel();
    std::thread::spawn(move || {
        let mut exporter = MovieExporter::new(decoder, recorder, fps);
        let result = exporter.run(&clips, codec, &output, |event| {
            let _ = sender.send(event);
        });
        let _ = sender.send(match result {
            Ok(path) => ExportEvent::Done(path),
            Err(e) => ExportEvent::Failed(e),
        });
    });
    receiver
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Clips are `name -> (frame count, width, height)`.
    struct FakeDecoder {
        clips: HashMap<String, (u32, u32, u32)>,
        remaining: u32,
        current: Option<String>,
        opened: Arc<Mutex<Vec<String>>>,
    }

    impl FakeDecoder {
        fn new(clips: &[(&str, u32, u32, u32)]) -> Self {
            Self {
                clips: clips
                    .iter()
                    .map(|(n, f, w, h)| (n.to_string(), (*f, *w, *h)))
                    .collect(),
                remaining: 0,
                current: None,
                opened: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn info(&self, src: &str) -> StudioResult<(u32, u32, u32)> {
            self.clips
                .get(src)
                .copied()
                .ok_or_else(|| StudioError::local(format!("cannot open {src}")))
        }
    }

    impl ClipDecoder for FakeDecoder {
        fn probe(&mut self, src: &str) -> StudioResult<ClipInfo> {
            let (frames, width, height) = self.info(src)?;
            Ok(ClipInfo {
                width,
                height,
                duration_seconds: frames as f64 / DEFAULT_FPS as f64,
                has_audio: true,
            })
        }

        fn open(&mut self, src: &str, _fps: u32) -> StudioResult<ClipInfo> {
            let info = self.probe(src)?;
            self.remaining = self.info(src)?.0;
            self.current = Some(src.to_string());
            self.opened.lock().unwrap().push(src.to_string());
            Ok(info)
        }

        fn next_frame(&mut self) -> StudioResult<Option<Surface>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            let (_, w, h) = self.info(self.current.as_deref().unwrap_or_default())?;
            Surface::new(w, h).map(Some)
        }

        fn take_audio(&mut self) -> StudioResult<Vec<f32>> {
            // Deliberately a little long so padding and truncation both matter.
            Ok(vec![0.5; 1000])
        }
    }

    #[derive(Default)]
    struct Recorded {
        started: Option<(u32, u32)>,
        frames: u64,
        audio_samples: usize,
        finished: bool,
        aborted: bool,
    }

    #[derive(Clone, Default)]
    struct FakeRecorder(Arc<Mutex<Recorded>>);

    impl MovieRecorder for FakeRecorder {
        fn start(&mut self, width: u32, height: u32, _fps: u32, _codec: ExportCodec) -> StudioResult<()> {
            self.0.lock().unwrap().started = Some((width, height));
            Ok(())
        }

        fn write_frame(&mut self, frame: &Surface) -> StudioResult<()> {
            let mut rec = self.0.lock().unwrap();
            assert_eq!(Some((frame.width(), frame.height())), rec.started);
            rec.frames += 1;
            Ok(())
        }

        fn write_audio(&mut self, samples: &[f32]) -> StudioResult<()> {
            self.0.lock().unwrap().audio_samples += samples.len();
            Ok(())
        }

        fn finish(&mut self, _output: &Path) -> StudioResult<()> {
            self.0.lock().unwrap().finished = true;
            Ok(())
        }

        fn abort(&mut self) {
            self.0.lock().unwrap().aborted = true;
        }
    }

    #[test]
    fn test_codec_negotiation_order() {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(ExportCodec::negotiate(&names(&["libvpx", "libx264"])), ExportCodec::H264Mp4);
        assert_eq!(ExportCodec::negotiate(&names(&["libvpx", "libvpx-vp9"])), ExportCodec::Vp9Webm);
        assert_eq!(ExportCodec::negotiate(&names(&["libvpx"])), ExportCodec::Vp8Webm);
        assert_eq!(ExportCodec::negotiate(&[]), ExportCodec::DefaultWebm);
        assert_eq!(ExportCodec::Vp9Webm.extension(), "webm");
        assert!(output_file_name(ExportCodec::H264Mp4).ends_with(".mp4"));
    }

    #[test]
    fn test_plan_skips_scenes_without_videos() {
        let mut a = Scene::new();
        a.push_video("a.mp4".into());
        let b = Scene::new();
        let mut c = Scene::new();
        c.push_video("c1.mp4".into());
        c.push_video("c2.mp4".into());
        c.selected_video_index = Some(1);
        assert_eq!(plan_export(&[a, b, c]).unwrap(), vec!["a.mp4", "c2.mp4"]);

        let err = plan_export(&[Scene::new()]).unwrap_err();
        assert!(matches!(err, StudioError::Validation(_)));
    }

    #[test]
    fn test_export_plays_clips_in_order() {
        let decoder = FakeDecoder::new(&[("a", 30, 1280, 720), ("b", 45, 720, 1280), ("c", 15, 640, 480)]);
        let opened = Arc::clone(&decoder.opened);
        let recorder = FakeRecorder::default();
        let recorded = Arc::clone(&recorder.0);
        let mut exporter = MovieExporter::new(decoder, recorder, DEFAULT_FPS);
        let clips = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let mut states = Vec::new();
        let out = exporter
            .run(&clips, ExportCodec::H264Mp4, Path::new("/tmp/out.mp4"), |e| {
                if let ExportEvent::State(s) = e {
                    states.push(s);
                }
            })
            .unwrap();

        assert_eq!(out, PathBuf::from("/tmp/out.mp4"));
        assert_eq!(*opened.lock().unwrap(), clips);
        let rec = recorded.lock().unwrap();
        assert_eq!(rec.started, Some((1280, 720)));
        assert_eq!(rec.frames, 90);
        // 90 frames at 30 fps is 3 s of stereo audio.
        assert_eq!(rec.audio_samples, 3 * AUDIO_SAMPLE_RATE as usize * 2);
        assert!(rec.finished);
        assert_eq!(states.first(), Some(&ExportState::Probing));
        assert_eq!(
            states[3],
            ExportState::Recording {
                scene_index: 2,
                scene_count: 3
            }
        );
        assert_eq!(states[states.len() - 2], ExportState::Finalizing);
        assert_eq!(exporter.state(), ExportState::Idle);
    }

    #[test]
    fn test_probe_failure_uses_fallback_size() {
        let decoder = FakeDecoder::new(&[("b", 2, 1001, 601)]);
        let recorder = FakeRecorder::default();
        let recorded = Arc::clone(&recorder.0);
        let mut exporter = MovieExporter::new(decoder, recorder, DEFAULT_FPS);
        // First clip cannot be probed or opened: the export aborts.
        let clips = vec!["missing".to_string(), "b".to_string()];
        let err = exporter
            .run(&clips, ExportCodec::Vp9Webm, Path::new("/tmp/out.webm"), |_| {})
            .unwrap_err();
        assert!(matches!(err, StudioError::LocalResource(_)));
        let rec = recorded.lock().unwrap();
        assert_eq!(rec.started, Some((FALLBACK_WIDTH, FALLBACK_HEIGHT)));
        assert!(rec.aborted);
        assert!(!rec.finished);
        assert_eq!(exporter.state(), ExportState::Idle);
    }

    #[test]
    fn test_odd_dimensions_are_evened() {
        let decoder = FakeDecoder::new(&[("b", 1, 1001, 601)]);
        let recorder = FakeRecorder::default();
        let recorded = Arc::clone(&recorder.0);
        let mut exporter = MovieExporter::new(decoder, recorder, DEFAULT_FPS);
        exporter
            .run(&["b".to_string()], ExportCodec::Vp8Webm, Path::new("/tmp/x.webm"), |_| {})
            .unwrap();
        assert_eq!(recorded.lock().unwrap().started, Some((1000, 600)));
    }
}
