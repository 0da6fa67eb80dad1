// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Video probing, decoding and encoding through the system `ffmpeg` and
//! `ffprobe` binaries.

use crate::error::{StudioError, StudioResult};
use crate::render::surface::Surface;
use crate::studio::export::{ClipDecoder, ClipInfo, ExportCodec, MovieRecorder, AUDIO_CHANNELS, AUDIO_SAMPLE_RATE};
use crate::studio::timeline::FrameExtractor;
use serde::Deserialize;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

/// Locations of the ffmpeg binaries.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    tags: Option<ProbeTags>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

impl ProbeStream {
    /// Display rotation in degrees, from the display matrix or the legacy
    /// `rotate` tag.
    fn rotation(&self) -> i64 {
        self.side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| {
                self.tags
                    .as_ref()
                    .and_then(|t| t.rotate.as_deref())
                    .and_then(|r| r.trim().parse::<f64>().ok())
            })
            .map(|r| r.round() as i64)
            .unwrap_or(0)
    }
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOut {
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

impl FfmpegTools {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    fn ffmpeg(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-nostdin", "-v", "error"]);
        cmd
    }

    /// Dimensions, duration and audio presence of a clip.
    pub fn probe(&self, src: &str) -> StudioResult<ClipInfo> {
        let out = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
            .arg(src)
            .output()
            .map_err(|e| StudioError::local(format!("failed to run ffprobe: {e}")))?;
        if !out.status.success() {
            return Err(StudioError::local(format!(
                "ffprobe failed for '{}': {}",
                src,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        parse_probe(&out.stdout)
    }

    /// Names of the encoders this ffmpeg build offers.
    pub fn available_encoders(&self) -> Vec<String> {
        match Command::new(&self.ffmpeg).args(["-hide_banner", "-encoders"]).output() {
            Ok(out) if out.status.success() => parse_encoders(&String::from_utf8_lossy(&out.stdout)),
            Ok(out) => {
                log::warn!("ffmpeg -encoders failed: {}", String::from_utf8_lossy(&out.stderr).trim());
                Vec::new()
            }
            Err(e) => {
                log::warn!("Could not run ffmpeg: {}", e);
                Vec::new()
            }
        }
    }

    /// Best export codec for this ffmpeg build.
    pub fn negotiate_codec(&self) -> ExportCodec {
        let codec = ExportCodec::negotiate(&self.available_encoders());
        log::info!("Export codec: {}", codec.label());
        codec
    }

    /// Whole audio track as interleaved stereo `f32` at the export rate.
    pub fn decode_audio(&self, src: &str) -> StudioResult<Vec<f32>> {
        let out = self
            .ffmpeg()
            .arg("-i")
            .arg(src)
            .args([
                "-vn",
                "-f",
                "f32le",
                "-acodec",
                "pcm_f32le",
                "-ac",
                &AUDIO_CHANNELS.to_string(),
                "-ar",
                &AUDIO_SAMPLE_RATE.to_string(),
                "pipe:1",
            ])
            .output()
            .map_err(|e| StudioError::local(format!("failed to run ffmpeg for audio decode: {e}")))?;
        if !out.status.success() {
            let msg = String::from_utf8_lossy(&out.stderr);
            // A clip without an audio stream is silent, not broken.
            if msg.contains("matches no streams") || msg.contains("does not contain any stream") {
                return Ok(Vec::new());
            }
            return Err(StudioError::local(format!("audio decode failed for '{src}': {}", msg.trim())));
        }
        Ok(out
            .stdout
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

fn parse_probe(json: &[u8]) -> StudioResult<ClipInfo> {
    let parsed: ProbeOut =
        serde_json::from_slice(json).map_err(|e| StudioError::local(format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| StudioError::local("no video stream found"))?;
    let (Some(width), Some(height)) = (video.width, video.height) else {
        return Err(StudioError::local("ffprobe reported no video dimensions"));
    };
    // ffmpeg autorotates on decode, so quarter turns swap the output size.
    let (width, height) = if video.rotation().rem_euclid(180) == 90 {
        (height, width)
    } else {
        (width, height)
    };
    let duration_seconds = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    Ok(ClipInfo {
        width,
        height,
        duration_seconds,
        has_audio,
    })
}

/// Parse the table printed by `ffmpeg -encoders`.
fn parse_encoders(text: &str) -> Vec<String> {
    text.lines()
        .skip_while(|l| !l.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|l| l.split_whitespace().nth(1).map(str::to_string))
        .collect()
}

/// Reads frames of one clip at a time from an `ffmpeg` pipe.
pub struct FfmpegClipDecoder {
    tools: FfmpegTools,
    src: String,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    frame: (u32, u32),
}

impl FfmpegClipDecoder {
    pub fn new(tools: FfmpegTools) -> Self {
        Self {
            tools,
            src: String::new(),
            child: None,
            stdout: None,
            stderr: None,
            frame: (0, 0),
        }
    }

    fn close(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.stderr.take() {
            let _ = handle.join();
        }
    }

    /// Reap the decoder after its pipe ran dry. A non-zero exit means the
    /// clip was cut short.
    fn finish_clip(&mut self) -> StudioResult<()> {
        self.stdout = None;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| StudioError::local(format!("failed to wait for the video decoder: {e}")))?;
        let stderr = self
            .stderr
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(StudioError::local(format!(
                "video decode failed for '{}' ({status}): {}",
                self.src,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegClipDecoder {
    fn drop(&mut self) {
        self.close();
    }
}

impl ClipDecoder for FfmpegClipDecoder {
    fn probe(&mut self, src: &str) -> StudioResult<ClipInfo> {
        self.tools.probe(src)
    }

    fn open(&mut self, src: &str, fps: u32) -> StudioResult<ClipInfo> {
        self.close();
        let info = self.tools.probe(src)?;
        let mut child = self
            .tools
            .ffmpeg()
            .arg("-i")
            .arg(src)
            .args(["-an", "-vf", &format!("fps={fps}"), "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| StudioError::local(format!("failed to start video decoder: {e}")))?;
        self.stdout = child.stdout.take();
        self.stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });
        self.child = Some(child);
        self.src = src.to_string();
        self.frame = (info.width, info.height);
        log::debug!("Decoding {} ({}x{})", src, info.width, info.height);
        Ok(info)
    }

    fn next_frame(&mut self) -> StudioResult<Option<Surface>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };
        let (w, h) = self.frame;
        let mut buf = vec![0u8; w as usize * h as usize * 4];
        match stdout.read_exact(&mut buf) {
            Ok(()) => Surface::from_rgba(w, h, &buf).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.finish_clip()?;
                Ok(None)
            }
            Err(e) => Err(StudioError::local(format!("video decode failed for '{}': {e}", self.src))),
        }
    }

    fn take_audio(&mut self) -> StudioResult<Vec<f32>> {
        self.tools.decode_audio(&self.src)
    }
}

/// Encodes frames through `ffmpeg` into a temporary file, then muxes the
/// collected audio in when finished.
pub struct FfmpegRecorder {
    tools: FfmpegTools,
    workdir: Option<tempfile::TempDir>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    audio: Option<BufWriter<std::fs::File>>,
    audio_samples: u64,
    codec: ExportCodec,
}

impl FfmpegRecorder {
    pub fn new(tools: FfmpegTools) -> Self {
        Self {
            tools,
            workdir: None,
            child: None,
            stdin: None,
            audio: None,
            audio_samples: 0,
            codec: ExportCodec::DefaultWebm,
        }
    }

    fn video_args(codec: ExportCodec) -> &'static [&'static str] {
        match codec {
            ExportCodec::H264Mp4 => &["-c:v", "libx264", "-pix_fmt", "yuv420p", "-crf", "20", "-movflags", "+faststart"],
            ExportCodec::Vp9Webm => &["-c:v", "libvpx-vp9", "-pix_fmt", "yuv420p", "-b:v", "0", "-crf", "32"],
            ExportCodec::Vp8Webm => &["-c:v", "libvpx", "-pix_fmt", "yuv420p", "-b:v", "4M"],
            ExportCodec::DefaultWebm => &["-f", "webm"],
        }
    }

    fn audio_codec(codec: ExportCodec) -> &'static str {
        match codec {
            ExportCodec::H264Mp4 => "aac",
            _ => "libopus",
        }
    }

    fn paths(&self) -> StudioResult<(PathBuf, PathBuf)> {
        let dir = self
            .workdir
            .as_ref()
            .ok_or_else(|| StudioError::local("recorder not started"))?;
        Ok((
            dir.path().join(format!("video.{}", self.codec.extension())),
            dir.path().join("audio.f32"),
        ))
    }

    fn wait_encoder(&mut self) -> StudioResult<()> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Err(StudioError::local("recorder not started"));
        };
        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        let status = child
            .wait()
            .map_err(|e| StudioError::local(format!("failed to wait for the encoder: {e}")))?;
        if !status.success() {
            return Err(StudioError::local(format!("encoder failed: {}", stderr.trim())));
        }
        Ok(())
    }
}

impl MovieRecorder for FfmpegRecorder {
    fn start(&mut self, width: u32, height: u32, fps: u32, codec: ExportCodec) -> StudioResult<()> {
        let workdir =
            tempfile::tempdir().map_err(|e| StudioError::local(format!("failed to create a temp directory: {e}")))?;
        self.codec = codec;
        self.workdir = Some(workdir);
        let (video_path, audio_path) = self.paths()?;

        let audio = std::fs::File::create(&audio_path)
            .map_err(|e| StudioError::local(format!("failed to create audio buffer: {e}")))?;
        let mut child = self
            .tools
            .ffmpeg()
            .args(["-y", "-f", "rawvideo", "-pix_fmt", "rgba", "-s", &format!("{width}x{height}")])
            .args(["-r", &fps.to_string(), "-i", "pipe:0", "-an"])
            .args(Self::video_args(codec))
            .arg(&video_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| StudioError::local(format!("failed to start the encoder (is ffmpeg installed?): {e}")))?;
        self.stdin = child.stdin.take();
        self.child = Some(child);
        self.audio = Some(BufWriter::new(audio));
        self.audio_samples = 0;
        Ok(())
    }

    fn write_frame(&mut self, frame: &Surface) -> StudioResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| StudioError::local("recorder not started"))?;
        stdin
            .write_all(&frame.to_rgba())
            .map_err(|e| StudioError::local(format!("failed to write frame to the encoder: {e}")))
    }

    fn write_audio(&mut self, samples: &[f32]) -> StudioResult<()> {
        let audio = self
            .audio
            .as_mut()
            .ok_or_else(|| StudioError::local("recorder not started"))?;
        for s in samples {
            audio
                .write_all(&s.to_le_bytes())
                .map_err(|e| StudioError::local(format!("failed to buffer audio: {e}")))?;
        }
        self.audio_samples += samples.len() as u64;
        Ok(())
    }

    fn finish(&mut self, output: &Path) -> StudioResult<()> {
        self.wait_encoder()?;
        if let Some(mut audio) = self.audio.take() {
            audio
                .flush()
                .map_err(|e| StudioError::local(format!("failed to flush audio: {e}")))?;
        }
        let (video_path, audio_path) = self.paths()?;

        if self.audio_samples == 0 {
            std::fs::copy(&video_path, output)
                .map_err(|e| StudioError::local(format!("failed to write {}: {e}", output.display())))?;
        } else {
            let out = self
                .tools
                .ffmpeg()
                .arg("-y")
                .arg("-i")
                .arg(&video_path)
                .args([
                    "-f",
                    "f32le",
                    "-ar",
                    &AUDIO_SAMPLE_RATE.to_string(),
                    "-ac",
                    &AUDIO_CHANNELS.to_string(),
                    "-i",
                ])
                .arg(&audio_path)
                .args(["-c:v", "copy", "-c:a", Self::audio_codec(self.codec), "-shortest"])
                .arg(output)
                .output()
                .map_err(|e| StudioError::local(format!("failed to run ffmpeg for muxing: {e}")))?;
            if !out.status.success() {
                let _ = std::fs::remove_file(output);
                return Err(StudioError::local(format!(
                    "muxing failed: {}",
                    String::from_utf8_lossy(&out.stderr).trim()
                )));
            }
        }
        self.workdir = None;
        Ok(())
    }

    fn abort(&mut self) {
        self.stdin = None;
        self.audio = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.workdir = None;
        log::info!("Recording aborted");
    }
}

/// Grabs the final frame of a clip as PNG.
pub struct FfmpegFrameExtractor {
    tools: FfmpegTools,
}

impl FfmpegFrameExtractor {
    pub fn new(tools: FfmpegTools) -> Self {
        Self { tools }
    }
}

impl FrameExtractor for FfmpegFrameExtractor {
    fn last_frame(&self, video: &str) -> StudioResult<Vec<u8>> {
        let file = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .map_err(|e| StudioError::local(format!("failed to create a temp file: {e}")))?;
        // Seek close to the end and keep overwriting one image; the last
        // write is the final frame.
        let out = self
            .tools
            .ffmpeg()
            .args(["-y", "-sseof", "-1", "-i", video, "-update", "1", "-c:v", "png"])
            .arg(file.path())
            .output()
            .map_err(|e| StudioError::local(format!("failed to run ffmpeg for frame extraction: {e}")))?;
        if !out.status.success() {
            return Err(StudioError::local(format!(
                "frame extraction failed for '{video}': {}",
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        let bytes = std::fs::read(file.path())
            .map_err(|e| StudioError::local(format!("failed to read extracted frame: {e}")))?;
        if bytes.is_empty() {
            return Err(StudioError::local(format!("no frame could be extracted from '{video}'")));
        }
        Ok(bytes)
    }
}
