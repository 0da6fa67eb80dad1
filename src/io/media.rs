// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Media source loading (files, URLs and data URLs).
//!
//! Layer and frame sources are plain strings: a filesystem path, an
//! `http(s)://` URL or a `data:` URL with base64 content.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Read;
use std::path::Path;

/// Largest remote download accepted, in bytes.
const MAX_DOWNLOAD_BYTES: u64 = 512 * 1024 * 1024;

/// Decoded image ready for display.
pub struct LoadedImage {
    pub width: u32,
    pub height: u32,
    /// Straight RGBA8 pixels.
    pub pixels: Vec<u8>,
}

/// Load an image file from disk.
pub fn load_image(path: &Path) -> Result<LoadedImage> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    decode_image(&bytes)
}

/// Decode encoded image bytes to RGBA.
pub fn decode_image(bytes: &[u8]) -> Result<LoadedImage> {
    let img = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = img.dimensions();
    Ok(LoadedImage {
        width,
        height,
        pixels: img.into_raw(),
    })
}

/// Natural pixel size of an encoded image without keeping the pixels.
pub fn image_size(bytes: &[u8]) -> Result<(u32, u32)> {
    let img = image::load_from_memory(bytes)?;
    Ok((img.width(), img.height()))
}

pub fn is_remote(src: &str) -> bool {
    src.starts_with("http://") || src.starts_with("https://")
}

/// Read the bytes behind a source string.
pub fn load_source_bytes(src: &str) -> Result<Vec<u8>> {
    if let Some(rest) = src.strip_prefix("data:") {
        let (_, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| anyhow!("unsupported data URL (expected base64)"))?;
        return Ok(STANDARD.decode(payload.trim())?);
    }

    if is_remote(src) {
        let resp = ureq::get(src)
            .call()
            .with_context(|| format!("failed to download {src}"))?;
        let mut bytes = Vec::new();
        resp.into_reader()
            .take(MAX_DOWNLOAD_BYTES)
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read body of {src}"))?;
        return Ok(bytes);
    }

    std::fs::read(src).with_context(|| format!("failed to read {src}"))
}

/// Plain base64 of a byte slice, as the generation service expects.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn from_base64(text: &str) -> Result<Vec<u8>> {
    let payload = match text.split_once(";base64,") {
        Some((_, payload)) => payload,
        None => text,
    };
    Ok(STANDARD.decode(payload.trim())?)
}

/// Guess whether a source refers to a video by its extension.
pub fn looks_like_video(src: &str) -> bool {
    let lower = src.to_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or(&lower);
    [".mp4", ".webm", ".mov", ".mkv", ".m4v"]
        .iter()
        .any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url_roundtrip() {
        let url = format!("data:text/plain;base64,{}", to_base64(b"hello"));
        assert_eq!(url, "data:text/plain;base64,aGVsbG8=");
        assert_eq!(load_source_bytes(&url).unwrap(), b"hello");
        assert_eq!(from_base64(&url).unwrap(), b"hello");
        assert_eq!(from_base64("aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        assert_eq!(load_source_bytes(path.to_str().unwrap()).unwrap(), vec![1, 2, 3]);
        assert!(load_source_bytes(dir.path().join("missing").to_str().unwrap()).is_err());
    }

    #[test]
    fn test_video_detection() {
        assert!(looks_like_video("https://cdn.example.com/clip.MP4?token=1"));
        assert!(looks_like_video("/tmp/out.webm"));
        assert!(!looks_like_video("/tmp/out.png"));
    }
}
