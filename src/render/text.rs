// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Label text measurement, word wrapping and glyph rasterization.
//!
//! Glyphs come from a TTF/OTF font loaded at startup. Without a usable font
//! the renderer still measures text with fixed advance estimates so layout
//! stays stable, but draws no glyphs.

use super::surface::{Rgba, Surface};
use fontdue::{Font, FontSettings};
use std::path::{Path, PathBuf};

/// Fonts tried when no font path is configured.
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Advance estimate per character, as a fraction of the font size.
const FALLBACK_ADVANCE: f32 = 0.55;
/// Line height as a multiple of the font size when the font gives none.
const FALLBACK_LINE_HEIGHT: f32 = 1.25;

pub struct TextRenderer {
    font: Option<Font>,
}

impl std::fmt::Debug for TextRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRenderer")
            .field("has_font", &self.font.is_some())
            .finish()
    }
}

impl TextRenderer {
    /// Load the configured font, falling back to common system fonts.
    pub fn load(configured: Option<&Path>) -> Self {
        let candidates = configured
            .map(Path::to_path_buf)
            .into_iter()
            .chain(SYSTEM_FONT_CANDIDATES.iter().map(PathBuf::from));

        for path in candidates {
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            match Font::from_bytes(bytes, FontSettings::default()) {
                Ok(font) => {
                    log::info!("Loaded label font {}", path.display());
                    return Self { font: Some(font) };
                }
                Err(e) => log::warn!("Failed to parse font {}: {}", path.display(), e),
            }
        }

        log::warn!("No label font found; zone labels will be drawn without text");
        Self::without_font()
    }

    /// A renderer that only measures.
    pub fn without_font() -> Self {
        Self { font: None }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn line_height(&self, size: f32) -> f32 {
        self.font
            .as_ref()
            .and_then(|f| f.horizontal_line_metrics(size))
            .map(|m| m.new_line_size)
            .unwrap_or(size * FALLBACK_LINE_HEIGHT)
    }

    fn ascent(&self, size: f32) -> f32 {
        self.font
            .as_ref()
            .and_then(|f| f.horizontal_line_metrics(size))
            .map(|m| m.ascent)
            .unwrap_or(size)
    }

    /// Width of a single line in pixels.
    pub fn measure(&self, text: &str, size: f32) -> f32 {
        match &self.font {
            Some(font) => text.chars().map(|ch| font.metrics(ch, size).advance_width).sum(),
            None => text.chars().count() as f32 * size * FALLBACK_ADVANCE,
        }
    }

    /// Greedy word wrap to `max_width`. Words wider than the limit get a
    /// line of their own.
    pub fn wrap(&self, text: &str, size: f32, max_width: f32) -> Vec<String> {
        let mut lines = Vec::new();
        for paragraph in text.lines() {
            let mut current = String::new();
            for word in paragraph.split_whitespace() {
                let candidate = if current.is_empty() {
                    word.to_string()
                } else {
                    format!("{current} {word}")
                };
                if !current.is_empty() && self.measure(&candidate, size) > max_width {
                    lines.push(std::mem::take(&mut current));
                    current = word.to_string();
                } else {
                    current = candidate;
                }
            }
            if !current.is_empty() {
                lines.push(current);
            }
        }
        lines
    }

    /// Draw one line with its top-left corner at `(x, top)`.
    pub fn draw_line(&self, surface: &mut Surface, text: &str, x: f32, top: f32, size: f32, color: Rgba) {
        let Some(font) = &self.font else {
            return;
        };
        let baseline = top + self.ascent(size);
        let mut pen_x = x;
        for ch in text.chars() {
            let (metrics, coverage) = font.rasterize(ch, size);
            let gx = (pen_x + metrics.xmin as f32).round() as i32;
            let gy = (baseline - metrics.height as f32 - metrics.ymin as f32).round() as i32;
            for row in 0..metrics.height {
                for col in 0..metrics.width {
                    let c = coverage[row * metrics.width + col];
                    if c > 0 {
                        surface.blend_coverage(gx + col as i32, gy + row as i32, c, color);
                    }
                }
            }
            pen_x += metrics.advance_width;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_respects_width() {
        let text = TextRenderer::without_font();
        let size = 20.0;
        let max_width = size * FALLBACK_ADVANCE * 11.5;
        let lines = text.wrap("alpha beta gamma delta", size, max_width);
        assert_eq!(lines, vec!["alpha beta", "gamma delta"]);
        for line in &lines {
            assert!(text.measure(line, size) <= max_width);
        }
    }

    #[test]
    fn test_long_word_gets_own_line() {
        let text = TextRenderer::without_font();
        let lines = text.wrap("a supercalifragilistic b", 10.0, 30.0);
        assert_eq!(lines, vec!["a", "supercalifragilistic", "b"]);
    }

    #[test]
    fn test_empty_text_has_no_lines() {
        let text = TextRenderer::without_font();
        assert!(text.wrap("   ", 12.0, 100.0).is_empty());
        assert_eq!(text.line_height(20.0), 25.0);
    }
}
