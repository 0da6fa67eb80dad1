// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Geometric utility functions.
//!
//! This module provides bounding boxes, centroids, aspect-ratio matching,
//! conversions between a layer's pixel space and world space, and the
//! fit/fill math used by the renderers.

use crate::models::shapes::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Aspect ratios accepted by the remote generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "9:16")]
    Tall,
    #[serde(rename = "16:9")]
    Wide,
}

impl AspectRatio {
    /// Fixed matching order. Ties resolve to the earlier entry.
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Portrait,
        AspectRatio::Landscape,
        AspectRatio::Tall,
        AspectRatio::Wide,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Tall => "9:16",
            AspectRatio::Wide => "16:9",
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            AspectRatio::Square => 1.0,
            AspectRatio::Portrait => 3.0 / 4.0,
            AspectRatio::Landscape => 4.0 / 3.0,
            AspectRatio::Tall => 9.0 / 16.0,
            AspectRatio::Wide => 16.0 / 9.0,
        }
    }

    /// Nearest ratio by absolute difference of the ratio value.
    pub fn nearest(ratio: f64) -> AspectRatio {
        let mut best = AspectRatio::ALL[0];
        let mut best_diff = f64::INFINITY;
        for candidate in AspectRatio::ALL {
            let diff = (candidate.value() - ratio).abs();
            if diff < best_diff {
                best = candidate;
                best_diff = diff;
            }
        }
        best
    }
}

/// A resolution option the selection tool snaps to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectOption {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub ratio: f64,
}

impl AspectOption {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            ratio: width as f64 / height as f64,
        }
    }
}

/// Resolution options offered by the default image model.
pub fn default_aspect_options() -> Vec<AspectOption> {
    vec![
        AspectOption::new("1:1", 1024, 1024),
        AspectOption::new("3:4", 896, 1200),
        AspectOption::new("4:3", 1200, 896),
        AspectOption::new("9:16", 768, 1365),
        AspectOption::new("16:9", 1365, 768),
    ]
}

/// Pick the option whose ratio is closest to `ratio`.
///
/// Returns `None` only when `options` is empty.
pub fn closest_aspect_ratio(ratio: f64, options: &[AspectOption]) -> Option<&AspectOption> {
    options.iter().fold(None, |best: Option<&AspectOption>, candidate| match best {
        Some(b) if (b.ratio - ratio).abs() <= (candidate.ratio - ratio).abs() => Some(b),
        _ => Some(candidate),
    })
}

/// Build the selection rectangle for a drag from `anchor` to `current`,
/// snapped to the nearest aspect option.
///
/// The rectangle grows away from the anchor in the drag direction. A drag
/// with a zero-length side is returned unsnapped so the caller can discard it.
pub fn snap_selection(anchor: Point, current: Point, options: &[AspectOption]) -> Rect {
    let raw_w = (current.x - anchor.x).abs();
    let raw_h = (current.y - anchor.y).abs();

    let (w, h) = match closest_aspect_ratio(raw_w / raw_h.max(f64::EPSILON), options) {
        Some(matched) if raw_w > f64::EPSILON && raw_h > f64::EPSILON => {
            let raw_ratio = raw_w / raw_h;
            if raw_ratio > matched.ratio {
                (raw_h * matched.ratio, raw_h)
            } else {
                (raw_w, raw_w / matched.ratio)
            }
        }
        _ => (raw_w, raw_h),
    };

    let x = if current.x < anchor.x { anchor.x - w } else { anchor.x };
    let y = if current.y < anchor.y { anchor.y - h } else { anchor.y };
    Rect::new(x, y, w, h)
}

/// Axis-aligned bounding box of a point set.
pub fn bounding_box(points: &[Point]) -> Option<Rect> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
}

/// Vertex average of a point set.
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point::new(sx / n, sy / n))
}

/// Convert a pixel coordinate inside an image of `width`×`height` pixels to
/// world coordinates, given where the image is placed in the world.
pub fn pixel_to_world(pixel_x: f64, pixel_y: f64, width: u32, height: u32, placed: &Rect) -> Point {
    Point {
        x: placed.x + pixel_x / width as f64 * placed.w,
        y: placed.y + pixel_y / height as f64 * placed.h,
    }
}

/// Convert a world coordinate to pixel coordinates of an image placed at `placed`.
pub fn world_to_pixel(point: &Point, width: u32, height: u32, placed: &Rect) -> (f64, f64) {
    (
        (point.x - placed.x) / placed.w * width as f64,
        (point.y - placed.y) / placed.h * height as f64,
    )
}

/// Scale and offset that make a `src_w`×`src_h` image cover a
/// `dst_w`×`dst_h` area, centered. Returns `(scale, dx, dy)`.
pub fn cover_fit(src_w: f64, src_h: f64, dst_w: f64, dst_h: f64) -> (f64, f64, f64) {
    let scale = (dst_w / src_w).max(dst_h / src_h);
    let dx = (dst_w - src_w * scale) / 2.0;
    let dy = (dst_h - src_h * scale) / 2.0;
    (scale, dx, dy)
}

/// Dimensions that bring `width`×`height` up (or down) to roughly
/// `pixel_budget` pixels with the longer side capped at `max_side`,
/// keeping the aspect ratio.
pub fn fit_pixel_budget(width: u32, height: u32, pixel_budget: f64, max_side: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    let aspect = width as f64 / height as f64;
    let mut h = (pixel_budget / aspect).sqrt();
    let mut w = h * aspect;
    let longest = w.max(h);
    if longest > max_side as f64 {
        let k = max_side as f64 / longest;
        w *= k;
        h *= k;
    }
    (w.round().max(1.0) as u32, h.round().max(1.0) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_world_roundtrip() {
        let placed = Rect::new(100.0, -50.0, 960.0, 540.0);
        let world = pixel_to_world(960.0, 540.0, 1920, 1080, &placed);
        assert!((world.x - 580.0).abs() < 0.0001);
        assert!((world.y - 220.0).abs() < 0.0001);

        let (px, py) = world_to_pixel(&world, 1920, 1080, &placed);
        assert!((px - 960.0).abs() < 0.0001);
        assert!((py - 540.0).abs() < 0.0001);
    }

    #[test]
    fn test_closest_aspect_ratio() {
        let options = default_aspect_options();
        assert_eq!(closest_aspect_ratio(1.0, &options).unwrap().label, "1:1");
        assert_eq!(closest_aspect_ratio(1.78, &options).unwrap().label, "16:9");
        assert_eq!(closest_aspect_ratio(0.5, &options).unwrap().label, "9:16");
        assert!(closest_aspect_ratio(1.0, &[]).is_none());
    }

    #[test]
    fn test_nearest_request_ratio() {
        assert_eq!(AspectRatio::nearest(1.0), AspectRatio::Square);
        assert_eq!(AspectRatio::nearest(2.5), AspectRatio::Wide);
        assert_eq!(AspectRatio::nearest(0.74), AspectRatio::Portrait);
        assert_eq!(AspectRatio::nearest(0.5), AspectRatio::Tall);
    }

    #[test]
    fn test_snap_selection_wide_drag() {
        let options = vec![AspectOption::new("1:1", 1024, 1024), AspectOption::new("16:9", 1920, 1080)];
        let rect = snap_selection(Point::new(0.0, 0.0), Point::new(300.0, 150.0), &options);
        assert!((rect.w / rect.h - 16.0 / 9.0).abs() < 1e-9);
        assert!(rect.w <= 300.0 + 1e-9 && rect.h <= 150.0 + 1e-9);
    }

    #[test]
    fn test_snap_selection_mirrors_anchor() {
        let options = default_aspect_options();
        let rect = snap_selection(Point::new(100.0, 100.0), Point::new(0.0, 0.0), &options);
        assert!((rect.w - 100.0).abs() < 1e-9);
        assert!((rect.x + rect.w - 100.0).abs() < 1e-9);
        assert!((rect.y + rect.h - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounding_box_and_centroid() {
        let pts = [Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 20.0), Point::new(0.0, 20.0)];
        assert_eq!(bounding_box(&pts), Some(Rect::new(0.0, 0.0, 10.0, 20.0)));
        assert_eq!(centroid(&pts), Some(Point::new(5.0, 10.0)));
        assert!(bounding_box(&[]).is_none());
    }

    #[test]
    fn test_cover_fit_centers() {
        let (scale, dx, dy) = cover_fit(1280.0, 720.0, 1080.0, 1080.0);
        assert!((scale - 1.5).abs() < 1e-9);
        assert!((dx - (1080.0 - 1920.0) / 2.0).abs() < 1e-9);
        assert!(dy.abs() < 1e-9);
    }

    #[test]
    fn test_fit_pixel_budget_caps_long_side() {
        let (w, h) = fit_pixel_budget(3000, 1000, 8_000_000.0, 4096);
        assert_eq!((w, h), (4096, 1365));

        let (w, h) = fit_pixel_budget(1600, 900, 8_000_000.0, 4096);
        assert_eq!((w, h), (3771, 2121));

        let (w, h) = fit_pixel_budget(1000, 1000, 8_000_000.0, 4096);
        assert_eq!((w, h), (2828, 2828));
    }
}
