// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! World-to-screen transform of the canvas.
//!
//! `screen = world * zoom + offset`. Hit-testing always goes through the
//! inverse, [`Viewport::screen_to_world`].

use crate::models::shapes::Point;
use serde::{Deserialize, Serialize};

pub const MIN_ZOOM: f64 = 0.05;
pub const MAX_ZOOM: f64 = 5.0;
/// Below this the transform is treated as collapsed and gestures are ignored.
pub const DEGENERATE_ZOOM: f64 = 1e-6;

/// Pan/zoom state of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub zoom: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

impl Viewport {
    pub fn world_to_screen(&self, p: Point) -> Point {
        Point::new(p.x * self.zoom + self.offset_x, p.y * self.zoom + self.offset_y)
    }

    pub fn screen_to_world(&self, p: Point) -> Point {
        Point::new((p.x - self.offset_x) / self.zoom, (p.y - self.offset_y) / self.zoom)
    }

    pub fn is_degenerate(&self) -> bool {
        !self.zoom.is_finite() || self.zoom.abs() < DEGENERATE_ZOOM
    }

    /// Shift by a raw screen-space delta.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.offset_x += dx;
        self.offset_y += dy;
    }

    /// Set a new zoom (clamped) while keeping the world point under
    /// `screen_pt` fixed on screen.
    pub fn zoom_at(&mut self, screen_pt: Point, new_zoom: f64) {
        if self.is_degenerate() {
            return;
        }
        let anchor = self.screen_to_world(screen_pt);
        self.zoom = new_zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        self.offset_x = screen_pt.x - anchor.x * self.zoom;
        self.offset_y = screen_pt.y - anchor.y * self.zoom;
    }

    /// Multiply the zoom by `factor` around `screen_pt`.
    pub fn scale_at(&mut self, screen_pt: Point, factor: f64) {
        self.zoom_at(screen_pt, self.zoom * factor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let vp = Viewport {
            zoom: 2.5,
            offset_x: -40.0,
            offset_y: 17.0,
        };
        let p = Point::new(123.0, -8.0);
        let back = vp.screen_to_world(vp.world_to_screen(p));
        assert!((back.x - p.x).abs() < 1e-9);
        assert!((back.y - p.y).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_at_keeps_anchor_and_clamps() {
        let mut vp = Viewport::default();
        let cursor = Point::new(300.0, 200.0);
        let before = vp.screen_to_world(cursor);
        vp.scale_at(cursor, 1e9);
        assert_eq!(vp.zoom, MAX_ZOOM);
        let after = vp.world_to_screen(before);
        assert!((after.x - cursor.x).abs() < 1e-6);
        assert!((after.y - cursor.y).abs() < 1e-6);

        vp.scale_at(cursor, 1e-9);
        assert_eq!(vp.zoom, MIN_ZOOM);
    }

    #[test]
    fn test_degenerate_zoom_is_ignored() {
        let mut vp = Viewport {
            zoom: 0.0,
            offset_x: 1.0,
            offset_y: 2.0,
        };
        vp.zoom_at(Point::new(5.0, 5.0), 2.0);
        assert_eq!(vp.zoom, 0.0);
        assert!(vp.is_degenerate());
    }
}
