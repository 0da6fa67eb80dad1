// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Layer data structures.
//!
//! A layer is one placed image, generation result or video on the canvas.
//! The order of the layer list is the z-order, index 0 being topmost.

use super::shapes::{Point, Rect};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of content a layer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Image,
    Generation,
    Video,
}

/// How layer content maps onto the layer bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Scale to fill and crop the overflow, keeping the aspect ratio.
    #[default]
    Cover,
    /// Stretch to the bounds exactly.
    Fill,
}

/// Source polygon of a zone layer, kept so it can be re-rasterized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecorData {
    pub points: Vec<Point>,
    pub label: String,
    pub font_size: f32,
}

/// A canvas layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: Uuid,
    pub name: String,
    pub visible: bool,
    pub locked: bool,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    /// File path, http(s) URL or `data:` URL of the content.
    pub src: String,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub initial_x: f64,
    pub initial_y: f64,
    pub initial_w: f64,
    pub initial_h: f64,
    /// Edge softening in percent, 0 to 100.
    #[serde(default)]
    pub feather: f32,
    #[serde(default)]
    pub render_mode: RenderMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_playing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decor_data: Option<DecorData>,
}

impl Layer {
    /// Create a layer placed at `bounds`; the bounds are also recorded as
    /// the reset geometry.
    pub fn new(name: impl Into<String>, kind: LayerKind, src: impl Into<String>, bounds: Rect) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            visible: true,
            locked: false,
            kind,
            src: src.into(),
            x: bounds.x,
            y: bounds.y,
            w: bounds.w,
            h: bounds.h,
            initial_x: bounds.x,
            initial_y: bounds.y,
            initial_w: bounds.w,
            initial_h: bounds.h,
            feather: 0.0,
            render_mode: RenderMode::default(),
            is_playing: (kind == LayerKind::Video).then_some(false),
            decor_data: None,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }

    pub fn contains(&self, p: Point) -> bool {
        self.bounds().contains(p)
    }

    /// Restore the geometry captured at creation.
    pub fn reset_geometry(&mut self) {
        self.x = self.initial_x;
        self.y = self.initial_y;
        self.w = self.initial_w;
        self.h = self.initial_h;
    }

    pub fn set_feather(&mut self, feather: f32) {
        self.feather = feather.clamp(0.0, 100.0);
    }

    pub fn is_video(&self) -> bool {
        self.kind == LayerKind::Video
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_layer_snapshots_initial_geometry() {
        let mut layer = Layer::new("a", LayerKind::Image, "a.png", Rect::new(1.0, 2.0, 3.0, 4.0));
        layer.x = 50.0;
        layer.w = 9.0;
        layer.reset_geometry();
        assert_eq!(layer.bounds(), Rect::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(layer.is_playing, None);
    }

    #[test]
    fn test_feather_is_clamped() {
        let mut layer = Layer::new("v", LayerKind::Video, "v.mp4", Rect::default());
        layer.set_feather(140.0);
        assert_eq!(layer.feather, 100.0);
        assert_eq!(layer.is_playing, Some(false));
    }

    #[test]
    fn test_serialized_field_names() {
        let layer = Layer::new("a", LayerKind::Generation, "a.png", Rect::new(0.0, 0.0, 10.0, 10.0));
        let json = serde_json::to_value(&layer).unwrap();
        assert_eq!(json["type"], "generation");
        assert_eq!(json["renderMode"], "cover");
        assert!(json.get("initialX").is_some());
    }
}
