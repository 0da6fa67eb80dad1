// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Polygon zone tool.
//!
//! Clicks accumulate world-space vertices. A closed polygon is rasterized
//! together with a pill-shaped label into a single generation layer. The
//! polygon, label and font size stay on the layer so the label can be edited
//! later without redrawing the shape.

use crate::error::{StudioError, StudioResult};
use crate::models::layer::{DecorData, Layer, LayerKind, RenderMode};
use crate::models::shapes::{Point, Rect};
use crate::render::assets::AssetCache;
use crate::render::surface::{Rgba, Surface};
use crate::render::text::TextRenderer;
use crate::util::geometry;

/// A click this close (world units) to the first vertex closes the polygon.
pub const CLOSE_DISTANCE: f64 = 15.0;
/// Minimum vertices for a closed zone.
pub const MIN_VERTICES: usize = 3;
/// Padding kept around the polygon on every side of the raster.
pub const BASE_PADDING: f64 = 20.0;
pub const DEFAULT_FONT_SIZE: f32 = 18.0;
pub const DEFAULT_LABEL: &str = "Zone";

const FILL: Rgba = Rgba(59, 130, 246, 64);
const STROKE: Rgba = Rgba(59, 130, 246, 255);
const STROKE_WIDTH: f32 = 3.0;
const DOT_RADIUS: f32 = 5.0;
const PILL_BACKGROUND: Rgba = Rgba(17, 24, 39, 220);
/// Minimum wrap width for label text, in font sizes.
const MIN_WRAP_EMS: f32 = 8.0;

/// In-progress polygon and the label settings applied on close.
#[derive(Debug, Clone)]
pub struct PolygonTool {
    points: Vec<Point>,
    pub label: String,
    pub font_size: f32,
}

impl Default for PolygonTool {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            label: DEFAULT_LABEL.to_string(),
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

impl PolygonTool {
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Add a vertex. Returns the closed polygon when the click lands near
    /// the first vertex of a polygon that already has enough vertices.
    pub fn add_point(&mut self, p: Point) -> Option<Vec<Point>> {
        if let Some(first) = self.points.first() {
            if self.points.len() >= MIN_VERTICES && first.distance(p) <= CLOSE_DISTANCE {
                return self.close();
            }
        }
        self.points.push(p);
        None
    }

    /// Close explicitly (Enter).
    pub fn close(&mut self) -> Option<Vec<Point>> {
        if self.points.len() < MIN_VERTICES {
            return None;
        }
        Some(std::mem::take(&mut self.points))
    }

    /// Discard everything (Escape).
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Drop the last vertex (Backspace).
    pub fn undo_point(&mut self) -> Option<Point> {
        self.points.pop()
    }
}

/// A rasterized zone and where it sits in the world.
#[derive(Debug)]
pub struct ZoneRaster {
    pub surface: Surface,
    pub bounds: Rect,
}

struct Pill {
    lines: Vec<String>,
    rect: Rect,
    line_height: f64,
    padding_x: f64,
    padding_y: f64,
}

fn layout_pill(text: &TextRenderer, label: &str, font_size: f32, polygon_box: &Rect, center: Point) -> Option<Pill> {
    let wrap_width = (polygon_box.w as f32).max(font_size * MIN_WRAP_EMS);
    let lines = text.wrap(label, font_size, wrap_width);
    if lines.is_empty() {
        return None;
    }
    let line_height = text.line_height(font_size) as f64;
    let padding_x = font_size as f64 * 0.8;
    let padding_y = font_size as f64 * 0.4;
    let text_w = lines
        .iter()
        .map(|l| text.measure(l, font_size) as f64)
        .fold(0.0, f64::max);
    let w = text_w + 2.0 * padding_x;
    let h = line_height * lines.len() as f64 + 2.0 * padding_y;
    Some(Pill {
        lines,
        rect: Rect::new(center.x - w / 2.0, center.y - h / 2.0, w, h),
        line_height,
        padding_x,
        padding_y,
    })
}

/// Rasterize a closed polygon with its label.
pub fn rasterize_zone(points: &[Point], label: &str, font_size: f32, text: &TextRenderer) -> StudioResult<ZoneRaster> {
    if points.len() < MIN_VERTICES {
        return Err(StudioError::validation("a zone needs at least three points"));
    }
    let (Some(bbox), Some(center)) = (geometry::bounding_box(points), geometry::centroid(points)) else {
        return Err(StudioError::validation("a zone needs at least three points"));
    };
    let pill = layout_pill(text, label, font_size, &bbox, center);

    let (mut left, mut top, mut right, mut bottom) = (BASE_PADDING, BASE_PADDING, BASE_PADDING, BASE_PADDING);
    if let Some(pill) = &pill {
        left = left.max(bbox.x - pill.rect.x);
        top = top.max(bbox.y - pill.rect.y);
        right = right.max(pill.rect.right() - bbox.right());
        bottom = bottom.max(pill.rect.bottom() - bbox.bottom());
    }
    let bounds = Rect::new(bbox.x - left, bbox.y - top, bbox.w + left + right, bbox.h + top + bottom);

    let mut surface = Surface::new(bounds.w.ceil() as u32, bounds.h.ceil() as u32)?;
    let local: Vec<Point> = points
        .iter()
        .map(|p| Point::new(p.x - bounds.x, p.y - bounds.y))
        .collect();
    surface.fill_polygon(&local, FILL);
    surface.stroke_polygon(&local, STROKE, STROKE_WIDTH);
    for p in &local {
        surface.fill_circle(*p, DOT_RADIUS, Rgba::WHITE);
        surface.fill_circle(*p, DOT_RADIUS - 2.0, STROKE);
    }

    if let Some(pill) = pill {
        let rect = pill.rect.translated(-bounds.x, -bounds.y);
        surface.fill_rounded_rect(rect, rect.h / 2.0, PILL_BACKGROUND);
        for (i, line) in pill.lines.iter().enumerate() {
            let line_w = text.measure(line, font_size) as f64;
            let x = rect.x + pill.padding_x + (rect.w - 2.0 * pill.padding_x - line_w) / 2.0;
            let y = rect.y + pill.padding_y + i as f64 * pill.line_height;
            text.draw_line(&mut surface, line, x as f32, y as f32, font_size, Rgba::WHITE);
        }
    }

    Ok(ZoneRaster { surface, bounds })
}

/// Rasterize a closed polygon into a new zone layer.
pub fn zone_layer(
    points: Vec<Point>,
    label: &str,
    font_size: f32,
    text: &TextRenderer,
    assets: &mut AssetCache,
) -> StudioResult<Layer> {
    let raster = rasterize_zone(&points, label, font_size, text)?;
    let src = assets.store_surface(raster.surface)?;
    let name = if label.trim().is_empty() { DEFAULT_LABEL } else { label.trim() };
    let mut layer = Layer::new(name, LayerKind::Generation, src, raster.bounds);
    layer.render_mode = RenderMode::Fill;
    layer.decor_data = Some(DecorData {
        points,
        label: label.to_string(),
        font_size,
    });
    log::info!("Created zone layer '{}'", layer.name);
    Ok(layer)
}

/// Redraw a zone layer after a label or font size change.
///
/// The layer may have been dragged since it was created, so the stored
/// polygon is shifted by the same amount before re-rasterizing.
pub fn rerasterize(
    layer: &mut Layer,
    label: &str,
    font_size: f32,
    text: &TextRenderer,
    assets: &mut AssetCache,
) -> StudioResult<()> {
    let Some(decor) = layer.decor_data.as_ref() else {
        return Err(StudioError::validation("layer is not a zone"));
    };
    let old = rasterize_zone(&decor.points, &decor.label, decor.font_size, text)?;
    let (dx, dy) = (layer.x - old.bounds.x, layer.y - old.bounds.y);
    let points: Vec<Point> = decor
        .points
        .iter()
        .map(|p| Point::new(p.x + dx, p.y + dy))
        .collect();

    let raster = rasterize_zone(&points, label, font_size, text)?;
    let src = assets.store_surface(raster.surface)?;
    assets.forget(&layer.src);
    layer.src = src;
    layer.x = raster.bounds.x;
    layer.y = raster.bounds.y;
    layer.w = raster.bounds.w;
    layer.h = raster.bounds.h;
    layer.decor_data = Some(DecorData {
        points,
        label: label.to_string(),
        font_size,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(size, 0.0),
            Point::new(size, size),
            Point::new(0.0, size),
        ]
    }

    #[test]
    fn test_click_near_first_vertex_closes() {
        let mut tool = PolygonTool::default();
        assert!(tool.add_point(Point::new(0.0, 0.0)).is_none());
        assert!(tool.add_point(Point::new(100.0, 0.0)).is_none());
        // Only two vertices: a click near the first one is just another vertex.
        assert!(tool.add_point(Point::new(5.0, 5.0)).is_none());
        assert_eq!(tool.points().len(), 3);

        let closed = tool.add_point(Point::new(10.0, 10.0)).unwrap();
        assert_eq!(closed.len(), 3);
        assert!(tool.is_empty());
    }

    #[test]
    fn test_far_click_adds_vertex() {
        let mut tool = PolygonTool::default();
        for p in square(100.0) {
            assert!(tool.add_point(p).is_none());
        }
        assert!(tool.add_point(Point::new(50.0, 20.0)).is_none());
        assert_eq!(tool.points().len(), 5);
    }

    #[test]
    fn test_keyboard_commands() {
        let mut tool = PolygonTool::default();
        tool.add_point(Point::new(0.0, 0.0));
        tool.add_point(Point::new(50.0, 0.0));
        assert!(tool.close().is_none());
        assert_eq!(tool.undo_point(), Some(Point::new(50.0, 0.0)));
        assert_eq!(tool.points().len(), 1);
        tool.clear();
        assert!(tool.is_empty());

        for p in square(50.0) {
            tool.add_point(p);
        }
        assert_eq!(tool.close().map(|p| p.len()), Some(4));
    }

    #[test]
    fn test_padding_defaults_to_base() {
        let text = TextRenderer::without_font();
        let raster = rasterize_zone(&square(200.0), "", 18.0, &text).unwrap();
        assert_eq!(raster.bounds, Rect::new(-BASE_PADDING, -BASE_PADDING, 240.0, 240.0));
        assert_eq!(raster.surface.width(), 240);
    }

    #[test]
    fn test_padding_grows_for_wide_label() {
        let text = TextRenderer::without_font();
        let label = "a very long zone label that is wider than the shape";
        let raster = rasterize_zone(&square(40.0), label, 18.0, &text).unwrap();
        assert!(raster.bounds.x < -BASE_PADDING);
        assert!(raster.bounds.right() > 40.0 + BASE_PADDING);
        // Label is centered so the overflow is symmetric.
        let left = -raster.bounds.x;
        let right = raster.bounds.right() - 40.0;
        assert!((left - right).abs() < 1e-6);
    }

    #[test]
    fn test_rerasterize_follows_moved_layer() {
        let dir = tempfile::tempdir().unwrap();
        let mut assets = AssetCache::new(dir.path());
        let text = TextRenderer::without_font();
        let mut layer = zone_layer(square(100.0), "", 18.0, &text, &mut assets).unwrap();
        layer.x += 30.0;
        layer.y -= 10.0;

        rerasterize(&mut layer, "", 24.0, &text, &mut assets).unwrap();
        let decor = layer.decor_data.as_ref().unwrap();
        assert_eq!(decor.points[0], Point::new(30.0, -10.0));
        assert_eq!(decor.font_size, 24.0);
        assert!((layer.x - (30.0 - BASE_PADDING)).abs() < 1e-9);
        assert_eq!(layer.kind, LayerKind::Generation);
    }

    #[test]
    fn test_too_few_points_rejected() {
        let text = TextRenderer::without_font();
        let err = rasterize_zone(&square(10.0)[..2], "x", 18.0, &text).unwrap_err();
        assert!(matches!(err, StudioError::Validation(_)));
    }
}
