// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! 2D drawing surface used for snapshots, zone labels and export frames.
//!
//! Wraps a premultiplied `tiny_skia::Pixmap` and exposes only the drawing
//! operations the application needs.

use crate::error::{StudioError, StudioResult};
use crate::models::layer::RenderMode;
use crate::models::shapes::{Point, Rect};
use crate::util::geometry;
use tiny_skia::{
    Color, FillRule, FilterQuality, Mask, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke,
    Transform,
};

/// Straight (non-premultiplied) RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba(pub u8, pub u8, pub u8, pub u8);

impl Rgba {
    pub const BLACK: Rgba = Rgba(0, 0, 0, 255);
    pub const WHITE: Rgba = Rgba(255, 255, 255, 255);

    fn paint(self) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color_rgba8(self.0, self.1, self.2, self.3);
        paint.anti_alias = true;
        paint
    }
}

/// An owned raster drawing target.
#[derive(Clone)]
pub struct Surface {
    pixmap: Pixmap,
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl Surface {
    /// Create a transparent surface.
    pub fn new(width: u32, height: u32) -> StudioResult<Self> {
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            StudioError::local(format!("could not create a {width}x{height} drawing surface"))
        })?;
        Ok(Self { pixmap })
    }

    /// Build a surface from straight RGBA8 pixels.
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> StudioResult<Self> {
        if rgba.len() != width as usize * height as usize * 4 {
            return Err(StudioError::local("pixel buffer does not match surface size"));
        }
        let mut surface = Self::new(width, height)?;
        for (dst, src) in surface.pixmap.data_mut().chunks_exact_mut(4).zip(rgba.chunks_exact(4)) {
            let a = src[3] as u16;
            dst[0] = mul_div255(src[0] as u16, a);
            dst[1] = mul_div255(src[1] as u16, a);
            dst[2] = mul_div255(src[2] as u16, a);
            dst[3] = src[3];
        }
        Ok(surface)
    }

    /// Decode an encoded image (PNG, JPEG, WebP, ...).
    pub fn decode(bytes: &[u8]) -> StudioResult<Self> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| StudioError::local(format!("failed to decode image: {e}")))?
            .to_rgba8();
        let (w, h) = img.dimensions();
        Self::from_rgba(w, h, img.as_raw())
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Premultiplied RGBA8 bytes.
    pub fn data(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Straight RGBA8 bytes.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixmap.data().len());
        for px in self.pixmap.data().chunks_exact(4) {
            let a = px[3];
            if a == 0 {
                out.extend_from_slice(&[0, 0, 0, 0]);
            } else {
                let un = |c: u8| ((c as u16 * 255 + a as u16 / 2) / a as u16).min(255) as u8;
                out.extend_from_slice(&[un(px[0]), un(px[1]), un(px[2]), a]);
            }
        }
        out
    }

    pub fn clear(&mut self, color: Rgba) {
        self.pixmap
            .fill(Color::from_rgba8(color.0, color.1, color.2, color.3));
    }

    /// Draw `src` into `dst` (surface pixels).
    ///
    /// `Cover` scales to fill and crops to `dst`; `Fill` stretches.
    /// `feather` (0..=100) fades the edges over that percentage of half the
    /// shorter side.
    pub fn draw_surface(&mut self, src: &Surface, dst: Rect, mode: RenderMode, feather: f32) {
        if src.width() == 0 || src.height() == 0 || dst.w <= 0.0 || dst.h <= 0.0 {
            return;
        }
        let (sw, sh) = (src.width() as f64, src.height() as f64);
        let transform = match mode {
            RenderMode::Fill => Transform::from_scale((dst.w / sw) as f32, (dst.h / sh) as f32)
                .post_translate(dst.x as f32, dst.y as f32),
            RenderMode::Cover => {
                let (scale, dx, dy) = geometry::cover_fit(sw, sh, dst.w, dst.h);
                Transform::from_scale(scale as f32, scale as f32)
                    .post_translate((dst.x + dx) as f32, (dst.y + dy) as f32)
            }
        };
        let mask = self.region_mask(dst, feather);
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        self.pixmap
            .draw_pixmap(0, 0, src.pixmap.as_ref(), &paint, transform, mask.as_ref());
    }

    /// Mask limiting drawing to `dst`, with an optional feathered edge.
    fn region_mask(&self, dst: Rect, feather: f32) -> Option<Mask> {
        let (w, h) = (self.width(), self.height());
        let mut mask = Mask::new(w, h)?;
        let ramp = (feather.clamp(0.0, 100.0) as f64 / 100.0) * dst.w.min(dst.h) / 2.0;
        let x0 = dst.x.floor().max(0.0) as u32;
        let y0 = dst.y.floor().max(0.0) as u32;
        let x1 = (dst.right().ceil().max(0.0) as u32).min(w);
        let y1 = (dst.bottom().ceil().max(0.0) as u32).min(h);
        let data = mask.data_mut();
        for y in y0..y1 {
            for x in x0..x1 {
                let (cx, cy) = (x as f64 + 0.5, y as f64 + 0.5);
                let edge = (cx - dst.x)
                    .min(dst.right() - cx)
                    .min(cy - dst.y)
                    .min(dst.bottom() - cy);
                if edge <= 0.0 {
                    continue;
                }
                let alpha = if ramp > 0.0 { (edge / ramp).min(1.0) } else { 1.0 };
                data[(y * w + x) as usize] = (alpha * 255.0).round() as u8;
            }
        }
        Some(mask)
    }

    /// Resample the whole surface to a new size.
    pub fn resampled(&self, width: u32, height: u32) -> StudioResult<Surface> {
        let mut out = Surface::new(width, height)?;
        out.draw_surface(
            self,
            Rect::new(0.0, 0.0, width as f64, height as f64),
            RenderMode::Fill,
            0.0,
        );
        Ok(out)
    }

    pub fn fill_polygon(&mut self, points: &[Point], color: Rgba) {
        if let Some(path) = polygon_path(points) {
            self.pixmap
                .fill_path(&path, &color.paint(), FillRule::Winding, Transform::identity(), None);
        }
    }

    pub fn stroke_polygon(&mut self, points: &[Point], color: Rgba, width: f32) {
        if let Some(path) = polygon_path(points) {
            let stroke = Stroke {
                width,
                ..Stroke::default()
            };
            self.pixmap
                .stroke_path(&path, &color.paint(), &stroke, Transform::identity(), None);
        }
    }

    pub fn fill_circle(&mut self, center: Point, radius: f32, color: Rgba) {
        if let Some(path) = PathBuilder::from_circle(center.x as f32, center.y as f32, radius) {
            self.pixmap
                .fill_path(&path, &color.paint(), FillRule::Winding, Transform::identity(), None);
        }
    }

    /// Fill a rectangle with rounded corners; `radius` is capped at half
    /// the shorter side, which gives a pill shape.
    pub fn fill_rounded_rect(&mut self, rect: Rect, radius: f64, color: Rgba) {
        let r = radius.min(rect.w / 2.0).min(rect.h / 2.0).max(0.0) as f32;
        let (x, y, w, h) = (rect.x as f32, rect.y as f32, rect.w as f32, rect.h as f32);
        // Cubic approximation of a quarter circle.
        let k = 0.552_284_8 * r;
        let mut pb = PathBuilder::new();
        pb.move_to(x + r, y);
        pb.line_to(x + w - r, y);
        pb.cubic_to(x + w - r + k, y, x + w, y + r - k, x + w, y + r);
        pb.line_to(x + w, y + h - r);
        pb.cubic_to(x + w, y + h - r + k, x + w - r + k, y + h, x + w - r, y + h);
        pb.line_to(x + r, y + h);
        pb.cubic_to(x + r - k, y + h, x, y + h - r + k, x, y + h - r);
        pb.line_to(x, y + r);
        pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);
        pb.close();
        if let Some(path) = pb.finish() {
            self.pixmap
                .fill_path(&path, &color.paint(), FillRule::Winding, Transform::identity(), None);
        }
    }

    /// Source-over blend of a coverage value at one pixel.
    pub(crate) fn blend_coverage(&mut self, x: i32, y: i32, coverage: u8, color: Rgba) {
        if x < 0 || y < 0 || x >= self.width() as i32 || y >= self.height() as i32 {
            return;
        }
        let sa = mul_div255(coverage as u16, color.3 as u16) as u16;
        if sa == 0 {
            return;
        }
        let idx = (y as usize * self.width() as usize + x as usize) * 4;
        let data = self.pixmap.data_mut();
        let inv = 255 - sa;
        let src = [
            mul_div255(color.0 as u16, sa),
            mul_div255(color.1 as u16, sa),
            mul_div255(color.2 as u16, sa),
            sa as u8,
        ];
        for c in 0..4 {
            data[idx + c] = (src[c] as u16 + mul_div255(data[idx + c] as u16, inv) as u16).min(255) as u8;
        }
    }

    /// Encode as PNG.
    pub fn encode_png(&self) -> StudioResult<Vec<u8>> {
        self.pixmap
            .encode_png()
            .map_err(|e| StudioError::local(format!("failed to encode PNG: {e}")))
    }
}

fn polygon_path(points: &[Point]) -> Option<tiny_skia::Path> {
    let (first, rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.x as f32, first.y as f32);
    for p in rest {
        pb.line_to(p.x as f32, p.y as f32);
    }
    pb.close();
    pb.finish()
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(s: &Surface, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * s.width() + x) * 4) as usize;
        let d = s.data();
        [d[i], d[i + 1], d[i + 2], d[i + 3]]
    }

    fn solid(w: u32, h: u32, color: [u8; 4]) -> Surface {
        let rgba: Vec<u8> = std::iter::repeat(color).take((w * h) as usize).flatten().collect();
        Surface::from_rgba(w, h, &rgba).unwrap()
    }

    #[test]
    fn test_zero_sized_surface_is_local_error() {
        assert!(matches!(Surface::new(0, 10), Err(StudioError::LocalResource(_))));
    }

    #[test]
    fn test_draw_surface_fill_and_clip() {
        let src = solid(2, 2, [255, 0, 0, 255]);
        let mut dst = Surface::new(10, 10).unwrap();
        dst.draw_surface(&src, Rect::new(2.0, 2.0, 4.0, 4.0), RenderMode::Fill, 0.0);
        assert_eq!(pixel(&dst, 3, 3), [255, 0, 0, 255]);
        assert_eq!(pixel(&dst, 8, 8)[3], 0);
    }

    #[test]
    fn test_cover_is_cropped_to_destination() {
        let src = solid(20, 10, [0, 0, 255, 255]);
        let mut dst = Surface::new(10, 10).unwrap();
        dst.draw_surface(&src, Rect::new(0.0, 0.0, 5.0, 5.0), RenderMode::Cover, 0.0);
        assert_eq!(pixel(&dst, 2, 2), [0, 0, 255, 255]);
        assert_eq!(pixel(&dst, 7, 2)[3], 0);
    }

    #[test]
    fn test_feather_fades_edges() {
        let src = solid(4, 4, [255, 255, 255, 255]);
        let mut dst = Surface::new(40, 40).unwrap();
        dst.draw_surface(&src, Rect::new(0.0, 0.0, 40.0, 40.0), RenderMode::Fill, 100.0);
        assert!(pixel(&dst, 0, 20)[3] < 40);
        assert!(pixel(&dst, 20, 20)[3] >= 240);
    }

    #[test]
    fn test_polygon_fill_and_png() {
        let mut s = Surface::new(20, 20).unwrap();
        s.fill_polygon(
            &[Point::new(0.0, 0.0), Point::new(20.0, 0.0), Point::new(20.0, 20.0), Point::new(0.0, 20.0)],
            Rgba(0, 255, 0, 255),
        );
        assert_eq!(pixel(&s, 10, 10), [0, 255, 0, 255]);
        let png = s.encode_png().unwrap();
        let back = Surface::decode(&png).unwrap();
        assert_eq!((back.width(), back.height()), (20, 20));
    }

    #[test]
    fn test_straight_rgba_roundtrip_for_opaque_pixels() {
        let s = solid(3, 1, [10, 20, 30, 255]);
        assert_eq!(s.to_rgba(), vec![10, 20, 30, 255, 10, 20, 30, 255, 10, 20, 30, 255]);
    }
}
