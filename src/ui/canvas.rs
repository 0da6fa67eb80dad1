// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Drawing canvas for layers, the selection and the polygon zone tool.
//!
//! egui input is translated into [`CanvasEngine`] events in canvas-local
//! screen coordinates; the engine decides what each gesture does.

use crate::engine::interaction::{CanvasAction, CanvasEngine, PointerButton, Tool};
use crate::engine::layers::LayerStore;
use crate::engine::polygon::{PolygonTool, CLOSE_DISTANCE, MIN_VERTICES};
use crate::models::layer::{Layer, RenderMode};
use crate::models::shapes::{Point, Rect};
use crate::render::assets::AssetCache;
use crate::ui::textures::TextureCache;
use egui::{Color32, Pos2, Stroke};
use std::collections::BTreeMap;

const ACCENT: Color32 = Color32::from_rgb(59, 130, 246);
/// egui scrolls roughly 50 points per wheel notch, browsers report 100.
const WHEEL_SCALE: f64 = 2.0;
const DASH_LENGTH: f32 = 6.0;

/// Touch points currently down on the canvas.
#[derive(Default)]
pub struct CanvasInput {
    touches: BTreeMap<egui::TouchId, Pos2>,
}

/// Everything the canvas reads or drives.
pub struct CanvasView<'a> {
    pub engine: &'a mut CanvasEngine,
    pub layers: &'a mut LayerStore,
    pub polygon: &'a PolygonTool,
    pub textures: &'a mut TextureCache,
    pub assets: &'a mut AssetCache,
    pub input: &'a mut CanvasInput,
}

fn to_point(p: Pos2, origin: Pos2) -> Point {
    Point::new((p.x - origin.x) as f64, (p.y - origin.y) as f64)
}

fn to_pos(p: Point, origin: Pos2) -> Pos2 {
    Pos2::new(origin.x + p.x as f32, origin.y + p.y as f32)
}

fn world_to_pos(engine: &CanvasEngine, p: Point, origin: Pos2) -> Pos2 {
    to_pos(engine.viewport.world_to_screen(p), origin)
}

fn screen_rect(engine: &CanvasEngine, world: Rect, origin: Pos2) -> egui::Rect {
    egui::Rect::from_min_max(
        world_to_pos(engine, Point::new(world.x, world.y), origin),
        world_to_pos(engine, Point::new(world.right(), world.bottom()), origin),
    )
}

/// Texture coordinates that crop an image so it covers `dst`.
fn cover_uv(texture_size: [usize; 2], dst: egui::Rect) -> egui::Rect {
    let full = egui::Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
    let (tw, th) = (texture_size[0] as f32, texture_size[1] as f32);
    if tw <= 0.0 || th <= 0.0 || dst.width() <= 0.0 || dst.height() <= 0.0 {
        return full;
    }
    let image_aspect = tw / th;
    let dst_aspect = dst.width() / dst.height();
    if image_aspect > dst_aspect {
        let f = dst_aspect / image_aspect;
        egui::Rect::from_min_max(Pos2::new((1.0 - f) / 2.0, 0.0), Pos2::new((1.0 + f) / 2.0, 1.0))
    } else {
        let f = image_aspect / dst_aspect;
        egui::Rect::from_min_max(Pos2::new(0.0, (1.0 - f) / 2.0), Pos2::new(1.0, (1.0 + f) / 2.0))
    }
}

/// Display the canvas and feed its input to the engine.
pub fn show(ui: &mut egui::Ui, view: CanvasView<'_>) -> Vec<CanvasAction> {
    let CanvasView {
        engine,
        layers,
        polygon,
        textures,
        assets,
        input,
    } = view;

    let rect = ui.available_rect_before_wrap();
    let response = ui.allocate_rect(rect, egui::Sense::click_and_drag());
    let origin = rect.min;

    let mut actions = handle_input(ui, &response, rect, engine, layers, input);

    let painter = ui.painter_at(rect);
    painter.rect_filled(rect, 0.0, Color32::from_gray(40));

    // Index 0 is the top of the stack, so paint in reverse.
    for layer in layers.layers().iter().rev().filter(|l| l.visible) {
        draw_layer(ui.ctx(), &painter, engine, layer, origin, textures, assets);
    }

    if let Some(layer) = engine.selected_layer().and_then(|id| layers.get(id)) {
        painter.rect_stroke(screen_rect(engine, layer.bounds(), origin), 0.0, Stroke::new(2.0, ACCENT));
    }

    if let Some(selection) = engine.selection() {
        draw_selection(ui, &painter, engine, selection, origin);
    }

    if engine.tool == Tool::Polygon {
        draw_polygon_preview(&painter, engine, polygon, origin, response.hover_pos());
    }

    if layers.is_empty() {
        painter.text(
            rect.center(),
            egui::Align2::CENTER_CENTER,
            "Drop images or videos here, or use File → Upload...",
            egui::FontId::proportional(16.0),
            Color32::from_gray(150),
        );
    }

    actions.retain(|a| *a != CanvasAction::None);
    actions
}

fn handle_input(
    ui: &egui::Ui,
    response: &egui::Response,
    rect: egui::Rect,
    engine: &mut CanvasEngine,
    layers: &mut LayerStore,
    input: &mut CanvasInput,
) -> Vec<CanvasAction> {
    let origin = rect.min;
    let mut actions = Vec::new();
    let (events, scroll, hover) = ui.input(|i| (i.events.clone(), i.raw_scroll_delta, i.pointer.hover_pos()));

    for event in events {
        match event {
            egui::Event::PointerButton {
                pos, button, pressed, ..
            } => {
                if pressed {
                    if !rect.contains(pos) || input.touches.len() >= 2 {
                        continue;
                    }
                    let button = match button {
                        egui::PointerButton::Primary => PointerButton::Primary,
                        egui::PointerButton::Secondary => PointerButton::Secondary,
                        egui::PointerButton::Middle => PointerButton::Middle,
                        _ => continue,
                    };
                    actions.push(engine.pointer_down(to_point(pos, origin), button, layers));
                } else {
                    actions.push(engine.pointer_up());
                }
            }
            egui::Event::PointerMoved(pos) => {
                actions.push(engine.pointer_move(to_point(pos, origin), layers));
            }
            egui::Event::Touch { id, phase, pos, .. } => {
                let before = input.touches.len();
                match phase {
                    egui::TouchPhase::Start | egui::TouchPhase::Move => {
                        if phase == egui::TouchPhase::Start && !rect.contains(pos) {
                            continue;
                        }
                        input.touches.insert(id, pos);
                    }
                    egui::TouchPhase::End | egui::TouchPhase::Cancel => {
                        input.touches.remove(&id);
                    }
                }
                if before >= 2 || input.touches.len() >= 2 {
                    let points: Vec<Point> = input.touches.values().map(|p| to_point(*p, origin)).collect();
                    actions.push(engine.touches_changed(&points));
                }
            }
            _ => {}
        }
    }

    if let Some(pos) = hover.filter(|p| rect.contains(*p)) {
        if scroll.y != 0.0 {
            actions.push(engine.wheel(to_point(pos, origin), -(scroll.y as f64) * WHEEL_SCALE));
        }
    }

    if response.double_clicked() {
        if let Some(pos) = response.interact_pointer_pos() {
            actions.push(engine.double_click(to_point(pos, origin), layers));
        }
    }

    actions
}

fn draw_layer(
    ctx: &egui::Context,
    painter: &egui::Painter,
    engine: &CanvasEngine,
    layer: &Layer,
    origin: Pos2,
    textures: &mut TextureCache,
    assets: &mut AssetCache,
) {
    let dst = screen_rect(engine, layer.bounds(), origin);
    if !painter.clip_rect().intersects(dst) {
        return;
    }

    if layer.is_video() {
        painter.rect_filled(dst, 4.0, Color32::from_gray(15));
        let glyph = if layer.is_playing == Some(true) { "⏸" } else { "▶" };
        painter.text(
            dst.center(),
            egui::Align2::CENTER_CENTER,
            glyph,
            egui::FontId::proportional(28.0),
            Color32::WHITE,
        );
        painter.text(
            dst.left_bottom() + egui::vec2(6.0, -6.0),
            egui::Align2::LEFT_BOTTOM,
            &layer.name,
            egui::FontId::proportional(12.0),
            Color32::from_gray(200),
        );
        return;
    }

    match textures.get(ctx, &layer.src, assets) {
        Some(texture) => {
            let uv = match layer.render_mode {
                RenderMode::Cover => cover_uv(texture.size(), dst),
                RenderMode::Fill => egui::Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
            };
            painter.image(texture.id(), dst, uv, Color32::WHITE);
        }
        None => {
            painter.rect_filled(dst, 0.0, Color32::from_rgb(80, 30, 30));
            painter.text(
                dst.center(),
                egui::Align2::CENTER_CENTER,
                "missing image",
                egui::FontId::proportional(12.0),
                Color32::WHITE,
            );
        }
    }
}

fn dashed_rect(painter: &egui::Painter, rect: egui::Rect, stroke: Stroke) {
    let corners = [rect.left_top(), rect.right_top(), rect.right_bottom(), rect.left_bottom(), rect.left_top()];
    for pair in corners.windows(2) {
        painter.add(egui::Shape::dashed_line(&pair.to_vec(), stroke, DASH_LENGTH, DASH_LENGTH));
    }
}

fn draw_selection(ui: &egui::Ui, painter: &egui::Painter, engine: &CanvasEngine, selection: Rect, origin: Pos2) {
    let rect = screen_rect(engine, selection, origin);

    if engine.is_busy() {
        let t = ui.input(|i| i.time);
        let alpha = (((t * 3.0).sin() * 0.5 + 0.5) * 60.0 + 20.0) as u8;
        painter.rect_filled(rect, 0.0, Color32::from_rgba_unmultiplied(59, 130, 246, alpha));
        painter.text(
            rect.center(),
            egui::Align2::CENTER_CENTER,
            "Generating...",
            egui::FontId::proportional(16.0),
            Color32::WHITE,
        );
        ui.ctx().request_repaint();
    }

    dashed_rect(painter, rect, Stroke::new(1.5, Color32::WHITE));
    painter.text(
        rect.left_top() + egui::vec2(0.0, -4.0),
        egui::Align2::LEFT_BOTTOM,
        format!("{:.0} × {:.0}", selection.w, selection.h),
        egui::FontId::monospace(11.0),
        Color32::WHITE,
    );
}

fn draw_polygon_preview(
    painter: &egui::Painter,
    engine: &CanvasEngine,
    polygon: &PolygonTool,
    origin: Pos2,
    hover: Option<Pos2>,
) {
    let points: Vec<Pos2> = polygon.points().iter().map(|p| world_to_pos(engine, *p, origin)).collect();
    let Some(first) = points.first().copied() else {
        return;
    };
    let stroke = Stroke::new(2.0, ACCENT);

    if points.len() >= 2 {
        painter.add(egui::Shape::line(points.clone(), stroke));
    }
    if let (Some(last), Some(hover)) = (points.last(), hover) {
        painter.add(egui::Shape::dashed_line(&[*last, hover], stroke, DASH_LENGTH, DASH_LENGTH));
    }

    for p in &points {
        painter.circle_filled(*p, 4.0, ACCENT);
    }

    // Ring the first vertex when a click would close the polygon.
    let near_first = hover.is_some_and(|h| {
        let world_hover = engine.viewport.screen_to_world(to_point(h, origin));
        polygon.points().len() >= MIN_VERTICES && world_hover.distance(polygon.points()[0]) <= CLOSE_DISTANCE
    });
    if near_first {
        painter.circle_stroke(first, 8.0, Stroke::new(2.0, Color32::WHITE));
    }
}
