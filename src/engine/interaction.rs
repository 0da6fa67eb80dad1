// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Canvas interaction engine.
//!
//! Owns the viewport, the selection rectangle and the active gesture. Input
//! arrives as pointer, wheel, touch and double-click events in screen space;
//! each handler matches on the current [`InteractionMode`] and returns a
//! [`CanvasAction`] for the application to act on. The engine never touches
//! egui, so it can be driven directly from tests.

use super::layers::LayerStore;
use super::viewport::Viewport;
use crate::models::shapes::{Point, Rect};
use crate::util::geometry::{self, AspectOption};
use uuid::Uuid;

/// Smallest committed selection side, in world units.
pub const MIN_SELECTION_SIZE: f64 = 10.0;
/// Screen pixels a selection drag must travel before its axis locks.
pub const AXIS_LOCK_DEADZONE: f64 = 5.0;
/// Exponential zoom speed per wheel delta unit.
pub const WHEEL_ZOOM_SPEED: f64 = 0.0015;
/// Zoom factor used by the zoom in / zoom out commands.
pub const STEP_ZOOM_FACTOR: f64 = 1.25;

/// Current drawing tool selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Select,
    Move,
    Hand,
    Eraser,
    Polygon,
}

/// Pointer button of a press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// The gesture in progress.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InteractionMode {
    #[default]
    Idle,
    Panning {
        last_screen: Point,
    },
    Selecting {
        anchor: Point,
    },
    DraggingSelection {
        start_screen: Point,
        origin: Rect,
        axis: Option<Axis>,
    },
    DraggingLayer {
        id: Uuid,
        grab_offset: Point,
        /// Set once the layer actually moved and history was recorded.
        moved: bool,
    },
    Pinching {
        last_distance: f64,
    },
}

/// Result of canvas interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasAction {
    None,
    RenderNeeded,
    /// A click with the polygon tool, in world coordinates.
    PolygonPoint(Point),
    SelectionCommitted(Rect),
    SelectionDiscarded,
    LayerSelected(Uuid),
    LayerMoved(Uuid),
    LayerErased(Uuid),
}

/// Interaction state of the canvas.
#[derive(Debug)]
pub struct CanvasEngine {
    pub viewport: Viewport,
    pub tool: Tool,
    mode: InteractionMode,
    selection: Option<Rect>,
    selected_layer: Option<Uuid>,
    aspect_options: Vec<AspectOption>,
    /// Set while a generation is in flight.
    busy: bool,
}

impl Default for CanvasEngine {
    fn default() -> Self {
        Self::new(geometry::default_aspect_options())
    }
}

impl CanvasEngine {
    pub fn new(aspect_options: Vec<AspectOption>) -> Self {
        Self {
            viewport: Viewport::default(),
            tool: Tool::default(),
            mode: InteractionMode::Idle,
            selection: None,
            selected_layer: None,
            aspect_options,
            busy: false,
        }
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn selection(&self) -> Option<Rect> {
        self.selection
    }

    pub fn set_selection(&mut self, selection: Option<Rect>) {
        self.selection = selection;
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn selected_layer(&self) -> Option<Uuid> {
        self.selected_layer
    }

    pub fn select_layer(&mut self, id: Option<Uuid>) {
        self.selected_layer = id;
    }

    pub fn aspect_options(&self) -> &[AspectOption] {
        &self.aspect_options
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Mark a generation as in flight; any running gesture is dropped.
    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
        if busy {
            self.mode = InteractionMode::Idle;
        }
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        self.mode = InteractionMode::Idle;
    }

    fn gestures_enabled(&self) -> bool {
        !self.busy && !self.viewport.is_degenerate()
    }

    // --- Input events ---

    /// Handle a pointer-down event.
    pub fn pointer_down(&mut self, screen_pt: Point, button: PointerButton, layers: &mut LayerStore) -> CanvasAction {
        if !self.gestures_enabled() {
            return CanvasAction::None;
        }
        let world_pt = self.viewport.screen_to_world(screen_pt);

        // Middle button always pans.
        if button == PointerButton::Middle {
            self.mode = InteractionMode::Panning { last_screen: screen_pt };
            return CanvasAction::None;
        }
        if button != PointerButton::Primary {
            return CanvasAction::None;
        }

        match self.tool {
            Tool::Hand => {
                self.mode = InteractionMode::Panning { last_screen: screen_pt };
                CanvasAction::None
            }
            Tool::Select => match self.selection {
                Some(rect) if rect.contains(world_pt) => {
                    self.mode = InteractionMode::DraggingSelection {
                        start_screen: screen_pt,
                        origin: rect,
                        axis: None,
                    };
                    CanvasAction::None
                }
                _ => {
                    self.mode = InteractionMode::Selecting { anchor: world_pt };
                    self.selection = None;
                    CanvasAction::RenderNeeded
                }
            },
            Tool::Move => {
                let hit = layers.topmost_hit(world_pt, |l| l.visible && !l.locked);
                let Some(id) = hit else {
                    return CanvasAction::None;
                };
                let Some(layer) = layers.get(id) else {
                    return CanvasAction::None;
                };
                let grab_offset = Point::new(world_pt.x - layer.x, world_pt.y - layer.y);
                self.selected_layer = Some(id);
                self.mode = InteractionMode::DraggingLayer {
                    id,
                    grab_offset,
                    moved: false,
                };
                CanvasAction::LayerSelected(id)
            }
            Tool::Eraser => {
                let hit = layers.topmost_hit(world_pt, |l| l.visible && !l.locked);
                match hit.and_then(|id| layers.remove(id)) {
                    Some(removed) => {
                        if self.selected_layer == Some(removed.id) {
                            self.selected_layer = None;
                        }
                        CanvasAction::LayerErased(removed.id)
                    }
                    None => CanvasAction::None,
                }
            }
            Tool::Polygon => CanvasAction::PolygonPoint(world_pt),
        }
    }

    /// Handle a pointer-move event.
    pub fn pointer_move(&mut self, screen_pt: Point, layers: &mut LayerStore) -> CanvasAction {
        if !self.gestures_enabled() {
            return CanvasAction::None;
        }
        let world_pt = self.viewport.screen_to_world(screen_pt);

        match self.mode {
            InteractionMode::Idle | InteractionMode::Pinching { .. } => CanvasAction::None,
            InteractionMode::Panning { last_screen } => {
                self.viewport.pan_by(screen_pt.x - last_screen.x, screen_pt.y - last_screen.y);
                self.mode = InteractionMode::Panning { last_screen: screen_pt };
                CanvasAction::RenderNeeded
            }
            InteractionMode::Selecting { anchor } => {
                self.selection = Some(geometry::snap_selection(anchor, world_pt, &self.aspect_options));
                CanvasAction::RenderNeeded
            }
            InteractionMode::DraggingSelection { start_screen, origin, axis } => {
                let dx = screen_pt.x - start_screen.x;
                let dy = screen_pt.y - start_screen.y;
                let axis = axis.or_else(|| {
                    (dx.abs() > AXIS_LOCK_DEADZONE || dy.abs() > AXIS_LOCK_DEADZONE).then(|| {
                        if dx.abs() > dy.abs() {
                            Axis::Horizontal
                        } else {
                            Axis::Vertical
                        }
                    })
                });
                self.mode = InteractionMode::DraggingSelection { start_screen, origin, axis };
                let zoom = self.viewport.zoom;
                self.selection = Some(match axis {
                    Some(Axis::Horizontal) => origin.translated(dx / zoom, 0.0),
                    Some(Axis::Vertical) => origin.translated(0.0, dy / zoom),
                    None => origin,
                });
                CanvasAction::RenderNeeded
            }
            InteractionMode::DraggingLayer { id, grab_offset, moved } => {
                let Some(layer) = layers.get(id) else {
                    self.mode = InteractionMode::Idle;
                    return CanvasAction::None;
                };
                let (x, y) = (world_pt.x - grab_offset.x, world_pt.y - grab_offset.y);
                if layer.x == x && layer.y == y {
                    return CanvasAction::None;
                }
                // The store still holds the pre-drag state here.
                if !moved {
                    layers.checkpoint();
                    self.mode = InteractionMode::DraggingLayer {
                        id,
                        grab_offset,
                        moved: true,
                    };
                }
                if let Some(layer) = layers.get_mut(id) {
                    layer.x = x;
                    layer.y = y;
                }
                CanvasAction::LayerMoved(id)
            }
        }
    }

    /// Handle a pointer-up event.
    pub fn pointer_up(&mut self) -> CanvasAction {
        let prev = std::mem::replace(&mut self.mode, InteractionMode::Idle);
        match prev {
            InteractionMode::Selecting { .. } => match self.selection {
                Some(rect) if rect.w >= MIN_SELECTION_SIZE && rect.h >= MIN_SELECTION_SIZE => {
                    log::debug!("Selection committed: {:?}", rect);
                    CanvasAction::SelectionCommitted(rect)
                }
                _ => {
                    self.selection = None;
                    CanvasAction::SelectionDiscarded
                }
            },
            InteractionMode::DraggingSelection { .. } => match self.selection {
                Some(rect) => CanvasAction::SelectionCommitted(rect),
                None => CanvasAction::None,
            },
            InteractionMode::DraggingLayer { id, moved: true, .. } => CanvasAction::LayerMoved(id),
            InteractionMode::DraggingLayer { moved: false, .. } => CanvasAction::None,
            InteractionMode::Panning { .. } => CanvasAction::RenderNeeded,
            InteractionMode::Idle | InteractionMode::Pinching { .. } => CanvasAction::None,
        }
    }

    /// Handle a wheel event: exponential zoom around the pointer.
    pub fn wheel(&mut self, screen_pt: Point, delta_y: f64) -> CanvasAction {
        if !self.gestures_enabled() || delta_y == 0.0 {
            return CanvasAction::None;
        }
        let factor = (-delta_y * WHEEL_ZOOM_SPEED).exp();
        self.viewport.scale_at(screen_pt, factor);
        CanvasAction::RenderNeeded
    }

    /// Handle the current set of active touch points.
    ///
    /// Two touches drive pinch-zoom around their midpoint. Dropping from
    /// two touches to one ends the gesture without starting a drag.
    pub fn touches_changed(&mut self, touches: &[Point]) -> CanvasAction {
        if !self.gestures_enabled() {
            return CanvasAction::None;
        }
        match touches {
            [a, b] => {
                let distance = a.distance(*b);
                let midpoint = a.midpoint(*b);
                match self.mode {
                    InteractionMode::Pinching { last_distance } if last_distance > f64::EPSILON => {
                        self.viewport.scale_at(midpoint, distance / last_distance);
                        self.mode = InteractionMode::Pinching { last_distance: distance };
                        CanvasAction::RenderNeeded
                    }
                    _ => {
                        self.mode = InteractionMode::Pinching { last_distance: distance };
                        CanvasAction::None
                    }
                }
            }
            _ => {
                if matches!(self.mode, InteractionMode::Pinching { .. }) {
                    self.mode = InteractionMode::Idle;
                }
                CanvasAction::None
            }
        }
    }

    /// Double-click selects the topmost layer under the pointer and makes
    /// its bounds the selection.
    pub fn double_click(&mut self, screen_pt: Point, layers: &LayerStore) -> CanvasAction {
        if !self.gestures_enabled() || self.tool == Tool::Polygon {
            return CanvasAction::None;
        }
        let world_pt = self.viewport.screen_to_world(screen_pt);
        let Some(id) = layers.topmost_hit(world_pt, |l| l.visible) else {
            return CanvasAction::None;
        };
        self.mode = InteractionMode::Idle;
        self.selected_layer = Some(id);
        self.selection = layers.get(id).map(|l| l.bounds());
        log::info!("Selected layer {}", id);
        CanvasAction::LayerSelected(id)
    }

    // --- View commands ---

    pub fn zoom_in(&mut self, screen_center: Point) {
        self.viewport.scale_at(screen_center, STEP_ZOOM_FACTOR);
    }

    pub fn zoom_out(&mut self, screen_center: Point) {
        self.viewport.scale_at(screen_center, 1.0 / STEP_ZOOM_FACTOR);
    }

    pub fn reset_view(&mut self) {
        self.viewport = Viewport::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::viewport::{MAX_ZOOM, MIN_ZOOM};
    use crate::models::layer::{Layer, LayerKind};

    fn drag(engine: &mut CanvasEngine, layers: &mut LayerStore, from: Point, to: Point) -> CanvasAction {
        engine.pointer_down(from, PointerButton::Primary, layers);
        engine.pointer_move(to, layers);
        engine.pointer_up()
    }

    fn store_with(rects: &[Rect]) -> LayerStore {
        let mut store = LayerStore::new();
        for (i, r) in rects.iter().enumerate() {
            store.push_top(Layer::new(format!("l{i}"), LayerKind::Image, "x.png", *r));
        }
        store
    }

    #[test]
    fn test_selection_snaps_to_matched_ratio() {
        let options = vec![AspectOption::new("1:1", 1024, 1024), AspectOption::new("16:9", 1920, 1080)];
        let mut engine = CanvasEngine::new(options);
        let mut layers = LayerStore::new();

        let action = drag(&mut engine, &mut layers, Point::new(0.0, 0.0), Point::new(300.0, 150.0));
        let rect = engine.selection().expect("selection committed");
        assert_eq!(action, CanvasAction::SelectionCommitted(rect));
        assert!((rect.w / rect.h - 1920.0 / 1080.0).abs() < 1e-9);
    }

    #[test]
    fn test_selection_ratio_holds_under_zoom_and_reverse_drag() {
        let mut engine = CanvasEngine::default();
        engine.viewport = Viewport {
            zoom: 0.5,
            offset_x: 40.0,
            offset_y: -20.0,
        };
        let mut layers = LayerStore::new();
        drag(&mut engine, &mut layers, Point::new(400.0, 400.0), Point::new(100.0, 50.0));
        let rect = engine.selection().unwrap();
        let matched = geometry::closest_aspect_ratio(600.0 / 700.0, engine.aspect_options()).unwrap();
        assert!((rect.w / rect.h - matched.ratio).abs() < 1e-9);
        let anchor = engine.viewport.screen_to_world(Point::new(400.0, 400.0));
        assert!((rect.right() - anchor.x).abs() < 1e-9);
        assert!((rect.bottom() - anchor.y).abs() < 1e-9);
    }

    #[test]
    fn test_small_selection_is_discarded() {
        let mut engine = CanvasEngine::default();
        let mut layers = LayerStore::new();
        let action = drag(&mut engine, &mut layers, Point::new(0.0, 0.0), Point::new(30.0, 6.0));
        assert_eq!(action, CanvasAction::SelectionDiscarded);
        assert!(engine.selection().is_none());

        // 12 screen px at zoom 2 is 6 world units.
        engine.viewport.zoom = 2.0;
        drag(&mut engine, &mut layers, Point::new(0.0, 0.0), Point::new(12.0, 12.0));
        assert!(engine.selection().is_none());
    }

    #[test]
    fn test_selection_drag_locks_axis_after_deadzone() {
        let mut engine = CanvasEngine::default();
        let mut layers = LayerStore::new();
        let origin = Rect::new(0.0, 0.0, 100.0, 100.0);
        engine.set_selection(Some(origin));

        engine.pointer_down(Point::new(50.0, 50.0), PointerButton::Primary, &mut layers);
        engine.pointer_move(Point::new(53.0, 52.0), &mut layers);
        assert_eq!(engine.selection(), Some(origin));

        engine.pointer_move(Point::new(70.0, 56.0), &mut layers);
        assert_eq!(engine.selection(), Some(origin.translated(20.0, 0.0)));

        // Vertical motion later in the gesture is ignored.
        engine.pointer_move(Point::new(60.0, 150.0), &mut layers);
        assert_eq!(engine.selection(), Some(origin.translated(10.0, 0.0)));
        engine.pointer_up();
        assert_eq!(engine.mode(), InteractionMode::Idle);
    }

    #[test]
    fn test_wheel_zoom_is_clamped_and_keeps_cursor_point() {
        let mut engine = CanvasEngine::default();
        engine.viewport = Viewport {
            zoom: 1.3,
            offset_x: 12.0,
            offset_y: -7.0,
        };
        let cursor = Point::new(250.0, 125.0);
        let world = engine.viewport.screen_to_world(cursor);

        engine.wheel(cursor, -120.0);
        let back = engine.viewport.world_to_screen(world);
        assert!((back.x - cursor.x).abs() < 1e-9);
        assert!((back.y - cursor.y).abs() < 1e-9);

        engine.wheel(cursor, -1e7);
        assert_eq!(engine.viewport.zoom, MAX_ZOOM);
        engine.wheel(cursor, 1e7);
        assert_eq!(engine.viewport.zoom, MIN_ZOOM);
        let back = engine.viewport.world_to_screen(world);
        assert!((back.x - cursor.x).abs() < 1e-6);
    }

    #[test]
    fn test_pinch_zooms_around_midpoint() {
        let mut engine = CanvasEngine::default();
        let a = Point::new(100.0, 100.0);
        let b = Point::new(200.0, 100.0);
        engine.touches_changed(&[a, b]);

        let a2 = Point::new(50.0, 100.0);
        let b2 = Point::new(250.0, 100.0);
        let mid = a2.midpoint(b2);
        let world = engine.viewport.screen_to_world(mid);
        engine.touches_changed(&[a2, b2]);
        assert!((engine.viewport.zoom - 2.0).abs() < 1e-9);
        let back = engine.viewport.world_to_screen(world);
        assert!((back.x - mid.x).abs() < 1e-9);
        assert!((back.y - mid.y).abs() < 1e-9);

        // An absurd spread still clamps.
        engine.touches_changed(&[Point::new(0.0, 0.0), Point::new(1e9, 0.0)]);
        assert_eq!(engine.viewport.zoom, MAX_ZOOM);
    }

    #[test]
    fn test_two_to_one_touch_resets_gesture() {
        let mut engine = CanvasEngine::default();
        engine.touches_changed(&[Point::new(0.0, 0.0), Point::new(10.0, 0.0)]);
        assert!(matches!(engine.mode(), InteractionMode::Pinching { .. }));
        engine.touches_changed(&[Point::new(0.0, 0.0)]);
        assert_eq!(engine.mode(), InteractionMode::Idle);
        let mut layers = LayerStore::new();
        assert_eq!(engine.pointer_move(Point::new(500.0, 500.0), &mut layers), CanvasAction::None);
    }

    #[test]
    fn test_move_tool_drags_topmost_unlocked_layer() {
        let mut layers = store_with(&[Rect::new(0.0, 0.0, 100.0, 100.0), Rect::new(50.0, 50.0, 100.0, 100.0)]);
        let top = layers.layers()[0].id;
        let mut engine = CanvasEngine::default();
        engine.set_tool(Tool::Move);

        let action = engine.pointer_down(Point::new(60.0, 60.0), PointerButton::Primary, &mut layers);
        assert_eq!(action, CanvasAction::LayerSelected(top));
        engine.pointer_move(Point::new(160.0, 10.0), &mut layers);
        engine.pointer_up();
        let moved = layers.get(top).unwrap();
        assert_eq!((moved.x, moved.y), (150.0, 0.0));

        assert!(layers.undo());
        assert_eq!(layers.get(top).unwrap().x, 50.0);

        layers.update(top, |l| l.locked = true);
        let bottom = layers.layers()[1].id;
        let action = engine.pointer_down(Point::new(60.0, 60.0), PointerButton::Primary, &mut layers);
        assert_eq!(action, CanvasAction::LayerSelected(bottom));
    }

    #[test]
    fn test_move_click_without_drag_keeps_redo() {
        let mut layers = store_with(&[Rect::new(0.0, 0.0, 100.0, 100.0), Rect::new(50.0, 50.0, 100.0, 100.0)]);
        assert!(layers.undo());
        assert!(layers.can_redo());

        let mut engine = CanvasEngine::default();
        engine.set_tool(Tool::Move);
        let at = Point::new(10.0, 10.0);
        engine.pointer_down(at, PointerButton::Primary, &mut layers);
        assert_eq!(engine.pointer_move(at, &mut layers), CanvasAction::None);
        assert_eq!(engine.pointer_up(), CanvasAction::None);

        assert!(layers.can_redo());
        assert!(layers.redo());
        assert_eq!(layers.len(), 2);
    }

    #[test]
    fn test_eraser_removes_topmost_hit() {
        let mut layers = store_with(&[Rect::new(0.0, 0.0, 100.0, 100.0), Rect::new(0.0, 0.0, 100.0, 100.0)]);
        let top = layers.layers()[0].id;
        let mut engine = CanvasEngine::default();
        engine.set_tool(Tool::Eraser);
        let action = engine.pointer_down(Point::new(10.0, 10.0), PointerButton::Primary, &mut layers);
        assert_eq!(action, CanvasAction::LayerErased(top));
        assert_eq!(layers.len(), 1);
        assert_eq!(engine.pointer_down(Point::new(500.0, 10.0), PointerButton::Primary, &mut layers), CanvasAction::None);
    }

    #[test]
    fn test_hand_and_middle_button_pan() {
        let mut engine = CanvasEngine::default();
        let mut layers = LayerStore::new();
        engine.pointer_down(Point::new(10.0, 10.0), PointerButton::Middle, &mut layers);
        engine.pointer_move(Point::new(30.0, 5.0), &mut layers);
        engine.pointer_up();
        assert_eq!((engine.viewport.offset_x, engine.viewport.offset_y), (20.0, -5.0));

        engine.set_tool(Tool::Hand);
        drag(&mut engine, &mut layers, Point::new(0.0, 0.0), Point::new(-20.0, 5.0));
        assert_eq!((engine.viewport.offset_x, engine.viewport.offset_y), (0.0, 0.0));
    }

    #[test]
    fn test_double_click_selects_layer_bounds() {
        let bounds = Rect::new(20.0, 30.0, 64.0, 48.0);
        let layers = store_with(&[bounds]);
        let id = layers.layers()[0].id;
        let mut engine = CanvasEngine::default();
        engine.viewport.zoom = 2.0;
        let action = engine.double_click(Point::new(60.0, 80.0), &layers);
        assert_eq!(action, CanvasAction::LayerSelected(id));
        assert_eq!(engine.selection(), Some(bounds));
        assert_eq!(engine.selected_layer(), Some(id));
    }

    #[test]
    fn test_gestures_suppressed_while_busy_or_collapsed() {
        let mut engine = CanvasEngine::default();
        let mut layers = LayerStore::new();
        engine.set_busy(true);
        assert_eq!(drag(&mut engine, &mut layers, Point::new(0.0, 0.0), Point::new(200.0, 200.0)), CanvasAction::None);
        assert!(engine.selection().is_none());
        assert_eq!(engine.wheel(Point::new(0.0, 0.0), -100.0), CanvasAction::None);

        engine.set_busy(false);
        engine.viewport.zoom = 0.0;
        assert_eq!(
            engine.pointer_down(Point::new(0.0, 0.0), PointerButton::Primary, &mut layers),
            CanvasAction::None
        );
    }

    #[test]
    fn test_polygon_tool_reports_world_points() {
        let mut engine = CanvasEngine::default();
        engine.set_tool(Tool::Polygon);
        engine.viewport = Viewport {
            zoom: 2.0,
            offset_x: 10.0,
            offset_y: 10.0,
        };
        let mut layers = LayerStore::new();
        let action = engine.pointer_down(Point::new(30.0, 50.0), PointerButton::Primary, &mut layers);
        assert_eq!(action, CanvasAction::PolygonPoint(Point::new(10.0, 20.0)));
    }
}
