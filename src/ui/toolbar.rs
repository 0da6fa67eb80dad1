// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Toolbar with tool selection, view controls and the workspace switch.

use crate::app::AppMode;
use crate::engine::interaction::Tool;

/// Result of toolbar interaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToolbarAction {
    None,
    SetTool(Tool),
    SetMode(AppMode),
    ZoomIn,
    ZoomOut,
    ResetView,
    Undo,
    Redo,
    RefreshCredits,
}

/// State the toolbar displays.
pub struct ToolbarState {
    pub tool: Tool,
    pub mode: AppMode,
    pub zoom: f64,
    pub can_undo: bool,
    pub can_redo: bool,
    pub credits: Option<i64>,
    pub busy: bool,
}

fn tool_hint(tool: Tool) -> &'static str {
    match tool {
        Tool::Select => "Drag to select a region, drag inside it to move, double-click a layer to select it",
        Tool::Move => "Drag a layer to move it",
        Tool::Hand => "Drag to pan the view",
        Tool::Eraser => "Click a layer to delete it",
        Tool::Polygon => "Click to add vertices, click the first vertex or press Enter to close",
    }
}

/// Display the toolbar.
pub fn show(ui: &mut egui::Ui, state: &ToolbarState) -> ToolbarAction {
    let mut action = ToolbarAction::None;

    ui.horizontal(|ui| {
        ui.spacing_mut().item_spacing.x = 8.0;

        if ui.selectable_label(state.mode == AppMode::Canvas, "🖼 Canvas").clicked() {
            action = ToolbarAction::SetMode(AppMode::Canvas);
        }
        if ui.selectable_label(state.mode == AppMode::Studio, "🎬 Studio").clicked() {
            action = ToolbarAction::SetMode(AppMode::Studio);
        }

        ui.separator();

        if state.mode == AppMode::Canvas {
            let tools = [
                (Tool::Select, "⬚ Select"),
                (Tool::Move, "✥ Move"),
                (Tool::Hand, "✋ Hand"),
                (Tool::Eraser, "⌫ Eraser"),
                (Tool::Polygon, "▱ Zone"),
            ];
            ui.add_enabled_ui(!state.busy, |ui| {
                for (tool, label) in tools {
                    if ui.selectable_label(state.tool == tool, label).clicked() {
                        action = ToolbarAction::SetTool(tool);
                    }
                }
            });

            ui.separator();

            if ui.button("−").on_hover_text("Zoom out").clicked() {
                action = ToolbarAction::ZoomOut;
            }
            ui.label(format!("{:.0}%", state.zoom * 100.0));
            if ui.button("+").on_hover_text("Zoom in").clicked() {
                action = ToolbarAction::ZoomIn;
            }
            if ui.button("1:1").on_hover_text("Reset view").clicked() {
                action = ToolbarAction::ResetView;
            }

            ui.separator();

            if ui.add_enabled(state.can_undo, egui::Button::new("↶")).on_hover_text("Undo (Ctrl+Z)").clicked() {
                action = ToolbarAction::Undo;
            }
            if ui.add_enabled(state.can_redo, egui::Button::new("↷")).on_hover_text("Redo (Ctrl+Shift+Z)").clicked() {
                action = ToolbarAction::Redo;
            }

            ui.separator();
            ui.label(egui::RichText::new(tool_hint(state.tool)).italics().weak());
        }

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui.small_button("⟳").on_hover_text("Refresh credits").clicked() {
                action = ToolbarAction::RefreshCredits;
            }
            match state.credits {
                Some(credits) => ui.label(format!("Credits: {credits}")),
                None => ui.label(egui::RichText::new("Credits: —").weak()),
            };
        });
    });

    action
}
