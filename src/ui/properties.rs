// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Layer list and the property editor for the selected layer.

use crate::engine::layers::LayerStore;
use crate::engine::polygon::DEFAULT_FONT_SIZE;
use crate::models::layer::{Layer, LayerKind, RenderMode};
use uuid::Uuid;

/// Discrete operations on one layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerCommand {
    ToggleVisible,
    ToggleLocked,
    Raise,
    Lower,
    ToTop,
    ToBottom,
    Duplicate,
    Delete,
    Reset,
    TogglePlay,
    SetRenderMode(RenderMode),
    DownloadPng,
    ApplyZone { label: String, font_size: f32 },
}

/// Result of properties panel interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertiesAction {
    Select(Uuid),
    /// A continuous edit is starting; record history once.
    Checkpoint,
    /// The selected layer after an in-place edit.
    Edited(Layer),
    Command(Uuid, LayerCommand),
}

/// Label draft for the selected zone layer.
#[derive(Default)]
pub struct PropertiesState {
    zone_draft: Option<(Uuid, String, f32)>,
}

/// Display the layer list and property editor.
pub fn show(
    ui: &mut egui::Ui,
    layers: &LayerStore,
    selected: Option<Uuid>,
    state: &mut PropertiesState,
) -> Vec<PropertiesAction> {
    let mut actions = Vec::new();

    ui.heading("Layers");
    ui.separator();

    if layers.is_empty() {
        ui.label("No layers yet");
    }

    egui::ScrollArea::vertical()
        .id_source("layer_list")
        .max_height(240.0)
        .show(ui, |ui| {
            for layer in layers.layers() {
                let is_selected = selected == Some(layer.id);
                ui.horizontal(|ui| {
                    let eye = if layer.visible { "👁" } else { "—" };
                    if ui.small_button(eye).on_hover_text("Toggle visibility").clicked() {
                        actions.push(PropertiesAction::Command(layer.id, LayerCommand::ToggleVisible));
                    }
                    let lock = if layer.locked { "🔒" } else { "🔓" };
                    if ui.small_button(lock).on_hover_text("Toggle lock").clicked() {
                        actions.push(PropertiesAction::Command(layer.id, LayerCommand::ToggleLocked));
                    }
                    let icon = match layer.kind {
                        LayerKind::Image => "🖼",
                        LayerKind::Generation => "✨",
                        LayerKind::Video => "🎞",
                    };
                    if ui
                        .selectable_label(is_selected, format!("{} {}", icon, layer.name))
                        .clicked()
                    {
                        actions.push(PropertiesAction::Select(layer.id));
                    }
                });
            }
        });

    let Some(layer) = selected.and_then(|id| layers.get(id)) else {
        state.zone_draft = None;
        return actions;
    };

    ui.separator();
    ui.heading("Properties");
    layer_editor(ui, layer, state, &mut actions);

    actions
}

fn layer_editor(ui: &mut egui::Ui, layer: &Layer, state: &mut PropertiesState, actions: &mut Vec<PropertiesAction>) {
    let id = layer.id;
    let mut edited = layer.clone();

    ui.horizontal(|ui| {
        ui.label("Name:");
        let response = ui.text_edit_singleline(&mut edited.name);
        if response.gained_focus() {
            actions.push(PropertiesAction::Checkpoint);
        }
        if response.changed() {
            actions.push(PropertiesAction::Edited(edited.clone()));
        }
    });

    ui.label(format!(
        "Position {:.0}, {:.0}   Size {:.0} × {:.0}",
        layer.x, layer.y, layer.w, layer.h
    ));

    if !layer.is_video() {
        let response = ui.add(egui::Slider::new(&mut edited.feather, 0.0..=100.0).text("Feather %"));
        if response.drag_started() || (response.changed() && !response.dragged()) {
            actions.push(PropertiesAction::Checkpoint);
        }
        if response.changed() {
            edited.set_feather(edited.feather);
            actions.push(PropertiesAction::Edited(edited.clone()));
        }

        ui.horizontal(|ui| {
            ui.label("Fit:");
            for (mode, label) in [(RenderMode::Cover, "Cover"), (RenderMode::Fill, "Fill")] {
                if ui.selectable_label(layer.render_mode == mode, label).clicked() && layer.render_mode != mode {
                    actions.push(PropertiesAction::Command(id, LayerCommand::SetRenderMode(mode)));
                }
            }
        });
    } else {
        let playing = layer.is_playing == Some(true);
        if ui.button(if playing { "⏸ Pause" } else { "▶ Play" }).clicked() {
            actions.push(PropertiesAction::Command(id, LayerCommand::TogglePlay));
        }
    }

    if let Some(decor) = &layer.decor_data {
        if state.zone_draft.as_ref().map(|d| d.0) != Some(id) {
            state.zone_draft = Some((id, decor.label.clone(), decor.font_size));
        }
        let draft = state.zone_draft.get_or_insert_with(|| (id, decor.label.clone(), decor.font_size));
        ui.separator();
        ui.label("Zone label:");
        ui.text_edit_multiline(&mut draft.1);
        ui.add(egui::Slider::new(&mut draft.2, 8.0..=72.0).text("Font size"));
        let dirty = draft.1 != decor.label || (draft.2 - decor.font_size).abs() > f32::EPSILON;
        ui.horizontal(|ui| {
            if ui.add_enabled(dirty, egui::Button::new("Apply")).clicked() {
                actions.push(PropertiesAction::Command(
                    id,
                    LayerCommand::ApplyZone {
                        label: draft.1.clone(),
                        font_size: draft.2,
                    },
                ));
            }
            if ui.button("Default size").clicked() {
                draft.2 = DEFAULT_FONT_SIZE;
            }
        });
    } else {
        state.zone_draft = None;
    }

    ui.separator();
    ui.horizontal_wrapped(|ui| {
        let commands = [
            ("⏶ Up", LayerCommand::Raise),
            ("⏷ Down", LayerCommand::Lower),
            ("⏫ Top", LayerCommand::ToTop),
            ("⏬ Bottom", LayerCommand::ToBottom),
            ("⧉ Duplicate", LayerCommand::Duplicate),
            ("↺ Reset", LayerCommand::Reset),
        ];
        for (label, command) in commands {
            if ui.button(label).clicked() {
                actions.push(PropertiesAction::Command(id, command));
            }
        }
        if !layer.is_video() && ui.button("💾 PNG").clicked() {
            actions.push(PropertiesAction::Command(id, LayerCommand::DownloadPng));
        }
        if ui.button("🗑 Delete").clicked() {
            actions.push(PropertiesAction::Command(id, LayerCommand::Delete));
        }
    });
}
