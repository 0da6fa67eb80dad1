// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Studio workspace: scene cards, shots and the movie export controls.

use crate::models::scene::{FrameImage, Orientation, Scene, MAX_SHOTS};
use crate::render::assets::AssetCache;
use crate::studio::export::ExportState;
use crate::studio::timeline::{Timeline, MAX_SCENE_VARIATIONS};
use crate::ui::textures::TextureCache;
use uuid::Uuid;

const FRAME_THUMB_HEIGHT: f32 = 72.0;

/// Which frame slot of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSlot {
    Start,
    End,
}

/// Result of studio interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum StudioAction {
    PickFrame(Uuid, FrameSlot),
    Generate(Uuid),
    UseLastFrame(Uuid),
    CopyVideoUrl(String),
    Export,
}

/// Export progress as shown under the timeline.
#[derive(Debug, Clone, Default)]
pub struct ExportStatus {
    pub state: ExportState,
    pub frames_written: u64,
    pub last_output: Option<String>,
}

/// Display the studio workspace. Structural edits (shots, frames, order)
/// are applied to `timeline` directly.
pub fn show(
    ui: &mut egui::Ui,
    timeline: &mut Timeline,
    textures: &mut TextureCache,
    assets: &mut AssetCache,
    export: &ExportStatus,
) -> Vec<StudioAction> {
    let mut actions = Vec::new();

    ui.horizontal(|ui| {
        ui.heading("Studio");
        ui.separator();
        ui.label("Orientation:");
        for (orientation, label) in [
            (Orientation::Auto, "Auto"),
            (Orientation::Horizontal, "16:9"),
            (Orientation::Vertical, "9:16"),
        ] {
            ui.selectable_value(&mut timeline.orientation, orientation, label);
        }
        ui.separator();
        ui.checkbox(&mut timeline.with_audio, "Audio");
        ui.separator();
        ui.label(format!("Model: {}", timeline.model));
    });
    ui.separator();

    let generating = timeline.scenes.iter().any(|s| s.is_generating);
    let scene_count = timeline.scenes.len();
    let mut structural: Option<Structural> = None;

    egui::ScrollArea::vertical().id_source("scenes").show(ui, |ui| {
        for (index, scene) in timeline.scenes.iter_mut().enumerate() {
            egui::Frame::group(ui.style()).show(ui, |ui| {
                ui.set_width(ui.available_width());
                scene_card(ui, index, scene_count, scene, generating, textures, assets, &mut actions, &mut structural);
            });
            ui.add_space(6.0);
        }

        if ui.add_enabled(!generating, egui::Button::new("➕ Add scene")).clicked() {
            structural = Some(Structural::Add);
        }
    });

    if let Some(edit) = structural {
        apply_structural(timeline, edit);
    }

    ui.separator();
    export_controls(ui, timeline, export, &mut actions);

    actions
}

/// Edits that change the scene list itself and must wait until the list is
/// no longer borrowed.
enum Structural {
    Add,
    Remove(Uuid),
    Duplicate(Uuid),
    Move(Uuid, usize),
    SelectVideo(Uuid, usize),
}

fn apply_structural(timeline: &mut Timeline, edit: Structural) {
    match edit {
        Structural::Add => {
            timeline.add_scene();
        }
        Structural::Remove(id) => {
            timeline.remove_scene(id);
        }
        Structural::Duplicate(id) => {
            timeline.duplicate_scene(id);
        }
        Structural::Move(id, index) => {
            timeline.move_scene(id, index);
        }
        Structural::SelectVideo(id, index) => {
            timeline.select_video(id, index);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn scene_card(
    ui: &mut egui::Ui,
    index: usize,
    scene_count: usize,
    scene: &mut Scene,
    generating: bool,
    textures: &mut TextureCache,
    assets: &mut AssetCache,
    actions: &mut Vec<StudioAction>,
    structural: &mut Option<Structural>,
) {
    let id = scene.id;
    let locked = scene.is_generating;

    ui.horizontal(|ui| {
        ui.strong(format!("Scene {}", index + 1));
        ui.label(format!("{:.1}s", scene.total_duration()));
        if scene.is_generating {
            ui.spinner();
            ui.label("Generating...");
        }
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.add_enabled_ui(!generating, |ui| {
                if ui.small_button("🗑").on_hover_text("Remove scene").clicked() && scene_count > 1 {
                    *structural = Some(Structural::Remove(id));
                }
                if ui.small_button("⧉").on_hover_text("Duplicate scene").clicked() {
                    *structural = Some(Structural::Duplicate(id));
                }
                if ui.small_button("⏷").clicked() && index + 1 < scene_count {
                    *structural = Some(Structural::Move(id, index + 1));
                }
                if ui.small_button("⏶").clicked() && index > 0 {
                    *structural = Some(Structural::Move(id, index - 1));
                }
            });
        });
    });

    ui.horizontal(|ui| {
        frame_slot(ui, "Start", &mut scene.start_frame, id, FrameSlot::Start, locked, textures, assets, actions);
        frame_slot(ui, "End", &mut scene.end_frame, id, FrameSlot::End, locked, textures, assets, actions);
    });

    ui.add_enabled_ui(!locked, |ui| {
        let mut remove = None;
        let removable = scene.shots.len() > 1;
        for (shot_index, shot) in scene.shots.iter_mut().enumerate() {
            ui.horizontal(|ui| {
                ui.label(format!("Shot {}", shot_index + 1));
                ui.add(
                    egui::TextEdit::singleline(&mut shot.prompt)
                        .hint_text("What happens in this shot")
                        .desired_width(ui.available_width() - 140.0),
                );
                ui.add(
                    egui::DragValue::new(&mut shot.duration)
                        .clamp_range(1.0..=15.0)
                        .speed(0.1)
                        .suffix("s"),
                );
                if removable && ui.small_button("✖").clicked() {
                    remove = Some(shot_index);
                }
            });
        }
        if let Some(shot_index) = remove {
            scene.remove_shot(shot_index);
        }

        ui.horizontal(|ui| {
            if ui
                .add_enabled(scene.shots.len() < MAX_SHOTS, egui::Button::new("➕ Shot"))
                .clicked()
            {
                scene.add_shot();
            }
            ui.label("Variations:");
            ui.add(egui::Slider::new(&mut scene.variation_count, 1..=MAX_SCENE_VARIATIONS));
            if ui.button("🎬 Generate").clicked() {
                actions.push(StudioAction::Generate(id));
            }
        });
    });

    if !scene.videos.is_empty() {
        ui.horizontal_wrapped(|ui| {
            ui.label("Videos:");
            for video_index in 0..scene.videos.len() {
                let chosen = scene.selected_video_index == Some(video_index);
                if ui.selectable_label(chosen, format!("#{}", video_index + 1)).clicked() && !chosen {
                    *structural = Some(Structural::SelectVideo(id, video_index));
                }
            }
            if let Some(url) = scene.selected_video() {
                if ui.small_button("📋 Copy URL").clicked() {
                    actions.push(StudioAction::CopyVideoUrl(url.to_string()));
                }
                if ui
                    .small_button("⏭ Use last frame")
                    .on_hover_text("Set the last frame as the next scene's start frame")
                    .clicked()
                {
                    actions.push(StudioAction::UseLastFrame(id));
                }
            }
        });
    }
}

#[allow(clippy::too_many_arguments)]
fn frame_slot(
    ui: &mut egui::Ui,
    label: &str,
    frame: &mut Option<FrameImage>,
    id: Uuid,
    slot: FrameSlot,
    locked: bool,
    textures: &mut TextureCache,
    assets: &mut AssetCache,
    actions: &mut Vec<StudioAction>,
) {
    ui.vertical(|ui| {
        ui.label(label);
        let mut clear = false;
        match frame.as_ref() {
            Some(image) => {
                if let Some(texture) = textures.get(ui.ctx(), &image.src, assets) {
                    let aspect = image.width.max(1) as f32 / image.height.max(1) as f32;
                    let size = egui::vec2(FRAME_THUMB_HEIGHT * aspect, FRAME_THUMB_HEIGHT);
                    ui.add(egui::Image::new((texture.id(), size)));
                }
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new(format!("{}×{}", image.width, image.height)).small());
                    if ui.add_enabled(!locked, egui::Button::new("✖").small()).clicked() {
                        clear = true;
                    }
                });
            }
            None => {
                if ui.add_enabled(!locked, egui::Button::new("Choose...")).clicked() {
                    actions.push(StudioAction::PickFrame(id, slot));
                }
            }
        }
        if clear {
            *frame = None;
        }
    });
}

fn export_controls(ui: &mut egui::Ui, timeline: &Timeline, export: &ExportStatus, actions: &mut Vec<StudioAction>) {
    let ready = timeline.scenes.iter().filter(|s| s.selected_video().is_some()).count();
    ui.horizontal(|ui| {
        let idle = export.state == ExportState::Idle;
        if ui
            .add_enabled(idle && ready > 0, egui::Button::new("🎞 Export movie"))
            .clicked()
        {
            actions.push(StudioAction::Export);
        }
        ui.label(format!("{ready} of {} scenes ready", timeline.scenes.len()));

        match export.state {
            ExportState::Idle => {
                if let Some(path) = &export.last_output {
                    ui.label(format!("Saved {path}"));
                }
            }
            ExportState::Probing => {
                ui.spinner();
                ui.label("Preparing export...");
            }
            ExportState::Recording {
                scene_index,
                scene_count,
            } => {
                ui.spinner();
                ui.label(format!(
                    "Recording scene {}/{} ({} frames)",
                    scene_index + 1,
                    scene_count,
                    export.frames_written
                ));
            }
            ExportState::Finalizing => {
                ui.spinner();
                ui.label("Finalizing...");
            }
        }
    });
}
