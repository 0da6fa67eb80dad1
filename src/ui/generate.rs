// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Prompt, model settings and reference images for canvas generation.

use crate::engine::generation::{GenerationOptions, OutputKind, ReferenceImages, MAX_REFERENCE_IMAGES, MAX_VARIATIONS};

pub const IMAGE_MODELS: &[&str] = &["gemini-2.5-flash-image", "gemini-3-pro-image-preview"];
pub const VIDEO_MODELS: &[&str] = &["veo-3.1-fast-generate-preview", "veo-3.1-generate-preview"];
const IMAGE_SIZES: &[&str] = &["1K", "2K", "4K"];
const VIDEO_DURATIONS: &[f64] = &[4.0, 6.0, 8.0];

/// Result of generation panel interaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GenerateAction {
    None,
    Generate,
    Upscale,
    AddReferences,
    RemoveReference(usize),
    ClearReferences,
}

/// Display the generation controls.
pub fn show(
    ui: &mut egui::Ui,
    prompt: &mut String,
    options: &mut GenerationOptions,
    references: &ReferenceImages,
    has_selection: bool,
    busy: bool,
) -> GenerateAction {
    let mut action = GenerateAction::None;

    ui.heading("Generate");
    ui.separator();

    ui.add(
        egui::TextEdit::multiline(prompt)
            .hint_text("Describe what should appear in the selection")
            .desired_rows(3)
            .desired_width(f32::INFINITY),
    );

    ui.add_enabled_ui(!busy, |ui| {
        egui::ComboBox::from_label("Model")
            .selected_text(options.model.as_str())
            .show_ui(ui, |ui| {
                for model in IMAGE_MODELS {
                    if ui.selectable_label(options.model == *model, *model).clicked() {
                        options.model = model.to_string();
                        options.kind = OutputKind::Image;
                    }
                }
                ui.separator();
                for model in VIDEO_MODELS {
                    if ui.selectable_label(options.model == *model, *model).clicked() {
                        options.model = model.to_string();
                        options.kind = OutputKind::Video;
                    }
                }
            });

        match options.kind {
            OutputKind::Image => {
                ui.horizontal(|ui| {
                    ui.label("Variations:");
                    ui.add(egui::Slider::new(&mut options.variation_count, 1..=MAX_VARIATIONS));
                });
                egui::ComboBox::from_label("Size")
                    .selected_text(options.image_size.as_deref().unwrap_or("Auto"))
                    .show_ui(ui, |ui| {
                        ui.selectable_value(&mut options.image_size, None, "Auto");
                        for size in IMAGE_SIZES {
                            ui.selectable_value(&mut options.image_size, Some(size.to_string()), *size);
                        }
                    });
            }
            OutputKind::Video => {
                ui.horizontal(|ui| {
                    ui.label("Duration:");
                    for seconds in VIDEO_DURATIONS {
                        ui.selectable_value(&mut options.duration_seconds, *seconds, format!("{seconds:.0}s"));
                    }
                });
                ui.checkbox(&mut options.with_audio, "Generate audio");
            }
        }
    });

    ui.add_space(4.0);
    ui.horizontal(|ui| {
        let can_generate = has_selection && !busy && !prompt.trim().is_empty();
        if ui.add_enabled(can_generate, egui::Button::new("✨ Generate")).clicked() {
            action = GenerateAction::Generate;
        }
        if ui
            .add_enabled(has_selection && !busy, egui::Button::new("⬆ Upscale 4K"))
            .clicked()
        {
            action = GenerateAction::Upscale;
        }
        if busy {
            ui.spinner();
        }
    });
    if !has_selection {
        ui.label(egui::RichText::new("Drag a selection on the canvas first").weak().small());
    }

    ui.add_space(8.0);
    ui.horizontal(|ui| {
        ui.label(format!("References ({}/{})", references.len(), MAX_REFERENCE_IMAGES));
        if ui
            .add_enabled(references.len() < MAX_REFERENCE_IMAGES, egui::Button::new("+"))
            .on_hover_text("Add reference images")
            .clicked()
        {
            action = GenerateAction::AddReferences;
        }
        if ui.add_enabled(!references.is_empty(), egui::Button::new("Clear")).clicked() {
            action = GenerateAction::ClearReferences;
        }
    });
    for (idx, bytes) in references.iter().enumerate() {
        ui.horizontal(|ui| {
            let dims = crate::io::media::image_size(bytes)
                .map(|(w, h)| format!("{w}×{h}"))
                .unwrap_or_else(|_| "unreadable".to_string());
            ui.label(format!("#{} {}", idx + 1, dims));
            if ui.small_button("🗑").clicked() {
                action = GenerateAction::RemoveReference(idx);
            }
        });
    }

    action
}
