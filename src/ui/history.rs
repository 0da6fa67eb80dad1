// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Recent projects window.

use crate::models::project::ProjectSummary;
use crate::render::assets::AssetCache;
use crate::ui::textures::TextureCache;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryAction {
    None,
    Open(String),
    Rename(String, String),
    Delete(String),
    NewProject,
}

/// Rename in progress: project id and the edited name.
#[derive(Default)]
pub struct HistoryState {
    renaming: Option<(String, String)>,
}

fn age(updated_at: u64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(updated_at);
    let secs = now.saturating_sub(updated_at);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{} min ago", secs / 60),
        3600..=86_399 => format!("{} h ago", secs / 3600),
        _ => format!("{} d ago", secs / 86_400),
    }
}

/// Display the project list inside a window.
pub fn show(
    ctx: &egui::Context,
    open: &mut bool,
    projects: &[ProjectSummary],
    current: Option<&str>,
    state: &mut HistoryState,
    textures: &mut TextureCache,
    assets: &mut AssetCache,
) -> HistoryAction {
    let mut action = HistoryAction::None;

    egui::Window::new("Projects")
        .open(open)
        .default_width(360.0)
        .show(ctx, |ui| {
            if ui.button("➕ New project").clicked() {
                action = HistoryAction::NewProject;
            }
            ui.separator();

            if projects.is_empty() {
                ui.label("No saved projects");
                return;
            }

            egui::ScrollArea::vertical().show(ui, |ui| {
                for project in projects {
                    ui.horizontal(|ui| {
                        if let Some(texture) = project
                            .thumbnail
                            .as_deref()
                            .and_then(|src| textures.get(ui.ctx(), src, assets))
                        {
                            ui.add(egui::Image::new((texture.id(), egui::vec2(64.0, 36.0))));
                        }

                        ui.vertical(|ui| {
                            match &mut state.renaming {
                                Some((id, name)) if *id == project.id => {
                                    let response = ui.text_edit_singleline(name);
                                    if response.lost_focus() {
                                        if !name.trim().is_empty() {
                                            action = HistoryAction::Rename(id.clone(), name.trim().to_string());
                                        }
                                        state.renaming = None;
                                    } else {
                                        response.request_focus();
                                    }
                                }
                                _ => {
                                    let is_current = current == Some(project.id.as_str());
                                    let title = if is_current {
                                        egui::RichText::new(&project.name).strong()
                                    } else {
                                        egui::RichText::new(&project.name)
                                    };
                                    ui.label(title);
                                }
                            }
                            ui.label(
                                egui::RichText::new(format!(
                                    "{} layers · {} scenes · {}",
                                    project.layer_count,
                                    project.scene_count,
                                    age(project.updated_at)
                                ))
                                .small()
                                .weak(),
                            );
                        });

                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if ui.small_button("🗑").clicked() {
                                action = HistoryAction::Delete(project.id.clone());
                            }
                            if ui.small_button("✏").clicked() {
                                state.renaming = Some((project.id.clone(), project.name.clone()));
                            }
                            if ui.small_button("Open").clicked() {
                                action = HistoryAction::Open(project.id.clone());
                            }
                        });
                    });
                    ui.separator();
                }
            });
        });

    action
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_buckets() {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        assert_eq!(age(now), "just now");
        assert_eq!(age(now - 120), "2 min ago");
        assert_eq!(age(now - 7200), "2 h ago");
        assert_eq!(age(now - 3 * 86_400), "3 d ago");
    }
}
