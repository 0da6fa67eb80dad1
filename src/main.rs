// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Visualizae - visual compositing canvas
//!
//! A desktop editor for arranging image and video layers, generating new
//! content into canvas selections through a remote generation service and
//! chaining generated clips into a movie in the studio timeline.

mod api;
mod app;
mod config;
mod engine;
mod error;
mod io;
mod models;
mod render;
mod studio;
mod ui;
mod util;

use anyhow::Result;
use app::VisualizaeApp;
use config::AppConfig;

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let config = AppConfig::load();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1440.0, 900.0])
            .with_min_inner_size([960.0, 600.0])
            .with_drag_and_drop(true)
            .with_title("Visualizae"),
        ..Default::default()
    };

    eframe::run_native(
        "Visualizae",
        options,
        Box::new(|_cc| Ok(Box::new(VisualizaeApp::new(config)))),
    )
    .map_err(|e| anyhow::anyhow!("Application error: {}", e))?;

    Ok(())
}
