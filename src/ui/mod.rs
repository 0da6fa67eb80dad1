// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! UI components for the Visualizae application.

pub mod canvas;
pub mod generate;
pub mod history;
pub mod properties;
pub mod studio;
pub mod textures;
pub mod toolbar;
