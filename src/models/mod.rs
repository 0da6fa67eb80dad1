// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Data model: geometry values, layers, scenes and projects.

pub mod layer;
pub mod project;
pub mod scene;
pub mod shapes;
