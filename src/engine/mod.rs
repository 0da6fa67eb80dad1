// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Canvas editing engine: layers, viewport, input handling and the
//! operations that create layers.

pub mod generation;
pub mod interaction;
pub mod layers;
pub mod polygon;
pub mod viewport;
