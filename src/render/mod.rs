// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

pub mod assets;
pub mod snapshot;
pub mod surface;
pub mod text;
