// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! I/O operations for media, ffmpeg, layouts and the project store.

pub mod ffmpeg;
pub mod media;
pub mod serialization;
pub mod store;
