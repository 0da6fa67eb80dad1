// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Studio mode: scene timeline and movie export.

pub mod export;
pub mod timeline;
