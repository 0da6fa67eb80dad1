// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! egui textures for layer and frame images.

use crate::render::assets::AssetCache;
use std::collections::{HashMap, HashSet};

/// Uploaded textures keyed by source string.
#[derive(Default)]
pub struct TextureCache {
    textures: HashMap<String, egui::TextureHandle>,
    failed: HashSet<String>,
}

impl TextureCache {
    /// Texture for `src`, decoding and uploading it on first use. Sources
    /// that fail to load are remembered and not retried.
    pub fn get(&mut self, ctx: &egui::Context, src: &str, assets: &mut AssetCache) -> Option<egui::TextureHandle> {
        if let Some(texture) = self.textures.get(src) {
            return Some(texture.clone());
        }
        if self.failed.contains(src) {
            return None;
        }
        match assets.load(src) {
            Ok(surface) => {
                let size = [surface.width() as usize, surface.height() as usize];
                let image = egui::ColorImage::from_rgba_unmultiplied(size, &surface.to_rgba());
                let texture = ctx.load_texture(src, image, egui::TextureOptions::LINEAR);
                self.textures.insert(src.to_string(), texture.clone());
                Some(texture)
            }
            Err(e) => {
                log::error!("Failed to load image for display: {}", e);
                self.failed.insert(src.to_string());
                None
            }
        }
    }

    pub fn forget(&mut self, src: &str) {
        self.textures.remove(src);
        self.failed.remove(src);
    }
}
