// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Decoded image cache keyed by layer source.

use super::surface::Surface;
use crate::error::{StudioError, StudioResult};
use crate::io::media;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Decoded layer images plus the directory generated assets are written to.
#[derive(Debug)]
pub struct AssetCache {
    dir: PathBuf,
    images: HashMap<String, Arc<Surface>>,
}

impl AssetCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            images: HashMap::new(),
        }
    }

    fn get(&self, src: &str) -> Option<Arc<Surface>> {
        self.images.get(src).cloned()
    }

    pub fn insert(&mut self, src: impl Into<String>, surface: Surface) -> Arc<Surface> {
        let surface = Arc::new(surface);
        self.images.insert(src.into(), Arc::clone(&surface));
        surface
    }

    /// Return the decoded image for `src`, loading it on first use.
    pub fn load(&mut self, src: &str) -> StudioResult<Arc<Surface>> {
        if let Some(surface) = self.get(src) {
            return Ok(surface);
        }
        let bytes = media::load_source_bytes(src)?;
        let surface = Surface::decode(&bytes)?;
        log::debug!("Cached {}x{} image for {}", surface.width(), surface.height(), short(src));
        Ok(self.insert(src, surface))
    }

    /// Write encoded image bytes as a new asset file and cache its pixels.
    /// Returns the source string to put on the layer.
    pub fn store_png(&mut self, bytes: &[u8]) -> StudioResult<String> {
        let surface = Surface::decode(bytes)?;
        let src = self.write_asset(bytes)?;
        self.insert(src.clone(), surface);
        Ok(src)
    }

    /// Same as [`AssetCache::store_png`] for an already rendered surface.
    pub fn store_surface(&mut self, surface: Surface) -> StudioResult<String> {
        let src = self.write_asset(&surface.encode_png()?)?;
        self.insert(src.clone(), surface);
        Ok(src)
    }

    fn write_asset(&self, bytes: &[u8]) -> StudioResult<String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| StudioError::local(format!("failed to create {}: {e}", self.dir.display())))?;
        let path = self.dir.join(format!("{}.png", Uuid::new_v4()));
        std::fs::write(&path, bytes)
            .map_err(|e| StudioError::local(format!("failed to write {}: {e}", path.display())))?;
        Ok(path.to_string_lossy().into_owned())
    }

    pub fn forget(&mut self, src: &str) {
        self.images.remove(src);
    }
}

/// Truncate long sources (data URLs) for logging.
fn short(src: &str) -> &str {
    match src.char_indices().nth(64) {
        Some((idx, _)) => &src[..idx],
        None => src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::surface::Rgba;

    #[test]
    fn test_store_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = AssetCache::new(dir.path());
        let mut surface = Surface::new(4, 3).unwrap();
        surface.clear(Rgba::WHITE);

        let src = cache.store_surface(surface).unwrap();
        assert!(std::path::Path::new(&src).exists());

        let mut fresh = AssetCache::new(dir.path());
        let loaded = fresh.load(&src).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (4, 3));
    }

    #[test]
    fn test_missing_source_is_local_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = AssetCache::new(dir.path());
        let missing = dir.path().join("nope.png");
        assert!(cache.load(missing.to_str().unwrap()).is_err());
    }
}
