// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Composite of the visible still layers under a selection.

use super::assets::AssetCache;
use super::surface::Surface;
use crate::error::StudioResult;
use crate::models::layer::Layer;
use crate::models::shapes::Rect;

fn intersects(a: &Rect, b: &Rect) -> bool {
    a.x < b.right() && b.x < a.right() && a.y < b.bottom() && b.y < a.bottom()
}

/// Render the layers under `selection` at 1:1 scale.
///
/// Only visible, non-video layers that overlap the selection take part, drawn
/// bottom to top. Returns `None` when nothing overlaps. Layers whose source
/// fails to load are skipped with a warning.
pub fn snapshot_selection(
    layers: &[Layer],
    selection: Rect,
    assets: &mut AssetCache,
) -> StudioResult<Option<Surface>> {
    let width = selection.w.round().max(1.0) as u32;
    let height = selection.h.round().max(1.0) as u32;

    let contributing: Vec<&Layer> = layers
        .iter()
        .rev()
        .filter(|l| l.visible && !l.is_video() && intersects(&l.bounds(), &selection))
        .collect();
    if contributing.is_empty() {
        return Ok(None);
    }

    let mut surface = Surface::new(width, height)?;
    let mut drawn = 0;
    for layer in contributing {
        let image = match assets.load(&layer.src) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Skipping layer '{}' in snapshot: {}", layer.name, e);
                continue;
            }
        };
        let dst = layer.bounds().translated(-selection.x, -selection.y);
        surface.draw_surface(&image, dst, layer.render_mode, layer.feather);
        drawn += 1;
    }

    Ok((drawn > 0).then_some(surface))
}
