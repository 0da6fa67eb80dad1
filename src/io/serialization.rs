// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Layer layout serialization and deserialization.
//!
//! A layout is the canvas size plus the full layer list. It is exported and
//! imported as YAML or JSON, picked by file extension.

use crate::models::project::LayoutDocument;
use anyhow::{bail, Result};
use std::path::Path;

/// Export a layout to YAML format.
pub fn export_yaml(doc: &LayoutDocument, path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(doc)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Export a layout to JSON format.
pub fn export_json(doc: &LayoutDocument, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(doc)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Import a layout from YAML format.
pub fn import_yaml(path: &Path) -> Result<LayoutDocument> {
    let yaml = std::fs::read_to_string(path)?;
    let doc = serde_yaml::from_str(&yaml)?;
    Ok(doc)
}

/// Import a layout from JSON format.
pub fn import_json(path: &Path) -> Result<LayoutDocument> {
    let json = std::fs::read_to_string(path)?;
    let doc = serde_json::from_str(&json)?;
    Ok(doc)
}

/// Export by extension (`.yaml`, `.yml` or `.json`).
pub fn export_layout(doc: &LayoutDocument, path: &Path) -> Result<()> {
    match extension(path).as_deref() {
        Some("yaml") | Some("yml") => export_yaml(doc, path),
        Some("json") => export_json(doc, path),
        other => bail!("Unsupported file extension: {:?}", other),
    }
}

/// Import by extension (`.yaml`, `.yml` or `.json`).
pub fn import_layout(path: &Path) -> Result<LayoutDocument> {
    match extension(path).as_deref() {
        Some("yaml") | Some("yml") => import_yaml(path),
        Some("json") => import_json(path),
        other => bail!("Unsupported file extension: {:?}", other),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::layer::{Layer, LayerKind};
    use crate::models::shapes::Rect;

    fn sample() -> LayoutDocument {
        let mut zone = Layer::new("zone", LayerKind::Generation, "/tmp/z.png", Rect::new(1.0, 2.0, 3.0, 4.0));
        zone.feather = 25.0;
        LayoutDocument {
            canvas_width: 1920,
            canvas_height: 1080,
            layers: vec![
                zone,
                Layer::new("clip", LayerKind::Video, "https://cdn/v.mp4", Rect::new(0.0, 0.0, 160.0, 90.0)),
            ],
        }
    }

    #[test]
    fn test_yaml_and_json_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let doc = sample();
        for name in ["layout.yaml", "layout.JSON"] {
            let path = dir.path().join(name);
            export_layout(&doc, &path).unwrap();
            let back = import_layout(&path).unwrap();
            assert_eq!(back.layers, doc.layers);
            assert_eq!(back.canvas_width, 1920);
        }
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(export_layout(&sample(), &dir.path().join("layout.txt")).is_err());
        assert!(import_layout(&dir.path().join("layout")).is_err());
    }
}
