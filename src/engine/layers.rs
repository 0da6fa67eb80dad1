// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Layer store with snapshot-based undo/redo.
//!
//! The layer list is ordered topmost-first. Every destructive edit first
//! pushes a snapshot of the whole list onto the undo stack, which also
//! clears the redo stack.

use crate::models::layer::Layer;
use crate::models::shapes::Point;
use uuid::Uuid;

/// History system for undo/redo functionality.
#[derive(Debug)]
struct History {
    /// Undo stack (past states)
    undo_stack: Vec<Vec<Layer>>,
    /// Redo stack (future states after undo)
    redo_stack: Vec<Vec<Layer>>,
    /// Maximum history size
    max_size: usize,
}

impl History {
    fn new(max_size: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_size,
        }
    }

    /// Save current state before making a change
    fn push(&mut self, layers: Vec<Layer>) {
        self.undo_stack.push(layers);
        if self.undo_stack.len() > self.max_size {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
    }

    /// Undo: restore previous state
    fn undo(&mut self, current: Vec<Layer>) -> Option<Vec<Layer>> {
        let previous = self.undo_stack.pop()?;
        self.redo_stack.push(current);
        Some(previous)
    }

    /// Redo: restore next state
    fn redo(&mut self, current: Vec<Layer>) -> Option<Vec<Layer>> {
        let next = self.redo_stack.pop()?;
        self.undo_stack.push(current);
        Some(next)
    }

    fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

/// Ordered layer collection, index 0 topmost.
#[derive(Debug)]
pub struct LayerStore {
    layers: Vec<Layer>,
    history: History,
}

impl Default for LayerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerStore {
    /// Number of snapshots kept on the undo stack.
    pub const HISTORY_LIMIT: usize = 50;

    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            history: History::new(Self::HISTORY_LIMIT),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Mutable access without recording history; callers that start a
    /// gesture call [`LayerStore::checkpoint`] once beforehand.
    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn index_of(&self, id: Uuid) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    /// Record the current list on the undo stack.
    pub fn checkpoint(&mut self) {
        self.history.push(self.layers.clone());
    }

    /// Replace everything, e.g. after loading a project. History is dropped.
    pub fn replace_all(&mut self, layers: Vec<Layer>) {
        self.layers = layers;
        self.history.clear();
    }

    /// Insert a layer on top.
    pub fn push_top(&mut self, layer: Layer) {
        self.checkpoint();
        log::info!("Added layer '{}', total: {}", layer.name, self.layers.len() + 1);
        self.layers.insert(0, layer);
    }

    /// Remove a layer by id.
    pub fn remove(&mut self, id: Uuid) -> Option<Layer> {
        let idx = self.index_of(id)?;
        self.checkpoint();
        let removed = self.layers.remove(idx);
        log::info!("Deleted layer '{}', total: {}", removed.name, self.layers.len());
        Some(removed)
    }

    /// Apply an edit to one layer, recording history first.
    pub fn update(&mut self, id: Uuid, edit: impl FnOnce(&mut Layer)) -> bool {
        if self.index_of(id).is_none() {
            return false;
        }
        self.checkpoint();
        match self.get_mut(id) {
            Some(layer) => {
                edit(layer);
                true
            }
            None => false,
        }
    }

    /// Copy a layer and place the copy directly above the original.
    pub fn duplicate(&mut self, id: Uuid) -> Option<Uuid> {
        let idx = self.index_of(id)?;
        self.checkpoint();
        let mut copy = self.layers[idx].clone();
        copy.id = Uuid::new_v4();
        copy.name = format!("{} copy", copy.name);
        let new_id = copy.id;
        self.layers.insert(idx, copy);
        Some(new_id)
    }

    /// Move a layer to a new index in the list (0 = topmost).
    pub fn reorder(&mut self, id: Uuid, new_index: usize) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let target = new_index.min(self.layers.len() - 1);
        if target == idx {
            return false;
        }
        self.checkpoint();
        let layer = self.layers.remove(idx);
        self.layers.insert(target, layer);
        true
    }

    /// Move one step towards the top.
    pub fn raise(&mut self, id: Uuid) -> bool {
        match self.index_of(id) {
            Some(idx) if idx > 0 => self.reorder(id, idx - 1),
            _ => false,
        }
    }

    /// Move one step towards the bottom.
    pub fn lower(&mut self, id: Uuid) -> bool {
        match self.index_of(id) {
            Some(idx) => self.reorder(id, idx + 1),
            None => false,
        }
    }

    /// Topmost layer containing `p` that satisfies `accept`.
    pub fn topmost_hit(&self, p: Point, accept: impl Fn(&Layer) -> bool) -> Option<Uuid> {
        self.layers
            .iter()
            .find(|l| accept(l) && l.contains(p))
            .map(|l| l.id)
    }

    pub fn can_undo(&self) -> bool {
        !self.history.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.history.redo_stack.is_empty()
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo(self.layers.clone()) {
            Some(previous) => {
                self.layers = previous;
                log::info!("Undo");
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo(self.layers.clone()) {
            Some(next) => {
                self.layers = next;
                log::info!("Redo");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::layer::LayerKind;
    use crate::models::shapes::Rect;

    fn layer(name: &str, x: f64) -> Layer {
        Layer::new(name, LayerKind::Image, format!("{name}.png"), Rect::new(x, 0.0, 100.0, 100.0))
    }

    #[test]
    fn test_push_top_orders_newest_first() {
        let mut store = LayerStore::new();
        store.push_top(layer("a", 0.0));
        store.push_top(layer("b", 0.0));
        let names: Vec<_> = store.layers().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_undo_then_redo_restores_exact_list() {
        let mut store = LayerStore::new();
        store.push_top(layer("a", 0.0));
        store.push_top(layer("b", 10.0));
        let id = store.layers()[1].id;
        store.update(id, |l| l.x = 42.0);
        let after_edit = store.layers().to_vec();

        assert!(store.undo());
        assert_eq!(store.get(id).unwrap().x, 0.0);
        assert!(store.redo());
        assert_eq!(store.layers(), after_edit.as_slice());
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let mut store = LayerStore::new();
        store.push_top(layer("a", 0.0));
        store.push_top(layer("b", 0.0));
        assert!(store.undo());
        assert!(store.can_redo());

        store.push_top(layer("c", 0.0));
        assert!(!store.can_redo());
        let before = store.layers().to_vec();
        assert!(!store.redo());
        assert_eq!(store.layers(), before.as_slice());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut store = LayerStore::new();
        for i in 0..(LayerStore::HISTORY_LIMIT + 10) {
            store.push_top(layer(&format!("l{i}"), 0.0));
        }
        let mut undone = 0;
        while store.undo() {
            undone += 1;
        }
        assert_eq!(undone, LayerStore::HISTORY_LIMIT);
    }

    #[test]
    fn test_reorder_and_hit_test() {
        let mut store = LayerStore::new();
        store.push_top(layer("bottom", 0.0));
        store.push_top(layer("top", 50.0));
        let top = store.layers()[0].id;
        let bottom = store.layers()[1].id;

        assert_eq!(store.topmost_hit(Point::new(60.0, 10.0), |_| true), Some(top));
        assert_eq!(store.topmost_hit(Point::new(10.0, 10.0), |_| true), Some(bottom));
        assert_eq!(store.topmost_hit(Point::new(60.0, 10.0), |l| l.id != top), Some(bottom));

        assert!(store.lower(top));
        assert_eq!(store.layers()[1].id, top);
        assert!(!store.lower(top));
        assert!(store.raise(top));
        assert_eq!(store.layers()[0].id, top);
    }

    #[test]
    fn test_duplicate_and_remove() {
        let mut store = LayerStore::new();
        store.push_top(layer("a", 0.0));
        let id = store.layers()[0].id;
        let copy = store.duplicate(id).unwrap();
        assert_eq!(store.layers()[0].id, copy);
        assert_eq!(store.layers()[0].name, "a copy");
        assert!(store.remove(id).is_some());
        assert_eq!(store.len(), 1);
        assert!(store.remove(id).is_none());
    }
}
