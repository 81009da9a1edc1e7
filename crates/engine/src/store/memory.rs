//! In-memory entity stores.
//!
//! Every store updates its map, releases the borrow, then fires watchers.

use std::cell::RefCell;
use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use super::watch::{Unregister, Watcher, Watchers};
use super::{CellStore, HeaderStore, LabelStore};
use crate::axis::Header;
use crate::cell::Cell;
use crate::label::{LabelMapping, LabelName};
use crate::reference::{CellRange, CellRef};

/// Cells keyed by normalized reference, in row-major order.
#[derive(Default)]
pub struct MemoryCellStore {
    cells: RefCell<BTreeMap<CellRef, Cell>>,
    saved: Watchers<Cell>,
    deleted: Watchers<CellRef>,
}

impl MemoryCellStore {
    pub fn len(&self) -> usize {
        self.cells.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.borrow().is_empty()
    }

    /// Registered save and delete watchers, for leak checks.
    pub fn watcher_count(&self) -> usize {
        self.saved.len() + self.deleted.len()
    }
}

impl CellStore for MemoryCellStore {
    fn load(&self, cell: CellRef) -> Option<Cell> {
        self.cells.borrow().get(&cell.normalized()).cloned()
    }

    fn save(&self, mut cell: Cell) -> Cell {
        cell.reference = cell.reference.normalized();
        self.cells.borrow_mut().insert(cell.reference, cell.clone());
        self.saved.fire(&cell);
        cell
    }

    fn delete(&self, cell: CellRef) {
        let key = cell.normalized();
        let removed = self.cells.borrow_mut().remove(&key);
        if removed.is_some() {
            self.deleted.fire(&key);
        }
    }

    fn load_range(&self, range: CellRange) -> Vec<Cell> {
        let (begin, end) = (range.begin().normalized(), range.end().normalized());
        self.cells
            .borrow()
            .range(CellRef::at(0, begin.row.value)..=CellRef::at(u32::MAX, end.row.value))
            .filter(|(key, _)| range.contains(**key))
            .map(|(_, cell)| cell.clone())
            .collect()
    }

    fn all(&self) -> Vec<Cell> {
        self.cells.borrow().values().cloned().collect()
    }

    fn add_save_watcher(&self, watcher: Watcher<Cell>) -> Unregister {
        self.saved.add(watcher)
    }

    fn add_delete_watcher(&self, watcher: Watcher<CellRef>) -> Unregister {
        self.deleted.add(watcher)
    }
}

/// Label mappings keyed by case-insensitive name.
#[derive(Default)]
pub struct MemoryLabelStore {
    labels: RefCell<FxHashMap<LabelName, LabelMapping>>,
    saved: Watchers<LabelMapping>,
    deleted: Watchers<LabelName>,
}

impl MemoryLabelStore {
    pub fn watcher_count(&self) -> usize {
        self.saved.len() + self.deleted.len()
    }
}

impl LabelStore for MemoryLabelStore {
    fn load(&self, label: &LabelName) -> Option<LabelMapping> {
        self.labels.borrow().get(label).cloned()
    }

    fn save(&self, mapping: LabelMapping) -> LabelMapping {
        {
            let mut labels = self.labels.borrow_mut();
            // Renaming only the case replaces the old spelling
            labels.remove(&mapping.label);
            labels.insert(mapping.label.clone(), mapping.clone());
        }
        self.saved.fire(&mapping);
        mapping
    }

    fn delete(&self, label: &LabelName) {
        let removed = self.labels.borrow_mut().remove(label);
        if let Some(mapping) = removed {
            self.deleted.fire(&mapping.label);
        }
    }

    fn all(&self) -> Vec<LabelMapping> {
        let mut all: Vec<LabelMapping> = self.labels.borrow().values().cloned().collect();
        all.sort_by(|a, b| a.label.cmp(&b.label));
        all
    }

    fn add_save_watcher(&self, watcher: Watcher<LabelMapping>) -> Unregister {
        self.saved.add(watcher)
    }

    fn add_delete_watcher(&self, watcher: Watcher<LabelName>) -> Unregister {
        self.deleted.add(watcher)
    }
}

/// Column or row headers keyed by index.
#[derive(Default)]
pub struct MemoryHeaderStore {
    headers: RefCell<BTreeMap<u32, Header>>,
    saved: Watchers<Header>,
    deleted: Watchers<u32>,
}

impl HeaderStore for MemoryHeaderStore {
    fn load(&self, index: u32) -> Option<Header> {
        self.headers.borrow().get(&index).cloned()
    }

    fn save(&self, header: Header) -> Header {
        self.headers.borrow_mut().insert(header.index, header.clone());
        self.saved.fire(&header);
        header
    }

    fn delete(&self, index: u32) {
        let removed = self.headers.borrow_mut().remove(&index);
        if removed.is_some() {
            self.deleted.fire(&index);
        }
    }

    fn all(&self) -> Vec<Header> {
        self.headers.borrow().values().cloned().collect()
    }

    fn add_save_watcher(&self, watcher: Watcher<Header>) -> Unregister {
        self.saved.add(watcher)
    }

    fn add_delete_watcher(&self, watcher: Watcher<u32>) -> Unregister {
        self.deleted.add(watcher)
    }
}
