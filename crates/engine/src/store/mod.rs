//! Store collaborators.
//!
//! The engine never owns grid state. It reads and writes cells, labels and
//! headers through these traits and keeps dependency edges in three edge
//! stores. [`memory`] and [`references`] provide in-memory implementations.
//!
//! Stores use `&self` receivers and interior mutability: watchers fire from
//! inside `save`/`delete` and call straight back into the stores.

use std::collections::BTreeSet;
use std::rc::Rc;

use crate::axis::Header;
use crate::cell::Cell;
use crate::label::{LabelMapping, LabelName};
use crate::reference::{CellRange, CellRef};

pub mod memory;
pub mod references;
pub mod watch;

pub use watch::{Unregister, Watcher, Watchers};

pub trait CellStore {
    fn load(&self, cell: CellRef) -> Option<Cell>;

    /// Store `cell` under its normalized reference and fire save watchers.
    fn save(&self, cell: Cell) -> Cell;

    /// Remove the cell and fire delete watchers. Deleting an empty coordinate
    /// does nothing.
    fn delete(&self, cell: CellRef);

    /// Existing cells inside `range`, row-major.
    fn load_range(&self, range: CellRange) -> Vec<Cell>;

    /// Every existing cell, row-major.
    fn all(&self) -> Vec<Cell>;

    fn add_save_watcher(&self, watcher: Watcher<Cell>) -> Unregister;

    fn add_delete_watcher(&self, watcher: Watcher<CellRef>) -> Unregister;
}

pub trait LabelStore {
    fn load(&self, label: &LabelName) -> Option<LabelMapping>;

    fn save(&self, mapping: LabelMapping) -> LabelMapping;

    fn delete(&self, label: &LabelName);

    fn all(&self) -> Vec<LabelMapping>;

    fn add_save_watcher(&self, watcher: Watcher<LabelMapping>) -> Unregister;

    fn add_delete_watcher(&self, watcher: Watcher<LabelName>) -> Unregister;
}

/// Column or row headers, keyed by index.
pub trait HeaderStore {
    fn load(&self, index: u32) -> Option<Header>;

    fn save(&self, header: Header) -> Header;

    fn delete(&self, index: u32);

    fn all(&self) -> Vec<Header>;

    fn add_save_watcher(&self, watcher: Watcher<Header>) -> Unregister;

    fn add_delete_watcher(&self, watcher: Watcher<u32>) -> Unregister;
}

/// Edges from a target (cell or label) to the cells whose formulas mention it.
pub trait ReferenceStore<T> {
    fn add_reference(&self, target: T, referrer: CellRef);

    fn remove_reference(&self, target: &T, referrer: CellRef);

    /// Cells whose formulas mention `target`.
    fn load_referrers(&self, target: &T) -> BTreeSet<CellRef>;

    /// Targets `referrer`'s formula mentions.
    fn load_references(&self, referrer: CellRef) -> Vec<T>;

    /// Drop every edge out of `referrer`.
    fn remove_referrer(&self, referrer: CellRef);
}

/// Edges from ranges to the cells whose formulas mention them.
pub trait RangeReferenceStore {
    fn add_value(&self, range: CellRange, referrer: CellRef);

    fn remove_value(&self, range: &CellRange, referrer: CellRef);

    /// Cells whose formulas mention `range`.
    fn load(&self, range: &CellRange) -> BTreeSet<CellRef>;

    /// Every referenced range that contains `cell`.
    fn ranges_containing(&self, cell: CellRef) -> Vec<CellRange>;

    fn remove_referrer(&self, referrer: CellRef);
}

/// Every store an engine works against. Cloning shares the stores.
#[derive(Clone)]
pub struct EngineStores {
    pub cells: Rc<dyn CellStore>,
    pub labels: Rc<dyn LabelStore>,
    pub columns: Rc<dyn HeaderStore>,
    pub rows: Rc<dyn HeaderStore>,
    pub cell_references: Rc<dyn ReferenceStore<CellRef>>,
    pub label_references: Rc<dyn ReferenceStore<LabelName>>,
    pub range_references: Rc<dyn RangeReferenceStore>,
}

impl EngineStores {
    pub fn in_memory() -> Self {
        Self {
            cells: Rc::new(memory::MemoryCellStore::default()),
            labels: Rc::new(memory::MemoryLabelStore::default()),
            columns: Rc::new(memory::MemoryHeaderStore::default()),
            rows: Rc::new(memory::MemoryHeaderStore::default()),
            cell_references: Rc::new(references::MemoryReferenceStore::<CellRef>::default()),
            label_references: Rc::new(references::MemoryReferenceStore::<LabelName>::default()),
            range_references: Rc::new(references::MemoryRangeReferenceStore::default()),
        }
    }

    /// Remove every edge out of `referrer`, across all three edge stores.
    pub fn remove_referrer(&self, referrer: CellRef) {
        self.cell_references.remove_referrer(referrer);
        self.label_references.remove_referrer(referrer);
        self.range_references.remove_referrer(referrer);
    }
}

impl std::fmt::Debug for EngineStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineStores").finish_non_exhaustive()
    }
}
