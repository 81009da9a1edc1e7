//! Test harness for engine operations.
//!
//! `EngineHarness` wraps an [`Engine`] over in-memory stores and adds:
//! - A1-string helpers for saving and reading cells
//! - a per-cell count of store writes, to check exactly-once recompute
//! - a watcher count, to check operations release what they register
//!
//! Use it to test engine behavior without spelling out `CellRef`s everywhere.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::cell::Cell;
use crate::config::EngineConfig;
use crate::engine::{Engine, EngineDelta};
use crate::formula::parser::parse_formula;
use crate::formula::{FormulaError, Value};
use crate::reference::CellRef;
use crate::store::memory::MemoryCellStore;
use crate::store::watch::Unregister;
use crate::store::{CellStore, EngineStores};

/// A cell with its expression already parsed, as the engine would store it.
pub fn formula_cell(a1: &str, text: &str) -> Cell {
    let mut cell = Cell::new(parse_ref(a1), text);
    cell.formula.expression = parse_formula(text).ok();
    cell
}

fn parse_ref(a1: &str) -> CellRef {
    a1.parse().unwrap_or_else(|e| panic!("bad reference {:?}: {}", a1, e))
}

type SaveCounts = Rc<RefCell<FxHashMap<CellRef, usize>>>;

pub struct EngineHarness {
    pub engine: Engine,
    cells: Rc<MemoryCellStore>,
    saves: SaveCounts,
    _counter: Unregister,
}

impl EngineHarness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let cells = Rc::new(MemoryCellStore::default());
        let stores = EngineStores { cells: cells.clone(), ..EngineStores::in_memory() };

        let saves: SaveCounts = Rc::default();
        let counts = saves.clone();
        let counter = cells.add_save_watcher(Rc::new(move |cell: &Cell| {
            *counts.borrow_mut().entry(cell.reference.normalized()).or_default() += 1;
        }));

        Self {
            engine: Engine::new(stores, config),
            cells,
            saves,
            _counter: counter,
        }
    }

    pub fn r(&self, a1: &str) -> CellRef {
        parse_ref(a1)
    }

    /// Save `text` at `a1`, panicking on a request error.
    pub fn set(&self, a1: &str, text: &str) -> EngineDelta {
        self.engine
            .save_cell(Cell::new(self.r(a1), text))
            .unwrap_or_else(|e| panic!("save {} failed: {}", a1, e))
    }

    pub fn cell(&self, a1: &str) -> Option<Cell> {
        self.cells.load(self.r(a1))
    }

    /// Stored text, or "" for an empty cell.
    pub fn text(&self, a1: &str) -> String {
        self.cell(a1).map(|cell| cell.formula.text).unwrap_or_default()
    }

    pub fn value(&self, a1: &str) -> Option<Value> {
        self.cell(a1).and_then(|cell| cell.formula.value)
    }

    pub fn error(&self, a1: &str) -> Option<FormulaError> {
        self.cell(a1).and_then(|cell| cell.formula.error)
    }

    /// Store writes to `a1` since the harness was built or last reset.
    pub fn save_count(&self, a1: &str) -> usize {
        self.saves.borrow().get(&self.r(a1)).copied().unwrap_or(0)
    }

    pub fn reset_saves(&self) {
        self.saves.borrow_mut().clear();
    }

    /// Save and delete watchers on the cell store, the harness' counter included.
    pub fn cell_watchers(&self) -> usize {
        self.cells.watcher_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_saves_per_cell() {
        let h = EngineHarness::new();
        h.set("A1", "1");
        h.set("$A$1", "2");
        h.set("B1", "=A1");
        assert_eq!(h.save_count("A1"), 2);
        assert_eq!(h.save_count("B1"), 1);

        h.reset_saves();
        assert_eq!(h.save_count("A1"), 0);
    }

    #[test]
    fn test_formula_cell_is_parsed() {
        let cell = formula_cell("C3", "=A1+1");
        assert!(cell.formula.expression.is_some());
        assert_eq!(cell.reference, "C3".parse().unwrap());
    }
}
