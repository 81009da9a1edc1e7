//! Copy and fill.
//!
//! The source block is tiled across the destination. Relative references in
//! each pasted formula move by the distance between its source and destination
//! coordinates; absolute references stay put.

use rustc_hash::FxHashMap;

use super::{Engine, EngineDelta};
use crate::cell::{Cell, Formula};
use crate::changes::ChangesMode;
use crate::error::EngineError;
use crate::formula::fixer::OffsetFixer;
use crate::reference::{CellRange, CellRef};

/// One destination coordinate: either a pasted cell or a cleared one.
#[derive(Debug)]
enum Paste {
    Cell(Cell),
    Clear(CellRef),
}

impl Engine {
    /// Paste `cells` at `to`, using their bounding range as the source block.
    /// With no cells, `to` is cleared.
    pub fn copy_cells(&self, cells: Vec<Cell>, to: CellRange) -> Result<EngineDelta, EngineError> {
        match CellRange::bounding(cells.iter().map(|cell| cell.reference)) {
            Some(from) => self.fill_cells(cells, from, to),
            None => {
                self.check_range(to)?;
                self.clear_range(to.normalized())
            }
        }
    }

    /// Tile the block `from`, whose contents are `cells`, across `to`.
    ///
    /// Each tile is `from`'s size. The first tile is always pasted whole; the
    /// rest are clipped to `to`. Coordinates of `from` with no cell in `cells`
    /// are cleared at their destinations. With no cells at all, `to` is cleared.
    pub fn fill_cells(&self, cells: Vec<Cell>, from: CellRange, to: CellRange) -> Result<EngineDelta, EngineError> {
        self.check_range(from)?;
        self.check_range(to)?;
        let (from, to) = (from.normalized(), to.normalized());
        for cell in &cells {
            if !from.contains(cell.reference) {
                return Err(EngineError::CellOutsideSource {
                    cell: cell.reference.to_string(),
                    range: from.to_string(),
                });
            }
        }
        if cells.is_empty() {
            return self.clear_range(to);
        }

        let sources: FxHashMap<CellRef, Cell> = cells
            .into_iter()
            .map(|cell| (cell.reference.normalized(), cell))
            .collect();
        let pastes = self.plan_pastes(&sources, from, to)?;
        log::debug!("fill {} -> {}: {} destination cells", from, to, pastes.len());

        let changes = self.changes(ChangesMode::Batch);
        for paste in pastes {
            match paste {
                Paste::Clear(reference) => {
                    self.stores.cells.delete(reference);
                    changes.check_fault()?;
                }
                Paste::Cell(cell) => {
                    let reference = cell.reference;
                    self.stores.cells.save(cell);
                    changes.check_fault()?;
                    changes.force_refresh(reference)?;
                }
            }
        }
        self.drain(&changes)?;
        Ok(changes.into_delta())
    }

    fn plan_pastes(
        &self,
        sources: &FxHashMap<CellRef, Cell>,
        from: CellRange,
        to: CellRange,
    ) -> Result<Vec<Paste>, EngineError> {
        let (width, height) = (from.width(), from.height());
        let columns = to.width().div_ceil(width).max(1);
        let rows = to.height().div_ceil(height).max(1);
        let (last_column, last_row) = (self.config.last_column(), self.config.last_row());
        let origin = from.begin();
        let mut pastes = Vec::new();

        for tile_row in 0..rows {
            for tile_column in 0..columns {
                let first_tile = tile_row == 0 && tile_column == 0;
                for source in from.cells() {
                    let column = u64::from(to.begin().column.value)
                        + u64::from(tile_column) * u64::from(width)
                        + u64::from(source.column.value - origin.column.value);
                    let row = u64::from(to.begin().row.value)
                        + u64::from(tile_row) * u64::from(height)
                        + u64::from(source.row.value - origin.row.value);
                    if column > u64::from(last_column) || row > u64::from(last_row) {
                        continue;
                    }
                    let destination = CellRef::at(column as u32, row as u32);
                    if !first_tile && !to.contains(destination) {
                        continue;
                    }

                    let Some(cell) = sources.get(&source) else {
                        pastes.push(Paste::Clear(destination));
                        continue;
                    };
                    let fixer = OffsetFixer {
                        dx: i64::from(destination.column.value) - i64::from(source.column.value),
                        dy: i64::from(destination.row.value) - i64::from(source.row.value),
                        last_column,
                        last_row,
                    };
                    let pasted = Formula::new(cell.formula.text.clone());
                    let mut formula = self.rewrite_formula(&pasted, &fixer)?.unwrap_or(pasted);
                    formula.clear_result();
                    pastes.push(Paste::Cell(Cell::with_formula(destination, formula)));
                }
            }
        }
        Ok(pastes)
    }

    fn clear_range(&self, range: CellRange) -> Result<EngineDelta, EngineError> {
        log::debug!("clear {}", range);
        let changes = self.changes(ChangesMode::Batch);
        for cell in self.stores.cells.load_range(range) {
            self.stores.cells.delete(cell.reference);
            changes.check_fault()?;
        }
        self.drain(&changes)?;
        Ok(changes.into_delta())
    }
}

#[cfg(test)]
mod tests {
    use crate::cell::Cell;
    use crate::error::EngineError;
    use crate::formula::{ErrorKind, Value};
    use crate::harness::EngineHarness;
    use crate::reference::CellRange;

    fn range(h: &EngineHarness, a: &str, b: &str) -> CellRange {
        CellRange::new(h.r(a), h.r(b))
    }

    #[test]
    fn test_fill_shifts_relative_references() {
        let h = EngineHarness::new();
        h.set("A1", "1");
        h.set("A2", "2");
        h.set("A3", "3");
        let source = vec![Cell::new(h.r("B1"), "=A1+1")];

        let delta = h.engine.fill_cells(source, range(&h, "B1", "B1"), range(&h, "B1", "B3")).unwrap();
        assert_eq!(h.text("B2"), "=A2+1");
        assert_eq!(h.text("B3"), "=A3+1");
        assert_eq!(h.value("B3"), Some(Value::Number(4.0)));
        assert_eq!(delta.cells.len(), 3);
    }

    #[test]
    fn test_fill_keeps_absolute_references() {
        let h = EngineHarness::new();
        h.set("A1", "5");
        let source = vec![Cell::new(h.r("B1"), "=$A$1*2")];

        h.engine.fill_cells(source, range(&h, "B1", "B1"), range(&h, "C1", "E1")).unwrap();
        for a1 in ["C1", "D1", "E1"] {
            assert_eq!(h.text(a1), "=$A$1*2");
            assert_eq!(h.value(a1), Some(Value::Number(10.0)));
        }
    }

    #[test]
    fn test_fill_clips_later_tiles() {
        let h = EngineHarness::new();
        let source = vec![Cell::new(h.r("A1"), "1"), Cell::new(h.r("A2"), "2")];

        h.engine.fill_cells(source, range(&h, "A1", "A2"), range(&h, "C1", "C3")).unwrap();
        assert_eq!(h.value("C1"), Some(Value::Number(1.0)));
        assert_eq!(h.value("C3"), Some(Value::Number(1.0)));
        assert_eq!(h.cell("C4"), None);
    }

    #[test]
    fn test_fill_first_tile_is_whole() {
        let h = EngineHarness::new();
        let source = vec![Cell::new(h.r("A1"), "1"), Cell::new(h.r("B1"), "2")];

        h.engine.fill_cells(source, range(&h, "A1", "B1"), range(&h, "D1", "D1")).unwrap();
        assert_eq!(h.value("E1"), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_copy_clears_gaps_and_recomputes_readers() {
        let h = EngineHarness::new();
        h.set("E5", "3");
        h.set("F7", "=E5+D6");
        let source = vec![Cell::new(h.r("A1"), "=B1*2"), Cell::new(h.r("B2"), "x")];

        let delta = h.engine.copy_cells(source, range(&h, "D5", "D5")).unwrap();
        assert_eq!(h.text("D5"), "=E5*2");
        assert_eq!(h.value("E6"), Some(Value::Text("x".into())));
        assert_eq!(delta.deleted_cells, vec![h.r("E5")]);
        assert_eq!(h.value("D5"), Some(Value::Number(0.0)));
        assert_eq!(h.value("F7"), Some(Value::Number(0.0)));
    }

    #[test]
    fn test_copy_off_grid_reference_is_marker() {
        let h = EngineHarness::new();
        let source = vec![Cell::new(h.r("B2"), "=A1")];

        h.engine.copy_cells(source, range(&h, "A1", "A1")).unwrap();
        assert_eq!(h.text("A1"), "=INVALIDCELLREFERENCE(\"A1\")");
        assert_eq!(h.error("A1").map(|e| e.kind), Some(ErrorKind::Ref));
    }

    #[test]
    fn test_empty_copy_clears_destination() {
        let h = EngineHarness::new();
        h.set("A1", "1");
        h.set("A2", "2");
        h.set("B1", "=A1+A2");

        let delta = h.engine.copy_cells(Vec::new(), range(&h, "A1", "A2")).unwrap();
        assert_eq!(delta.deleted_cells, vec![h.r("A1"), h.r("A2")]);
        assert_eq!(h.value("B1"), Some(Value::Number(0.0)));
    }

    #[test]
    fn test_cell_outside_source_rejected() {
        let h = EngineHarness::new();
        let source = vec![Cell::new(h.r("C3"), "1")];

        let err = h.engine.fill_cells(source, range(&h, "A1", "B2"), range(&h, "D1", "D1")).unwrap_err();
        assert!(matches!(err, EngineError::CellOutsideSource { .. }));
        assert!(h.engine.stores().cells.all().is_empty());
    }
}
