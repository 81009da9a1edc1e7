//! Column and row axes.
//!
//! Structural edits run one algorithm for both axes; [`Axis`] supplies the
//! per-axis pieces (which coordinate of a cell to look at, the grid limit, the
//! header store).

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::reference::CellRef;
use crate::store::{EngineStores, HeaderStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisKind {
    Column,
    Row,
}

pub trait Axis: Copy + 'static {
    const KIND: AxisKind;
    const NAME: &'static str;

    fn coordinate_of(cell: CellRef) -> u32;

    /// Same reference with this axis' coordinate replaced. The kind is kept.
    fn with_coordinate(cell: CellRef, value: u32) -> CellRef;

    /// Last valid zero-based coordinate.
    fn last_coordinate(config: &EngineConfig) -> u32;

    fn headers(stores: &EngineStores) -> &Rc<dyn HeaderStore>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Columns;

#[derive(Debug, Clone, Copy, Default)]
pub struct Rows;

impl Axis for Columns {
    const KIND: AxisKind = AxisKind::Column;
    const NAME: &'static str = "column";

    fn coordinate_of(cell: CellRef) -> u32 {
        cell.column.value
    }

    fn with_coordinate(cell: CellRef, value: u32) -> CellRef {
        CellRef::new(cell.column.with_value(value), cell.row)
    }

    fn last_coordinate(config: &EngineConfig) -> u32 {
        config.last_column()
    }

    fn headers(stores: &EngineStores) -> &Rc<dyn HeaderStore> {
        &stores.columns
    }
}

impl Axis for Rows {
    const KIND: AxisKind = AxisKind::Row;
    const NAME: &'static str = "row";

    fn coordinate_of(cell: CellRef) -> u32 {
        cell.row.value
    }

    fn with_coordinate(cell: CellRef, value: u32) -> CellRef {
        CellRef::new(cell.column, cell.row.with_value(value))
    }

    fn last_coordinate(config: &EngineConfig) -> u32 {
        config.last_row()
    }

    fn headers(stores: &EngineStores) -> &Rc<dyn HeaderStore> {
        &stores.rows
    }
}

/// Per-column or per-row metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub index: u32,
    #[serde(default)]
    pub hidden: bool,
}

impl Header {
    pub fn new(index: u32) -> Self {
        Self { index, hidden: false }
    }

    pub fn hidden(index: u32) -> Self {
        Self { index, hidden: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Insert,
    Delete,
}

/// Insert or delete `count` columns/rows starting at `at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuralEdit {
    pub kind: EditKind,
    pub at: u32,
    pub count: u32,
}

impl StructuralEdit {
    pub fn insert(at: u32, count: u32) -> Self {
        Self { kind: EditKind::Insert, at, count }
    }

    pub fn delete(at: u32, count: u32) -> Self {
        Self { kind: EditKind::Delete, at, count }
    }

    /// Whether `value` lies in the band a delete removes.
    pub fn deletes(&self, value: u32) -> bool {
        self.kind == EditKind::Delete && value >= self.at && value - self.at < self.count
    }

    /// Where the cell at `value` ends up. `None` if it is deleted, or pushed
    /// past `last` by an insert.
    pub fn move_coordinate(&self, value: u32, last: u32) -> Option<u32> {
        if value < self.at {
            return Some(value);
        }
        match self.kind {
            EditKind::Insert => value.checked_add(self.count).filter(|v| *v <= last),
            EditKind::Delete if self.deletes(value) => None,
            EditKind::Delete => Some(value - self.count),
        }
    }

    /// Where the first coordinate of a span ends up. Inside a deleted band it
    /// clips to the first surviving coordinate after the band.
    pub fn move_span_begin(&self, begin: u32, last: u32) -> Option<u32> {
        if self.deletes(begin) {
            return Some(self.at);
        }
        self.move_coordinate(begin, last)
    }

    /// Where the last coordinate of a span ends up. Inside a deleted band it
    /// clips to the coordinate just before the band; an insert clips it to `last`.
    pub fn move_span_end(&self, end: u32, last: u32) -> Option<u32> {
        if self.deletes(end) {
            return self.at.checked_sub(1);
        }
        match self.kind {
            EditKind::Insert if end >= self.at => Some(end.saturating_add(self.count).min(last)),
            _ => self.move_coordinate(end, last),
        }
    }

    /// Where a span `begin..=end` ends up. A span entirely inside a deleted
    /// band, or pushed entirely past `last`, is `None`.
    pub fn move_span(&self, begin: u32, end: u32, last: u32) -> Option<(u32, u32)> {
        if self.deletes(begin) && self.deletes(end) {
            return None;
        }
        let begin = self.move_span_begin(begin, last)?;
        let end = self.move_span_end(end, last)?;
        (begin <= end).then_some((begin, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_coordinates() {
        let cell: CellRef = "$C7".parse().unwrap();
        assert_eq!(Columns::coordinate_of(cell), 2);
        assert_eq!(Rows::coordinate_of(cell), 6);
        assert_eq!(Columns::with_coordinate(cell, 0).to_string(), "$A7");
        assert_eq!(Rows::with_coordinate(cell, 0).to_string(), "$C1");
    }

    #[test]
    fn test_insert_moves_at_and_after() {
        let edit = StructuralEdit::insert(2, 3);
        assert_eq!(edit.move_coordinate(1, 100), Some(1));
        assert_eq!(edit.move_coordinate(2, 100), Some(5));
        assert_eq!(edit.move_coordinate(9, 100), Some(12));
        assert_eq!(edit.move_coordinate(98, 100), None);
    }

    #[test]
    fn test_delete_band() {
        let edit = StructuralEdit::delete(2, 3);
        assert_eq!(edit.move_coordinate(1, 100), Some(1));
        assert_eq!(edit.move_coordinate(2, 100), None);
        assert_eq!(edit.move_coordinate(4, 100), None);
        assert_eq!(edit.move_coordinate(5, 100), Some(2));
        assert!(edit.deletes(4));
        assert!(!edit.deletes(5));
    }

    #[test]
    fn test_delete_span_clips() {
        let edit = StructuralEdit::delete(2, 3);
        // 0..=3 loses 2 and 3
        assert_eq!(edit.move_span(0, 3, 100), Some((0, 1)));
        // 3..=8 loses 3 and 4, the rest slides down
        assert_eq!(edit.move_span(3, 8, 100), Some((2, 5)));
        // 0..=8 spans the band
        assert_eq!(edit.move_span(0, 8, 100), Some((0, 5)));
        // 2..=4 is the band itself
        assert_eq!(edit.move_span(2, 4, 100), None);
    }

    #[test]
    fn test_delete_span_at_origin() {
        let edit = StructuralEdit::delete(0, 2);
        assert_eq!(edit.move_span(0, 1, 100), None);
        assert_eq!(edit.move_span(1, 4, 100), Some((0, 2)));
    }

    #[test]
    fn test_insert_span_grows() {
        let edit = StructuralEdit::insert(2, 3);
        assert_eq!(edit.move_span(0, 4, 100), Some((0, 7)));
        assert_eq!(edit.move_span(3, 4, 100), Some((6, 7)));
        assert_eq!(edit.move_span(0, 99, 100), Some((0, 100)));
        assert_eq!(edit.move_span(99, 100, 100), None);
    }

    #[test]
    fn test_span_ends_clip_on_their_own() {
        let edit = StructuralEdit::delete(2, 3);
        assert_eq!(edit.move_span_begin(3, 100), Some(2));
        assert_eq!(edit.move_span_begin(6, 100), Some(3));
        assert_eq!(edit.move_span_end(3, 100), Some(1));
        assert_eq!(StructuralEdit::delete(0, 2).move_span_end(1, 100), None);
        assert_eq!(StructuralEdit::insert(2, 3).move_span_end(99, 100), Some(100));
    }
}
