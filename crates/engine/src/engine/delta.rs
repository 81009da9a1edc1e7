use serde::{Deserialize, Serialize};

use crate::axis::Header;
use crate::cache::Cache;
use crate::cell::Cell;
use crate::label::{LabelMapping, LabelName};
use crate::reference::CellRef;

/// Everything one engine operation explicitly loaded, saved or deleted.
///
/// Cells read only as evaluation inputs are not included. Every list is
/// sorted: cells row-major, labels by name, headers by index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineDelta {
    pub cells: Vec<Cell>,
    pub deleted_cells: Vec<CellRef>,
    pub labels: Vec<LabelMapping>,
    pub deleted_labels: Vec<LabelName>,
    pub columns: Vec<Header>,
    pub deleted_columns: Vec<u32>,
    pub rows: Vec<Header>,
    pub deleted_rows: Vec<u32>,
}

impl EngineDelta {
    pub(crate) fn from_caches(
        cells: &Cache<CellRef, Cell>,
        labels: &Cache<LabelName, LabelMapping>,
        columns: &Cache<u32, Header>,
        rows: &Cache<u32, Header>,
    ) -> Self {
        let (mut cells, mut deleted_cells) = split(cells);
        cells.sort_by_key(|cell| cell.reference);
        deleted_cells.sort();

        let (mut labels, mut deleted_labels) = split(labels);
        labels.sort_by(|a, b| a.label.cmp(&b.label));
        deleted_labels.sort();

        let (mut columns, mut deleted_columns) = split(columns);
        columns.sort_by_key(|header| header.index);
        deleted_columns.sort_unstable();

        let (mut rows, mut deleted_rows) = split(rows);
        rows.sort_by_key(|header| header.index);
        deleted_rows.sort_unstable();

        Self { cells, deleted_cells, labels, deleted_labels, columns, deleted_columns, rows, deleted_rows }
    }

    pub fn cell(&self, reference: CellRef) -> Option<&Cell> {
        let reference = reference.normalized();
        self.cells.iter().find(|cell| cell.reference == reference)
    }

    pub fn label(&self, label: &LabelName) -> Option<&LabelMapping> {
        self.labels.iter().find(|mapping| mapping.label == *label)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
            && self.deleted_cells.is_empty()
            && self.labels.is_empty()
            && self.deleted_labels.is_empty()
            && self.columns.is_empty()
            && self.deleted_columns.is_empty()
            && self.rows.is_empty()
            && self.deleted_rows.is_empty()
    }
}

fn split<K, V>(cache: &Cache<K, V>) -> (Vec<V>, Vec<K>)
where
    K: std::fmt::Display + std::hash::Hash + Eq + Clone,
    V: Clone,
{
    let mut present = Vec::new();
    let mut deleted = Vec::new();
    for (key, value) in cache.outcomes() {
        match value {
            Some(value) => present.push(value.clone()),
            None => deleted.push(key.clone()),
        }
    }
    (present, deleted)
}
