//! Cell, column, row and range references.
//!
//! Coordinates are zero-based. Each axis of a reference carries its own
//! [`ReferenceKind`]; in A1 text a `$` marks an absolute component
//! (`$A1`, `A$1`, `$A$1`).
//!
//! Map keys and dependency edges always use [`CellRef::normalized`] so that
//! `$A$1` and `A1` name the same cell.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::label::LabelName;

/// Whether a reference component follows the formula when it moves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReferenceKind {
    #[default]
    Relative,
    Absolute,
}

impl ReferenceKind {
    fn marker(self) -> &'static str {
        match self {
            ReferenceKind::Relative => "",
            ReferenceKind::Absolute => "$",
        }
    }
}

/// Shift a coordinate by a signed delta. `None` when the result would be negative
/// or does not fit.
pub(crate) fn shift_coordinate(value: u32, delta: i64) -> Option<u32> {
    u32::try_from(i64::from(value).checked_add(delta)?).ok()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    pub value: u32,
    pub kind: ReferenceKind,
}

impl ColumnRef {
    pub fn relative(value: u32) -> Self {
        Self { value, kind: ReferenceKind::Relative }
    }

    pub fn absolute(value: u32) -> Self {
        Self { value, kind: ReferenceKind::Absolute }
    }

    pub fn is_absolute(&self) -> bool {
        self.kind == ReferenceKind::Absolute
    }

    /// Same kind, new coordinate.
    pub fn with_value(self, value: u32) -> Self {
        Self { value, ..self }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.marker(), column_letters(self.value))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowRef {
    pub value: u32,
    pub kind: ReferenceKind,
}

impl RowRef {
    pub fn relative(value: u32) -> Self {
        Self { value, kind: ReferenceKind::Relative }
    }

    pub fn absolute(value: u32) -> Self {
        Self { value, kind: ReferenceKind::Absolute }
    }

    pub fn is_absolute(&self) -> bool {
        self.kind == ReferenceKind::Absolute
    }

    pub fn with_value(self, value: u32) -> Self {
        Self { value, ..self }
    }
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.marker(), u64::from(self.value) + 1)
    }
}

/// A single cell reference.
///
/// Ordering is row-major (row, then column), which is the order cells are
/// reported in an [`EngineDelta`](crate::engine::EngineDelta).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CellRef {
    pub column: ColumnRef,
    pub row: RowRef,
}

impl CellRef {
    pub fn new(column: ColumnRef, row: RowRef) -> Self {
        Self { column, row }
    }

    /// Relative reference at the given zero-based coordinates.
    pub fn at(column: u32, row: u32) -> Self {
        Self::new(ColumnRef::relative(column), RowRef::relative(row))
    }

    /// The key form of this reference: same coordinates, both axes relative.
    pub fn normalized(self) -> Self {
        Self::at(self.column.value, self.row.value)
    }
}

impl Ord for CellRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.row
            .value
            .cmp(&other.row.value)
            .then(self.column.value.cmp(&other.column.value))
            .then(self.row.kind.cmp(&other.row.kind))
            .then(self.column.kind.cmp(&other.column.kind))
    }
}

impl PartialOrd for CellRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column, self.row)
    }
}

impl FromStr for CellRef {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_cell_ref(s).ok_or_else(|| EngineError::InvalidReference(s.to_string()))
    }
}

impl TryFrom<String> for CellRef {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellRef> for String {
    fn from(value: CellRef) -> Self {
        value.to_string()
    }
}

/// A rectangular block of cells. `begin` is always the top-left corner and
/// `end` the bottom-right; each corner keeps its own reference kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CellRange {
    begin: CellRef,
    end: CellRef,
}

impl CellRange {
    /// Build a range from any two corners.
    pub fn new(a: CellRef, b: CellRef) -> Self {
        let (left, right) = if a.column.value <= b.column.value {
            (a.column, b.column)
        } else {
            (b.column, a.column)
        };
        let (top, bottom) = if a.row.value <= b.row.value { (a.row, b.row) } else { (b.row, a.row) };
        Self {
            begin: CellRef::new(left, top),
            end: CellRef::new(right, bottom),
        }
    }

    pub fn single(cell: CellRef) -> Self {
        Self { begin: cell, end: cell }
    }

    /// Smallest range covering every given cell.
    pub fn bounding<I>(cells: I) -> Option<Self>
    where
        I: IntoIterator<Item = CellRef>,
    {
        let mut cells = cells.into_iter();
        let first = cells.next()?.normalized();
        let (mut left, mut top, mut right, mut bottom) =
            (first.column.value, first.row.value, first.column.value, first.row.value);
        for cell in cells {
            left = left.min(cell.column.value);
            right = right.max(cell.column.value);
            top = top.min(cell.row.value);
            bottom = bottom.max(cell.row.value);
        }
        Some(Self::new(CellRef::at(left, top), CellRef::at(right, bottom)))
    }

    pub fn begin(&self) -> CellRef {
        self.begin
    }

    pub fn end(&self) -> CellRef {
        self.end
    }

    pub fn width(&self) -> u32 {
        self.end.column.value - self.begin.column.value + 1
    }

    pub fn height(&self) -> u32 {
        self.end.row.value - self.begin.row.value + 1
    }

    pub fn is_single_cell(&self) -> bool {
        self.width() == 1 && self.height() == 1
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        (self.begin.column.value..=self.end.column.value).contains(&cell.column.value)
            && (self.begin.row.value..=self.end.row.value).contains(&cell.row.value)
    }

    pub fn normalized(self) -> Self {
        Self {
            begin: self.begin.normalized(),
            end: self.end.normalized(),
        }
    }

    /// Every coordinate in the range, row-major, as normalized references.
    pub fn cells(&self) -> impl Iterator<Item = CellRef> {
        let (left, right) = (self.begin.column.value, self.end.column.value);
        (self.begin.row.value..=self.end.row.value)
            .flat_map(move |row| (left..=right).map(move |column| CellRef::at(column, row)))
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.begin, self.end)
    }
}

impl FromStr for CellRange {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((a, b)) => Ok(Self::new(a.parse()?, b.parse()?)),
            None => Ok(Self::single(s.parse()?)),
        }
    }
}

impl TryFrom<String> for CellRange {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellRange> for String {
    fn from(value: CellRange) -> Self {
        value.to_string()
    }
}

/// Something a formula mentions. Each variant is one kind of dependency edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExpressionReference {
    Cell(CellRef),
    Label(LabelName),
    Range(CellRange),
}

impl fmt::Display for ExpressionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionReference::Cell(cell) => write!(f, "{}", cell),
            ExpressionReference::Label(label) => write!(f, "{}", label),
            ExpressionReference::Range(range) => write!(f, "{}", range),
        }
    }
}

/// Convert column index to letter(s): 0 -> A, 25 -> Z, 26 -> AA, etc.
pub fn column_letters(column: u32) -> String {
    let mut result = String::new();
    let mut n = u64::from(column) + 1;
    while n > 0 {
        n -= 1;
        result.insert(0, char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }
    result
}

/// Parse A1 text (`A1`, `$B$7`, `aa10`) into a reference. `None` for anything
/// else, including row 0 and coordinates that overflow `u32`.
pub(crate) fn parse_cell_ref(s: &str) -> Option<CellRef> {
    let s = s.to_ascii_uppercase();
    let mut chars = s.chars().peekable();

    let column_kind = if chars.peek() == Some(&'$') {
        chars.next();
        ReferenceKind::Absolute
    } else {
        ReferenceKind::Relative
    };

    let mut column: u64 = 0;
    let mut letters = 0;
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_uppercase() {
            break;
        }
        column = column * 26 + u64::from(c as u8 - b'A' + 1);
        if column > u64::from(u32::MAX) {
            return None;
        }
        letters += 1;
        chars.next();
    }
    if letters == 0 {
        return None;
    }

    let row_kind = if chars.peek() == Some(&'$') {
        chars.next();
        ReferenceKind::Absolute
    } else {
        ReferenceKind::Relative
    };

    let digits: String = chars.collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let row: u64 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }

    Some(CellRef::new(
        ColumnRef { value: u32::try_from(column - 1).ok()?, kind: column_kind },
        RowRef { value: u32::try_from(row - 1).ok()?, kind: row_kind },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
    }

    #[test]
    fn test_parse_kinds() {
        let cell: CellRef = "$B7".parse().unwrap();
        assert_eq!(cell.column, ColumnRef::absolute(1));
        assert_eq!(cell.row, RowRef::relative(6));

        let cell: CellRef = "c$3".parse().unwrap();
        assert_eq!(cell.column, ColumnRef::relative(2));
        assert_eq!(cell.row, RowRef::absolute(2));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("A0".parse::<CellRef>().is_err());
        assert!("1A".parse::<CellRef>().is_err());
        assert!("A".parse::<CellRef>().is_err());
        assert!("A1B".parse::<CellRef>().is_err());
        assert!("".parse::<CellRef>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for text in ["A1", "$A$1", "$ZZ10", "AB$200"] {
            let cell: CellRef = text.parse().unwrap();
            assert_eq!(cell.to_string(), text);
        }
    }

    #[test]
    fn test_normalized_ignores_kind() {
        let a: CellRef = "$A$1".parse().unwrap();
        let b: CellRef = "A1".parse().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.normalized(), b);
    }

    #[test]
    fn test_row_major_order() {
        let mut cells: Vec<CellRef> = ["B1", "A2", "A1"].iter().map(|s| s.parse().unwrap()).collect();
        cells.sort();
        let text: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
        assert_eq!(text, vec!["A1", "B1", "A2"]);
    }

    #[test]
    fn test_range_normalizes_corners() {
        let range: CellRange = "C5:$A$2".parse().unwrap();
        assert_eq!(range.to_string(), "$A$2:C5");
        assert_eq!(range.width(), 3);
        assert_eq!(range.height(), 4);
        assert!(range.contains("B3".parse().unwrap()));
        assert!(!range.contains("D3".parse().unwrap()));
    }

    #[test]
    fn test_range_cells_row_major() {
        let range: CellRange = "A1:B2".parse().unwrap();
        let cells: Vec<String> = range.cells().map(|c| c.to_string()).collect();
        assert_eq!(cells, vec!["A1", "B1", "A2", "B2"]);
    }

    #[test]
    fn test_bounding_range() {
        let cells = ["C3", "A2", "B5"].iter().map(|s| s.parse::<CellRef>().unwrap());
        assert_eq!(CellRange::bounding(cells).unwrap().to_string(), "A2:C5");
        assert!(CellRange::bounding(std::iter::empty()).is_none());
    }
}
