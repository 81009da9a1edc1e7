//! Reference rewriting for structural edits, copy and fill.
//!
//! [`fix_references`] walks an expression and rebuilds it, handing every
//! column and row reference to a [`ReferenceFixer`]. Literal and structural
//! nodes are preserved. A reference the fixer rejects is replaced, whole, by
//! `INVALIDCELLREFERENCE("<original text>")`, which evaluates to a `#REF!`
//! error naming the original reference.

use std::marker::PhantomData;

use super::functions::INVALID_CELL_REFERENCE;
use super::parser::Expr;
use crate::axis::{Axis, AxisKind, StructuralEdit};
use crate::error::InternalFault;
use crate::label::LabelTarget;
use crate::reference::{shift_coordinate, CellRange, CellRef, ColumnRef, RowRef};

/// Decides where column and row references go. `None` invalidates the
/// enclosing reference.
pub trait ReferenceFixer {
    fn fix_column(&self, column: ColumnRef) -> Option<ColumnRef>;

    fn fix_row(&self, row: RowRef) -> Option<RowRef>;

    /// Both column ends of a range. By default each end is fixed on its own.
    fn fix_column_span(&self, begin: ColumnRef, end: ColumnRef) -> Option<(ColumnRef, ColumnRef)> {
        Some((self.fix_column(begin)?, self.fix_column(end)?))
    }

    fn fix_row_span(&self, begin: RowRef, end: RowRef) -> Option<(RowRef, RowRef)> {
        Some((self.fix_row(begin)?, self.fix_row(end)?))
    }
}

pub fn fix_cell(cell: CellRef, fixer: &dyn ReferenceFixer) -> Option<CellRef> {
    Some(CellRef::new(fixer.fix_column(cell.column)?, fixer.fix_row(cell.row)?))
}

pub fn fix_range(range: CellRange, fixer: &dyn ReferenceFixer) -> Option<CellRange> {
    let (begin, end) = (range.begin(), range.end());
    let (left, right) = fixer.fix_column_span(begin.column, end.column)?;
    let (top, bottom) = fixer.fix_row_span(begin.row, end.row)?;
    Some(CellRange::new(CellRef::new(left, top), CellRef::new(right, bottom)))
}

/// Rewrite every reference in `expr`.
pub fn fix_references(expr: &Expr, fixer: &dyn ReferenceFixer) -> Result<Expr, InternalFault> {
    expect_single(rewrite(expr, fixer)?)
}

/// The marker that replaces a reference whose target no longer exists.
pub fn invalid_reference(original: &str) -> Expr {
    Expr::Function {
        name: INVALID_CELL_REFERENCE.to_string(),
        args: vec![Expr::Text(original.to_string())],
    }
}

/// Each visited subtree yields its replacement nodes; callers check there is
/// exactly one.
fn rewrite(expr: &Expr, fixer: &dyn ReferenceFixer) -> Result<Vec<Expr>, InternalFault> {
    let node = match expr {
        Expr::Cell(cell) => match fix_cell(*cell, fixer) {
            Some(fixed) => Expr::Cell(fixed),
            None => invalid_reference(&cell.to_string()),
        },
        Expr::Range(range) => match fix_range(*range, fixer) {
            Some(fixed) => Expr::Range(fixed),
            None => invalid_reference(&range.to_string()),
        },
        Expr::Function { name, args } => Expr::Function {
            name: name.clone(),
            args: args
                .iter()
                .map(|arg| fix_references(arg, fixer))
                .collect::<Result<_, _>>()?,
        },
        Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
            op: *op,
            left: Box::new(fix_references(left, fixer)?),
            right: Box::new(fix_references(right, fixer)?),
        },
        Expr::Negate(inner) => Expr::Negate(Box::new(fix_references(inner, fixer)?)),
        Expr::Group(inner) => Expr::Group(Box::new(fix_references(inner, fixer)?)),
        Expr::Number(_) | Expr::Text(_) | Expr::Boolean(_) | Expr::Label(_) | Expr::Empty => expr.clone(),
    };
    Ok(vec![node])
}

pub(crate) fn expect_single(mut nodes: Vec<Expr>) -> Result<Expr, InternalFault> {
    match (nodes.pop(), nodes.is_empty()) {
        (Some(node), true) => Ok(node),
        (Some(_), false) => Err(InternalFault::RewriteArity { count: nodes.len() + 1 }),
        (None, _) => Err(InternalFault::RewriteArity { count: 0 }),
    }
}

// =============================================================================
// Copy / fill
// =============================================================================

/// Shifts relative references by a fixed offset. Absolute references are
/// untouched; a relative reference shifted off the grid is invalid.
#[derive(Debug, Clone, Copy)]
pub struct OffsetFixer {
    pub dx: i64,
    pub dy: i64,
    pub last_column: u32,
    pub last_row: u32,
}

impl ReferenceFixer for OffsetFixer {
    fn fix_column(&self, column: ColumnRef) -> Option<ColumnRef> {
        if column.is_absolute() {
            return Some(column);
        }
        let value = shift_coordinate(column.value, self.dx).filter(|v| *v <= self.last_column)?;
        Some(column.with_value(value))
    }

    fn fix_row(&self, row: RowRef) -> Option<RowRef> {
        if row.is_absolute() {
            return Some(row);
        }
        let value = shift_coordinate(row.value, self.dy).filter(|v| *v <= self.last_row)?;
        Some(row.with_value(value))
    }
}

// =============================================================================
// Structural edits
// =============================================================================

/// Applies a [`StructuralEdit`] on axis `A`. The other axis passes through.
///
/// Formula references only move when relative, but any reference into a
/// deleted band is invalidated whatever its kind. Label targets follow the
/// cells they name whatever their kind; build those fixers with
/// [`StructuralFixer::following_absolute`].
#[derive(Debug, Clone, Copy)]
pub struct StructuralFixer<A: Axis> {
    edit: StructuralEdit,
    last: u32,
    follow_absolute: bool,
    _axis: PhantomData<A>,
}

impl<A: Axis> StructuralFixer<A> {
    pub fn new(edit: StructuralEdit, last: u32) -> Self {
        Self { edit, last, follow_absolute: false, _axis: PhantomData }
    }

    pub fn following_absolute(edit: StructuralEdit, last: u32) -> Self {
        Self { follow_absolute: true, ..Self::new(edit, last) }
    }

    /// Absolute coordinates outside a deleted band keep their value.
    fn stays(&self, value: u32, absolute: bool) -> bool {
        absolute && !self.follow_absolute && !self.edit.deletes(value)
    }

    fn coordinate(&self, kind: AxisKind, value: u32, absolute: bool) -> Option<u32> {
        if A::KIND != kind || self.stays(value, absolute) {
            return Some(value);
        }
        self.edit.move_coordinate(value, self.last)
    }

    fn span(&self, begin: (u32, bool), end: (u32, bool)) -> Option<(u32, u32)> {
        match (self.stays(begin.0, begin.1), self.stays(end.0, end.1)) {
            (false, false) => self.edit.move_span(begin.0, end.0, self.last),
            (true, true) => Some((begin.0, end.0)),
            (true, false) => Some((begin.0, self.edit.move_span_end(end.0, self.last)?)),
            (false, true) => Some((self.edit.move_span_begin(begin.0, self.last)?, end.0)),
        }
    }
}

impl<A: Axis> ReferenceFixer for StructuralFixer<A> {
    fn fix_column(&self, column: ColumnRef) -> Option<ColumnRef> {
        let value = self.coordinate(AxisKind::Column, column.value, column.is_absolute())?;
        Some(column.with_value(value))
    }

    fn fix_row(&self, row: RowRef) -> Option<RowRef> {
        let value = self.coordinate(AxisKind::Row, row.value, row.is_absolute())?;
        Some(row.with_value(value))
    }

    fn fix_column_span(&self, begin: ColumnRef, end: ColumnRef) -> Option<(ColumnRef, ColumnRef)> {
        if A::KIND != AxisKind::Column {
            return Some((begin, end));
        }
        let (b, e) = self.span((begin.value, begin.is_absolute()), (end.value, end.is_absolute()))?;
        Some((begin.with_value(b), end.with_value(e)))
    }

    fn fix_row_span(&self, begin: RowRef, end: RowRef) -> Option<(RowRef, RowRef)> {
        if A::KIND != AxisKind::Row {
            return Some((begin, end));
        }
        let (b, e) = self.span((begin.value, begin.is_absolute()), (end.value, end.is_absolute()))?;
        Some((begin.with_value(b), end.with_value(e)))
    }
}

/// Where a label target goes after a structural edit. `None` means everything
/// the label named was deleted.
pub fn fix_label_target<A: Axis>(target: &LabelTarget, edit: StructuralEdit, last: u32) -> Option<LabelTarget> {
    let fixer = StructuralFixer::<A>::following_absolute(edit, last);
    match target {
        LabelTarget::Cell(cell) => fix_cell(*cell, &fixer).map(LabelTarget::Cell),
        LabelTarget::Range(range) => fix_range(*range, &fixer).map(LabelTarget::Range),
        LabelTarget::Label(_) => Some(target.clone()),
    }
}
