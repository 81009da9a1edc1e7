//! Reference extraction from formula expressions.
//!
//! Every cell, range and label an expression mentions becomes one dependency
//! edge. Cell and range references are normalized so `$A$1` and `A1` produce
//! the same edge.

use rustc_hash::FxHashSet;

use super::parser::Expr;
use crate::reference::ExpressionReference;

/// Extract all references from an expression.
///
/// Returns a deduplicated, sorted list.
///
/// # Known Limitations
///
/// - Ranges are not expanded. A range reference is one edge; the range edge
///   store answers which ranges contain a given cell.
/// - Labels are not resolved here. Label chains are followed at evaluation
///   time, and label edges are keyed by name.
pub fn extract_references(expr: &Expr) -> Vec<ExpressionReference> {
    let mut refs = FxHashSet::default();
    collect_refs(expr, &mut refs);
    let mut refs: Vec<ExpressionReference> = refs.into_iter().collect();
    refs.sort();
    refs
}

fn collect_refs(expr: &Expr, refs: &mut FxHashSet<ExpressionReference>) {
    match expr {
        Expr::Number(_) | Expr::Text(_) | Expr::Boolean(_) | Expr::Empty => {
            // Literals have no dependencies
        }

        Expr::Cell(cell) => {
            refs.insert(ExpressionReference::Cell(cell.normalized()));
        }

        Expr::Range(range) => {
            refs.insert(ExpressionReference::Range(range.normalized()));
        }

        Expr::Label(label) => {
            refs.insert(ExpressionReference::Label(label.clone()));
        }

        Expr::Function { args, .. } => {
            for arg in args {
                collect_refs(arg, refs);
            }
        }

        Expr::BinaryOp { left, right, .. } => {
            collect_refs(left, refs);
            collect_refs(right, refs);
        }

        Expr::Negate(inner) | Expr::Group(inner) => collect_refs(inner, refs),
    }
}
