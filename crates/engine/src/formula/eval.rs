// Formula evaluator - evaluates expressions against an EvaluationContext

use std::cmp::Ordering;

use super::functions;
use super::parser::{Expr, Op};
use super::value::{FormulaError, Value};
use crate::label::{LabelName, ResolvedTarget};
use crate::reference::{CellRange, CellRef};

/// What an expression can ask of the grid while it evaluates.
pub trait EvaluationContext {
    /// Value of one cell. An error stored on the cell comes back as `Err`, so
    /// errors propagate through formulas that read it.
    fn cell_value(&mut self, cell: CellRef) -> Result<Value, FormulaError>;

    /// Cells that currently exist inside `range`, row-major.
    fn range_cells(&mut self, range: CellRange) -> Vec<CellRef>;

    /// Follow a label to the cell or range it names.
    fn resolve_label(&mut self, label: &LabelName) -> Result<ResolvedTarget, FormulaError>;
}

pub trait FormulaEvaluator {
    fn evaluate(&self, expr: &Expr, ctx: &mut dyn EvaluationContext) -> Result<Value, FormulaError>;
}

/// Arithmetic, comparison, concatenation and the functions in [`functions`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicEvaluator;

impl FormulaEvaluator for BasicEvaluator {
    fn evaluate(&self, expr: &Expr, ctx: &mut dyn EvaluationContext) -> Result<Value, FormulaError> {
        evaluate(expr, ctx)
    }
}

pub fn evaluate(expr: &Expr, ctx: &mut dyn EvaluationContext) -> Result<Value, FormulaError> {
    match expr {
        Expr::Empty => Ok(Value::Empty),
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Text(s) => Ok(Value::Text(s.clone())),
        Expr::Boolean(b) => Ok(Value::Boolean(*b)),
        Expr::Cell(cell) => ctx.cell_value(*cell),
        Expr::Range(range) => single_value(*range, ctx),
        Expr::Label(label) => match ctx.resolve_label(label)? {
            ResolvedTarget::Cell(cell) => ctx.cell_value(cell),
            ResolvedTarget::Range(range) => single_value(range, ctx),
        },
        Expr::Group(inner) => evaluate(inner, ctx),
        Expr::Negate(inner) => Ok(Value::Number(-evaluate(inner, ctx)?.to_number()?)),
        Expr::BinaryOp { op, left, right } => {
            let left = evaluate(left, ctx)?;
            let right = evaluate(right, ctx)?;
            binary(*op, &left, &right)
        }
        Expr::Function { name, args } => functions::call(name, args, ctx),
    }
}

/// A range used as a scalar must be a single cell.
fn single_value(range: CellRange, ctx: &mut dyn EvaluationContext) -> Result<Value, FormulaError> {
    if range.is_single_cell() {
        ctx.cell_value(range.begin())
    } else {
        Err(FormulaError::value(format!("Range {} used where a single value is expected", range)))
    }
}

fn binary(op: Op, left: &Value, right: &Value) -> Result<Value, FormulaError> {
    match op {
        Op::Add => arithmetic(left, right, |a, b| a + b),
        Op::Sub => arithmetic(left, right, |a, b| a - b),
        Op::Mul => arithmetic(left, right, |a, b| a * b),
        Op::Div => {
            let divisor = right.to_number()?;
            if divisor == 0.0 {
                return Err(FormulaError::div0());
            }
            arithmetic(left, right, |a, b| a / b)
        }
        Op::Pow => arithmetic(left, right, f64::powf),
        Op::Concat => Ok(Value::Text(format!("{}{}", left.to_text(), right.to_text()))),
        Op::Lt => Ok(Value::Boolean(compare(left, right) == Ordering::Less)),
        Op::Gt => Ok(Value::Boolean(compare(left, right) == Ordering::Greater)),
        Op::Eq => Ok(Value::Boolean(compare(left, right) == Ordering::Equal)),
        Op::LtEq => Ok(Value::Boolean(compare(left, right) != Ordering::Greater)),
        Op::GtEq => Ok(Value::Boolean(compare(left, right) != Ordering::Less)),
        Op::NotEq => Ok(Value::Boolean(compare(left, right) != Ordering::Equal)),
    }
}

fn arithmetic(left: &Value, right: &Value, f: impl Fn(f64, f64) -> f64) -> Result<Value, FormulaError> {
    let result = f(left.to_number()?, right.to_number()?);
    if result.is_finite() {
        Ok(Value::Number(result))
    } else {
        Err(FormulaError::value("Result is not a finite number"))
    }
}

/// Spreadsheet ordering: numbers < text < booleans. Empty takes the type of the
/// other side. Text compares case-insensitively.
fn compare(left: &Value, right: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Empty | Value::Number(_) => 0,
            Value::Text(_) => 1,
            Value::Boolean(_) => 2,
        }
    }

    match (left, right) {
        (Value::Empty, Value::Text(s)) => "".cmp(&s.to_lowercase().as_str()),
        (Value::Text(s), Value::Empty) => s.to_lowercase().as_str().cmp(""),
        (Value::Empty, Value::Boolean(b)) => false.cmp(b),
        (Value::Boolean(b), Value::Empty) => b.cmp(&false),
        (Value::Text(a), Value::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
        (a, b) if rank(a) == 0 && rank(b) == 0 => {
            let (x, y) = (a.to_number().unwrap_or(0.0), b.to_number().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (a, b) => rank(a).cmp(&rank(b)),
    }
}
