// Built-in spreadsheet functions

use super::eval::{evaluate, EvaluationContext};
use super::parser::Expr;
use super::value::{FormulaError, Value};
use crate::label::ResolvedTarget;
use crate::reference::CellRange;

/// Name of the function a structural edit substitutes for a reference whose
/// target was deleted. Its single argument is the original reference text.
pub const INVALID_CELL_REFERENCE: &str = "INVALIDCELLREFERENCE";

pub fn call(name: &str, args: &[Expr], ctx: &mut dyn EvaluationContext) -> Result<Value, FormulaError> {
    match name {
        "SUM" => Ok(Value::Number(numbers(args, ctx)?.iter().sum())),
        "PRODUCT" => Ok(Value::Number(numbers(args, ctx)?.iter().product())),
        "MIN" => {
            let values = numbers(args, ctx)?;
            Ok(Value::Number(values.iter().copied().reduce(f64::min).unwrap_or(0.0)))
        }
        "MAX" => {
            let values = numbers(args, ctx)?;
            Ok(Value::Number(values.iter().copied().reduce(f64::max).unwrap_or(0.0)))
        }
        "COUNT" => {
            // COUNT never fails: errors and non-numbers are simply not counted
            let mut count = 0usize;
            for arg in args {
                for item in flatten_arg(arg, ctx) {
                    if let Ok(Value::Number(_)) = item.value {
                        count += 1;
                    }
                }
            }
            Ok(Value::Number(count as f64))
        }
        "AVERAGE" => {
            let values = numbers(args, ctx)?;
            if values.is_empty() {
                return Err(FormulaError::div0());
            }
            Ok(Value::Number(values.iter().sum::<f64>() / values.len() as f64))
        }
        "ABS" => {
            arity(name, args, 1, 1)?;
            Ok(Value::Number(evaluate(&args[0], ctx)?.to_number()?.abs()))
        }
        "ROUND" => {
            arity(name, args, 1, 2)?;
            let n = evaluate(&args[0], ctx)?.to_number()?;
            let digits = match args.get(1) {
                Some(arg) => evaluate(arg, ctx)?.to_number()?.trunc() as i32,
                None => 0,
            };
            let factor = 10f64.powi(digits);
            Ok(Value::Number((n * factor).round() / factor))
        }
        "IF" => {
            arity(name, args, 2, 3)?;
            // Only the chosen branch is evaluated
            if evaluate(&args[0], ctx)?.to_bool()? {
                evaluate(&args[1], ctx)
            } else {
                match args.get(2) {
                    Some(arg) => evaluate(arg, ctx),
                    None => Ok(Value::Boolean(false)),
                }
            }
        }
        "AND" => {
            let mut result = true;
            for item in values(args, ctx)? {
                result &= item.to_bool()?;
            }
            Ok(Value::Boolean(result))
        }
        "OR" => {
            let mut result = false;
            for item in values(args, ctx)? {
                result |= item.to_bool()?;
            }
            Ok(Value::Boolean(result))
        }
        "NOT" => {
            arity(name, args, 1, 1)?;
            Ok(Value::Boolean(!evaluate(&args[0], ctx)?.to_bool()?))
        }
        "IFERROR" => {
            arity(name, args, 2, 2)?;
            match evaluate(&args[0], ctx) {
                Ok(value) => Ok(value),
                Err(_) => evaluate(&args[1], ctx),
            }
        }
        "ISERROR" => {
            arity(name, args, 1, 1)?;
            Ok(Value::Boolean(evaluate(&args[0], ctx).is_err()))
        }
        "CONCAT" | "CONCATENATE" => {
            let mut text = String::new();
            for item in values(args, ctx)? {
                text.push_str(&item.to_text());
            }
            Ok(Value::Text(text))
        }
        "LEN" => {
            arity(name, args, 1, 1)?;
            Ok(Value::Number(evaluate(&args[0], ctx)?.to_text().chars().count() as f64))
        }
        "UPPER" => {
            arity(name, args, 1, 1)?;
            Ok(Value::Text(evaluate(&args[0], ctx)?.to_text().to_uppercase()))
        }
        "LOWER" => {
            arity(name, args, 1, 1)?;
            Ok(Value::Text(evaluate(&args[0], ctx)?.to_text().to_lowercase()))
        }
        INVALID_CELL_REFERENCE => {
            let original = match args.first() {
                Some(Expr::Text(text)) => text.as_str(),
                _ => "",
            };
            Err(FormulaError::reference_deleted(original))
        }
        _ => Err(FormulaError::name(format!("Unknown function {}", name))),
    }
}

fn arity(name: &str, args: &[Expr], min: usize, max: usize) -> Result<(), FormulaError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(FormulaError::value(format!(
            "{} expects {} arguments, got {}",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

/// One value produced by an argument, remembering whether it came from a
/// range. Range members that are not numbers are skipped by aggregates; direct
/// arguments are coerced.
struct ArgValue {
    value: Result<Value, FormulaError>,
    from_range: bool,
}

fn flatten_arg(arg: &Expr, ctx: &mut dyn EvaluationContext) -> Vec<ArgValue> {
    let range = match arg {
        Expr::Range(range) => Some(*range),
        Expr::Label(label) => match ctx.resolve_label(label) {
            Ok(ResolvedTarget::Range(range)) => Some(range),
            Ok(ResolvedTarget::Cell(cell)) => Some(CellRange::single(cell)),
            Err(err) => return vec![ArgValue { value: Err(err), from_range: false }],
        },
        _ => None,
    };

    match range {
        Some(range) => ctx
            .range_cells(range)
            .into_iter()
            .map(|cell| ArgValue { value: ctx.cell_value(cell), from_range: true })
            .collect(),
        None => vec![ArgValue { value: evaluate(arg, ctx), from_range: false }],
    }
}

fn values(args: &[Expr], ctx: &mut dyn EvaluationContext) -> Result<Vec<Value>, FormulaError> {
    let mut out = Vec::new();
    for arg in args {
        for item in flatten_arg(arg, ctx) {
            let value = item.value?;
            if item.from_range && value == Value::Empty {
                continue;
            }
            out.push(value);
        }
    }
    Ok(out)
}

fn numbers(args: &[Expr], ctx: &mut dyn EvaluationContext) -> Result<Vec<f64>, FormulaError> {
    let mut out = Vec::new();
    for arg in args {
        for item in flatten_arg(arg, ctx) {
            let value = item.value?;
            match (&value, item.from_range) {
                (Value::Number(n), _) => out.push(*n),
                (_, true) => {}
                (Value::Empty, false) => {}
                (_, false) => out.push(value.to_number()?),
            }
        }
    }
    Ok(out)
}
