// Formula values and per-cell errors.
// A cell's evaluation ends in exactly one of these: a Value or a FormulaError.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::reference::CellRef;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
}

impl Value {
    /// Numeric view used by arithmetic. Empty is 0, booleans are 1/0, and text
    /// must parse as a number.
    pub fn to_number(&self) -> Result<f64, FormulaError> {
        match self {
            Value::Empty => Ok(0.0),
            Value::Number(n) => Ok(*n),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => {
                if s.trim().is_empty() {
                    Ok(0.0)
                } else {
                    s.trim()
                        .parse::<f64>()
                        .map_err(|_| FormulaError::value(format!("Cannot convert \"{}\" to a number", s)))
                }
            }
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
            Value::Boolean(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
        }
    }

    pub fn to_bool(&self) -> Result<bool, FormulaError> {
        match self {
            Value::Empty => Ok(false),
            Value::Boolean(b) => Ok(*b),
            Value::Number(n) => Ok(*n != 0.0),
            Value::Text(s) => match s.to_ascii_uppercase().as_str() {
                "TRUE" => Ok(true),
                "FALSE" => Ok(false),
                _ => Err(FormulaError::value(format!("Cannot convert \"{}\" to a boolean", s))),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Integers print without a fraction; everything else uses Rust's shortest form.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Category of a per-cell error. The code is what a grid would show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Formula text could not be parsed.
    Syntax,
    /// Reference to a cell that was removed by a structural edit.
    Ref,
    /// Unknown function or unresolvable label.
    Name,
    Value,
    Div0,
    Cycle,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Syntax => "#ERROR!",
            ErrorKind::Ref => "#REF!",
            ErrorKind::Name => "#NAME?",
            ErrorKind::Value => "#VALUE!",
            ErrorKind::Div0 => "#DIV/0!",
            ErrorKind::Cycle => "#CYCLE!",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaError {
    pub kind: ErrorKind,
    pub message: String,
}

impl FormulaError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value, message)
    }

    pub fn name(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Name, message)
    }

    pub fn div0() -> Self {
        Self::new(ErrorKind::Div0, "Division by zero")
    }

    /// The error a `INVALIDCELLREFERENCE("B1")` marker evaluates to.
    pub fn reference_deleted(original: &str) -> Self {
        Self::new(ErrorKind::Ref, format!("Reference {} deleted", original))
    }

    pub fn cycle(cell: CellRef) -> Self {
        Self::new(ErrorKind::Cycle, format!("Circular reference through {}", cell))
    }
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.code(), self.message)
    }
}
