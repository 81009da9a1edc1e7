use std::fmt;

use serde::{Deserialize, Serialize};

use crate::formula::{Expr, FormulaError, Value};
use crate::reference::CellRef;

/// A cell's formula and its evaluation state.
///
/// Once evaluated, exactly one of `value` and `error` is set. Both `None`
/// means the formula still has to be evaluated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub text: String,
    /// Parsed form of `text`; rebuilt on demand, never persisted
    #[serde(skip)]
    pub expression: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FormulaError>,
}

impl Formula {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn is_evaluated(&self) -> bool {
        self.value.is_some() || self.error.is_some()
    }

    pub fn set_value(&mut self, value: Value) {
        self.value = Some(value);
        self.error = None;
    }

    pub fn set_error(&mut self, error: FormulaError) {
        self.error = Some(error);
        self.value = None;
    }

    /// Forget the evaluation result so the formula is evaluated again.
    pub fn clear_result(&mut self) {
        self.value = None;
        self.error = None;
    }

    /// The evaluation result as the evaluator sees it when another formula
    /// reads this cell.
    pub fn result(&self) -> Option<Result<Value, FormulaError>> {
        match (&self.value, &self.error) {
            (_, Some(error)) => Some(Err(error.clone())),
            (Some(value), None) => Some(Ok(value.clone())),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub reference: CellRef,
    pub formula: Formula,
}

impl Cell {
    pub fn new(reference: CellRef, text: impl Into<String>) -> Self {
        Self { reference, formula: Formula::new(text) }
    }

    pub fn with_formula(reference: CellRef, formula: Formula) -> Self {
        Self { reference, formula }
    }

    pub fn value(&self) -> Option<&Value> {
        self.formula.value.as_ref()
    }

    pub fn error(&self) -> Option<&FormulaError> {
        self.formula.error.as_ref()
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.reference, self.formula.text)?;
        match (&self.formula.value, &self.formula.error) {
            (_, Some(error)) => write!(f, " -> {}", error),
            (Some(value), None) => write!(f, " -> {}", value),
            (None, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ErrorKind;

    #[test]
    fn test_value_and_error_are_exclusive() {
        let mut formula = Formula::new("=1/0");
        assert!(!formula.is_evaluated());

        formula.set_value(Value::Number(1.0));
        formula.set_error(FormulaError::div0());
        assert_eq!(formula.value, None);
        assert_eq!(formula.error.as_ref().map(|e| e.kind), Some(ErrorKind::Div0));

        formula.set_value(Value::Number(2.0));
        assert_eq!(formula.error, None);
        assert_eq!(formula.result(), Some(Ok(Value::Number(2.0))));

        formula.clear_result();
        assert_eq!(formula.result(), None);
    }

    #[test]
    fn test_display() {
        let mut cell = Cell::new(CellRef::at(1, 0), "=A1*2");
        assert_eq!(cell.to_string(), "B1 =A1*2");
        cell.formula.set_value(Value::Number(10.0));
        assert_eq!(cell.to_string(), "B1 =A1*2 -> 10");
    }

    #[test]
    fn test_serialize_skips_expression() {
        let mut cell = Cell::new(CellRef::at(0, 0), "=1+1");
        cell.formula.expression = Some(Expr::Number(2.0));
        cell.formula.set_value(Value::Number(2.0));

        let json = serde_json::to_value(&cell).unwrap();
        assert_eq!(json["reference"], "A1");
        assert_eq!(json["formula"]["text"], "=1+1");
        assert!(json["formula"].get("expression").is_none());

        let back: Cell = serde_json::from_value(json).unwrap();
        assert_eq!(back.formula.expression, None);
        assert_eq!(back.value(), Some(&Value::Number(2.0)));
    }
}
