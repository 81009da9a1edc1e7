// Formula parsing, evaluation and reference rewriting

pub mod eval;
pub mod fixer;
pub mod functions;
pub mod parser;
pub mod refs;
pub mod value;

pub use eval::{BasicEvaluator, EvaluationContext, FormulaEvaluator};
pub use parser::{A1Parser, Expr, FormulaParser, Op, ParseFailure};
pub use value::{ErrorKind, FormulaError, Value};
