pub mod axis;
pub mod cache;
pub mod cell;
pub mod changes;
pub mod config;
pub mod engine;
pub mod error;
pub mod formula;
pub mod label;
pub mod reference;
pub mod store;

#[cfg(test)]
pub mod harness;

pub use axis::{AxisKind, Header};
pub use cell::{Cell, Formula};
pub use config::EngineConfig;
pub use engine::{Engine, EngineDelta};
pub use error::{ConfigError, EngineError, InternalFault};
pub use formula::{ErrorKind, FormulaError, Value};
pub use label::{LabelMapping, LabelName, LabelTarget};
pub use reference::{CellRange, CellRef, ColumnRef, ReferenceKind, RowRef};
pub use store::EngineStores;
