//! Error types.
//!
//! Problems with a single cell's formula are data ([`FormulaError`] stored on
//! the cell), never `Err`. `Err` is reserved for rejected requests and for
//! engine defects ([`InternalFault`]).
//!
//! [`FormulaError`]: crate::formula::FormulaError

use std::path::PathBuf;

use thiserror::Error;

/// Error returned by engine operations.
///
/// Request errors are raised before anything is mutated.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid reference '{0}'")]
    InvalidReference(String),

    #[error("invalid label name '{name}': {reason}")]
    InvalidLabelName { name: String, reason: &'static str },

    #[error("{axis} count must not be negative (got {count})")]
    NegativeCount { axis: &'static str, count: i64 },

    #[error("{axis} {value} is beyond the last {axis} ({max})")]
    OutOfBounds { axis: &'static str, value: u32, max: u32 },

    #[error("cell {cell} lies outside the source range {range}")]
    CellOutsideSource { cell: String, range: String },

    #[error(transparent)]
    Internal(#[from] InternalFault),
}

/// A violated engine invariant. Seeing one of these means a bug in the engine,
/// not bad input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalFault {
    #[error("invalid status transition for {reference}: {event} while {status}")]
    InvalidTransition {
        reference: String,
        status: &'static str,
        event: &'static str,
    },

    #[error("{reference} has no usable value while {status}")]
    NoValue { reference: String, status: &'static str },

    #[error("{reference} was never touched by this operation")]
    Untracked { reference: String },

    #[error("cell {reference} has no value, error or expression to evaluate")]
    Unevaluable { reference: String },

    #[error("reference rewrite produced {count} nodes, expected exactly one")]
    RewriteArity { count: usize },
}

/// Error loading an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid engine configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}
