//! Labels: user-defined names for cells, ranges and other labels.
//!
//! Labels let formulas say `=SUM(Revenue)` instead of `=SUM(B2:B40)`. A label
//! may point at another label; chains are followed at evaluation time until
//! they reach a cell or a range.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::formula::FormulaError;
use crate::reference::{parse_cell_ref, CellRange, CellRef};
use crate::store::LabelStore;

/// A validated label name. Case is preserved for display; comparison, ordering
/// and hashing are case-insensitive.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct LabelName(String);

impl LabelName {
    pub fn new(name: impl AsRef<str>) -> Result<Self, EngineError> {
        let name = name.as_ref().trim();
        validate_label_name(name).map_err(|reason| EngineError::InvalidLabelName {
            name: name.to_string(),
            reason,
        })?;
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for LabelName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for LabelName {}

impl Hash for LabelName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_uppercase());
        }
    }
}

impl Ord for LabelName {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.0.bytes().map(|b| b.to_ascii_uppercase());
        let b = other.0.bytes().map(|b| b.to_ascii_uppercase());
        a.cmp(b)
    }
}

impl PartialOrd for LabelName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LabelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LabelName {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LabelName> for String {
    fn from(value: LabelName) -> Self {
        value.0
    }
}

/// What a label points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelTarget {
    Cell(CellRef),
    Range(CellRange),
    Label(LabelName),
}

impl fmt::Display for LabelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelTarget::Cell(cell) => write!(f, "{}", cell),
            LabelTarget::Range(range) => write!(f, "{}", range),
            LabelTarget::Label(label) => write!(f, "{}", label),
        }
    }
}

/// A label and its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMapping {
    pub label: LabelName,
    pub target: LabelTarget,
}

impl LabelMapping {
    pub fn new(label: LabelName, target: LabelTarget) -> Self {
        Self { label, target }
    }

    pub fn cell(label: LabelName, cell: CellRef) -> Self {
        Self::new(label, LabelTarget::Cell(cell))
    }

    pub fn range(label: LabelName, range: CellRange) -> Self {
        Self::new(label, LabelTarget::Range(range))
    }

    pub fn alias(label: LabelName, other: LabelName) -> Self {
        Self::new(label, LabelTarget::Label(other))
    }
}

/// The cell or range a label chain ends at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedTarget {
    Cell(CellRef),
    Range(CellRange),
}

impl ResolvedTarget {
    pub fn contains(&self, cell: CellRef) -> bool {
        match self {
            ResolvedTarget::Cell(target) => target.normalized() == cell.normalized(),
            ResolvedTarget::Range(range) => range.contains(cell),
        }
    }
}

/// Result of following a label chain.
#[derive(Debug, Clone)]
pub struct LabelChain {
    /// Every label visited, starting with the one asked for.
    pub visited: Vec<LabelName>,
    pub end: Result<ResolvedTarget, FormulaError>,
}

/// Follow `name` through the label store, at most `max_depth` mappings deep.
///
/// Unknown labels, cycles and chains longer than `max_depth` all end in a
/// `#NAME?` error.
pub fn follow_chain(labels: &dyn LabelStore, name: &LabelName, max_depth: usize) -> LabelChain {
    let mut visited = Vec::new();
    let mut seen = FxHashSet::default();
    let mut current = name.clone();

    for _ in 0..max_depth {
        if !seen.insert(current.clone()) {
            let end = Err(FormulaError::name(format!("Label {} refers to itself", current)));
            return LabelChain { visited, end };
        }
        visited.push(current.clone());
        let Some(mapping) = labels.load(&current) else {
            let end = Err(FormulaError::name(format!("Unknown label {}", current)));
            return LabelChain { visited, end };
        };
        match mapping.target {
            LabelTarget::Cell(cell) => {
                return LabelChain { visited, end: Ok(ResolvedTarget::Cell(cell)) };
            }
            LabelTarget::Range(range) => {
                return LabelChain { visited, end: Ok(ResolvedTarget::Range(range)) };
            }
            LabelTarget::Label(next) => current = next,
        }
    }

    let end = Err(FormulaError::name(format!(
        "Label {} does not resolve within {} steps",
        name, max_depth
    )));
    LabelChain { visited, end }
}

pub fn resolve_label(
    labels: &dyn LabelStore,
    name: &LabelName,
    max_depth: usize,
) -> Result<ResolvedTarget, FormulaError> {
    follow_chain(labels, name, max_depth).end
}

/// Validate a label identifier
/// Rules:
/// - Must start with letter or underscore
/// - Can contain letters, numbers, underscores, and dots (for namespaces)
/// - Cannot be a cell reference (A1, BC23) or a range (A1:B2)
/// - Cannot be a function name (SUM, IF) or a boolean literal (TRUE, FALSE)
pub fn validate_label_name(name: &str) -> Result<(), &'static str> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err("name cannot be empty");
    };

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err("name must start with a letter or underscore");
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        return Err("name can only contain letters, numbers, underscores, and dots");
    }

    if name.ends_with('.') {
        return Err("name cannot end with a dot");
    }

    if name.contains("..") {
        return Err("name cannot have consecutive dots");
    }

    if parse_cell_ref(name).is_some() {
        return Err("name looks like a cell reference");
    }

    let upper = name.to_ascii_uppercase();

    if upper == "TRUE" || upper == "FALSE" {
        return Err("name is a reserved boolean value");
    }

    if is_function_name(&upper) {
        return Err("name is a function name");
    }

    Ok(())
}

fn is_function_name(upper_name: &str) -> bool {
    const FUNCTIONS: &[&str] = &[
        // Implemented
        "SUM", "MIN", "MAX", "COUNT", "AVERAGE", "PRODUCT",
        "IF", "AND", "OR", "NOT", "ABS", "ROUND",
        "CONCAT", "CONCATENATE", "LEN", "UPPER", "LOWER",
        "ISERROR", "IFERROR", "INVALIDCELLREFERENCE",

        // Reserved so existing workbooks keep parsing the same way
        "SUMIF", "SUMIFS", "COUNTA", "COUNTIF", "COUNTIFS", "AVERAGEIF",
        "MEDIAN", "MOD", "POWER", "SQRT", "INT", "TRUNC",
        "LEFT", "RIGHT", "MID", "FIND", "SEARCH", "TEXT", "VALUE", "TRIM",
        "VLOOKUP", "HLOOKUP", "XLOOKUP", "INDEX", "MATCH", "OFFSET", "INDIRECT",
        "ROW", "ROWS", "COLUMN", "COLUMNS",
        "DATE", "NOW", "TODAY", "YEAR", "MONTH", "DAY",
    ];

    FUNCTIONS.contains(&upper_name)
}
