use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Engine config
// ---------------------------------------------------------------------------

/// Grid limits and resolution bounds for an [`Engine`](crate::engine::Engine).
///
/// Every field has a default, so an empty TOML document is a valid config:
///
/// ```toml
/// max_column = 16384
/// max_row = 1048576
/// max_label_depth = 16
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Number of addressable columns. The last column index is `max_column - 1`.
    pub max_column: u32,
    /// Number of addressable rows. The last row index is `max_row - 1`.
    pub max_row: u32,
    /// Longest label chain followed before giving up with a `#NAME?` error.
    pub max_label_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_column: 16_384,
            max_row: 1_048_576,
            max_label_depth: 16,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_column == 0 {
            return Err(ConfigError::Zero { field: "max_column" });
        }
        if self.max_row == 0 {
            return Err(ConfigError::Zero { field: "max_row" });
        }
        if self.max_label_depth == 0 {
            return Err(ConfigError::Zero { field: "max_label_depth" });
        }
        Ok(())
    }

    /// Last valid zero-based column index.
    pub fn last_column(&self) -> u32 {
        self.max_column.saturating_sub(1)
    }

    /// Last valid zero-based row index.
    pub fn last_row(&self) -> u32 {
        self.max_row.saturating_sub(1)
    }
}
