//! Column schema

use serde::Deserialize;
use serde::Serialize;

/// Declared type used when the source cannot report one.
pub const DEFAULT_COLUMN_TYPE: &str = "VARCHAR";

/// A column of a table: its name and the declared type reported by the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    /// Column name, also the key of the cell in every [`Row`](super::Row).
    pub name: String,
    /// Declared type (e.g. `VARCHAR`, `BIGINT`).
    #[serde(rename = "type", default = "default_column_type")]
    pub column_type: String,
}

fn default_column_type() -> String {
    DEFAULT_COLUMN_TYPE.to_string()
}

impl Column {
    /// Creates a new column.
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }

    /// Creates a column with the default declared type.
    pub fn untyped(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_COLUMN_TYPE)
    }
}
