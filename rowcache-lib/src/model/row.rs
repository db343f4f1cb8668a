//! Dynamic table row

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use super::CellKind;
use super::Value;
use crate::error::FieldError;

/// One record of a table, keyed by column name.
///
/// Rows are immutable once merged into a session; the cache hands them out
/// as `Arc<Row>`.
///
/// # Example
///
/// ```
/// use rowcache_lib::model::Row;
///
/// let row = Row::new()
///     .set("name", "Contoso")
///     .set("employees", 250i64);
///
/// assert_eq!(row.get_str("name").unwrap(), Some("Contoso"));
/// assert_eq!(row.get_i64("employees").unwrap(), Some(250));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    cells: HashMap<String, Value>,
}

impl Row {
    /// Creates a new empty row.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Raw cell access
    // =========================================================================

    /// Returns a reference to the cell value, if the column exists.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells.get(column)
    }

    /// Returns `true` if the row contains the given column.
    pub fn contains(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }

    /// Returns a reference to all cells.
    pub fn cells(&self) -> &HashMap<String, Value> {
        &self.cells
    }

    /// Returns the number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if the row has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Renders a cell for a text grid. Missing and null cells render empty.
    pub fn display(&self, column: &str) -> String {
        self.cells.get(column).map(Value::display).unwrap_or_default()
    }

    // =========================================================================
    // Setters
    // =========================================================================

    /// Sets a cell value (builder pattern).
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cells.insert(column.into(), value.into());
        self
    }

    /// Inserts a cell value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.cells.insert(column.into(), value.into());
    }

    // =========================================================================
    // Typed getters
    //
    // Err if the column is missing or holds another kind of value.
    // Ok(None) if the cell is null.
    // =========================================================================

    pub fn get_str(&self, column: &str) -> Result<Option<&str>, FieldError> {
        self.typed(column, CellKind::String, Value::as_str)
    }

    pub fn get_bool(&self, column: &str) -> Result<Option<bool>, FieldError> {
        self.typed(column, CellKind::Bool, Value::as_bool)
    }

    pub fn get_i64(&self, column: &str) -> Result<Option<i64>, FieldError> {
        self.typed(column, CellKind::Int, Value::as_i64)
    }

    /// Gets a float cell value. Integers are widened.
    pub fn get_f64(&self, column: &str) -> Result<Option<f64>, FieldError> {
        self.typed(column, CellKind::Float, Value::as_f64)
    }

    fn typed<'a, T>(
        &'a self,
        column: &str,
        expected: CellKind,
        extract: impl FnOnce(&'a Value) -> Option<T>,
    ) -> Result<Option<T>, FieldError> {
        let value = self.cells.get(column).ok_or_else(|| FieldError::missing(column))?;
        if value.is_null() {
            return Ok(None);
        }
        match extract(value) {
            Some(v) => Ok(Some(v)),
            None => Err(FieldError::mismatch(column, expected, value.kind())),
        }
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_row_object() {
        let json = r#"{"name": "Contoso", "revenue": 1000000, "active": true, "note": null}"#;
        let row: Row = serde_json::from_str(json).unwrap();

        assert_eq!(row.get_str("name").unwrap(), Some("Contoso"));
        assert_eq!(row.get_i64("revenue").unwrap(), Some(1_000_000));
        assert_eq!(row.get_bool("active").unwrap(), Some(true));
        assert_eq!(row.get_str("note").unwrap(), None);
    }

    #[test]
    fn test_missing_and_mismatch() {
        let row = Row::new().set("n", 1i64);

        assert_eq!(row.get_i64("x"), Err(FieldError::missing("x")));
        assert_eq!(
            row.get_str("n"),
            Err(FieldError::mismatch("n", CellKind::String, CellKind::Int))
        );
        assert_eq!(row.get_f64("n").unwrap(), Some(1.0));
    }

    #[test]
    fn test_display_cell() {
        let row = Row::new().set("a", Value::Null).set("b", 2.5);
        assert_eq!(row.display("a"), "");
        assert_eq!(row.display("b"), "2.5");
        assert_eq!(row.display("missing"), "");
    }
}
