//! Page type for row source responses.

use crate::model::Column;
use crate::model::Row;

/// One response of a [`RowSource`](super::RowSource): a contiguous run of
/// rows plus the table's schema and total row count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowPage {
    columns: Vec<Column>,
    rows: Vec<Row>,
    total: usize,
}

impl RowPage {
    /// Creates a new page.
    pub fn new(columns: Vec<Column>, rows: Vec<Row>, total: usize) -> Self {
        Self {
            columns,
            rows,
            total,
        }
    }

    /// Returns the table's columns.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the rows in this page.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Returns the table's total row count.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Consumes the page and returns its parts.
    pub fn into_parts(self) -> (Vec<Column>, Vec<Row>, usize) {
        (self.columns, self.rows, self.total)
    }

    /// Returns the number of rows in this page.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if this page has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
