//! Typed cell access errors

use crate::model::CellKind;

/// Returned by the typed getters of [`Row`](crate::model::Row).
///
/// A null cell is not an error; the getters report it as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("Row has no column '{0}'")]
    Missing(String),

    #[error("Column '{column}' holds {actual}, not {expected}")]
    Mismatch {
        column: String,
        expected: CellKind,
        actual: CellKind,
    },
}

impl FieldError {
    pub fn missing(column: impl Into<String>) -> Self {
        Self::Missing(column.into())
    }

    pub fn mismatch(column: impl Into<String>, expected: CellKind, actual: CellKind) -> Self {
        Self::Mismatch {
            column: column.into(),
            expected,
            actual,
        }
    }

    /// The column the failed access asked for.
    pub fn column(&self) -> &str {
        match self {
            Self::Missing(column) | Self::Mismatch { column, .. } => column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(FieldError::missing("id").to_string(), "Row has no column 'id'");
        assert_eq!(
            FieldError::mismatch("id", CellKind::Int, CellKind::String).to_string(),
            "Column 'id' holds string, not int"
        );
    }

    #[test]
    fn test_column() {
        assert_eq!(FieldError::missing("a").column(), "a");
        assert_eq!(FieldError::mismatch("b", CellKind::Bool, CellKind::Null).column(), "b");
    }
}
