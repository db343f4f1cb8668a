//! In-memory row source

use std::sync::Arc;

use async_trait::async_trait;

use super::check_limit;
use super::RowPage;
use super::RowSource;
use super::TableId;
use crate::error::SourceError;
use crate::model::Column;
use crate::model::Row;

/// A row source serving a single table held in memory.
///
/// Every table id resolves to the same rows. Cheap to clone.
///
/// # Example
///
/// ```
/// use rowcache_lib::model::{Column, Row};
/// use rowcache_lib::source::MemoryRowSource;
///
/// let rows = (0..10).map(|i| Row::new().set("id", i as i64)).collect();
/// let source = MemoryRowSource::new(vec![Column::new("id", "BIGINT")], rows);
/// assert_eq!(source.len(), 10);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryRowSource {
    columns: Arc<Vec<Column>>,
    rows: Arc<Vec<Row>>,
}

impl MemoryRowSource {
    /// Creates a new source over the given schema and rows.
    pub fn new(columns: Vec<Column>, rows: Vec<Row>) -> Self {
        Self {
            columns: Arc::new(columns),
            rows: Arc::new(rows),
        }
    }

    /// Returns the number of rows served.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the source has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl RowSource for MemoryRowSource {
    async fn fetch_rows(
        &self,
        _table: &TableId,
        limit: usize,
        offset: usize,
    ) -> Result<RowPage, SourceError> {
        check_limit(limit)?;
        let start = offset.min(self.rows.len());
        let end = offset.saturating_add(limit).min(self.rows.len());
        Ok(RowPage::new(
            self.columns.as_ref().clone(),
            self.rows[start..end].to_vec(),
            self.rows.len(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(n: i64) -> MemoryRowSource {
        let rows = (0..n).map(|i| Row::new().set("id", i)).collect();
        MemoryRowSource::new(vec![Column::new("id", "BIGINT")], rows)
    }

    #[tokio::test]
    async fn test_fetch_slice() {
        let page = source(250).fetch_rows(&"t".into(), 100, 200).await.unwrap();
        assert_eq!(page.total(), 250);
        assert_eq!(page.len(), 50);
        assert_eq!(page.rows()[0].get_i64("id").unwrap(), Some(200));
    }

    #[tokio::test]
    async fn test_offset_past_end_is_empty() {
        let page = source(10).fetch_rows(&"t".into(), 100, 500).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total(), 10);
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        let err = source(10).fetch_rows(&"t".into(), 0, 0).await.unwrap_err();
        assert!(matches!(err, SourceError::InvalidRequest(_)));
    }
}
