//! Paginated row sources
//!
//! A [`RowSource`] answers "give me `limit` rows of table `T` starting at
//! `offset`" together with the table's schema and total row count. The cache
//! treats it as a black box; [`HttpRowSource`] talks to the data endpoint and
//! [`MemoryRowSource`] serves rows held in process.

mod http;
mod memory;
mod page;
mod stream;

pub use http::*;
pub use memory::*;
pub use page::*;
pub use stream::*;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::error::SourceError;

/// Largest `limit` a single request may ask for.
pub const MAX_BATCH_SIZE: usize = 50_000;

/// Identifier of a table (datasource) on the row source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(String);

impl TableId {
    /// Creates a new table identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TableId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TableId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for TableId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Trait for paginated row sources.
///
/// Implementations must be safe to call concurrently for disjoint offsets and
/// must report the same `total` for a table while it is open. A changed total
/// is treated by the session as a destructive reset.
///
/// # Example
///
/// ```ignore
/// use rowcache_lib::source::{RowSource, TableId};
///
/// let page = source.fetch_rows(&TableId::from("42"), 100, 200).await?;
/// println!("{} of {} rows", page.len(), page.total());
/// ```
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Fetches up to `limit` rows of `table` starting at absolute row `offset`.
    async fn fetch_rows(
        &self,
        table: &TableId,
        limit: usize,
        offset: usize,
    ) -> Result<RowPage, SourceError>;
}

/// Rejects limits outside `[1, MAX_BATCH_SIZE]`.
pub(crate) fn check_limit(limit: usize) -> Result<(), SourceError> {
    if limit == 0 || limit > MAX_BATCH_SIZE {
        return Err(SourceError::InvalidRequest(format!(
            "limit must be between 1 and {}, got {}",
            MAX_BATCH_SIZE, limit
        )));
    }
    Ok(())
}
