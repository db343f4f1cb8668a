//! Sparse row cache
//!
//! Holds a partially loaded table addressable by absolute row index, along
//! with per-batch load state. The cache performs no I/O; the session's fetch
//! tasks are its only writers.

mod batch;

pub use batch::*;

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::model::Column;
use crate::model::Row;

/// Sparse store of rows keyed by absolute index.
///
/// Invariants:
/// - a row at index `i` is present only if `batch_of(i)` is loaded;
/// - every stored index lies in `[0, total)`;
/// - a populated index is never overwritten;
/// - `version` strictly increases on every mutation.
///
/// # Example
///
/// ```
/// use rowcache_lib::cache::{BatchLayout, SparseRowCache};
/// use rowcache_lib::model::{Column, Row};
///
/// let mut cache = SparseRowCache::new(BatchLayout::new(100));
/// cache.initialize(vec![Column::untyped("id")], 250);
///
/// assert!(cache.mark_loading(1));
/// cache.append_batch(1, vec![Row::new().set("id", 100i64)], 100);
///
/// assert!(cache.is_loaded(1));
/// assert!(cache.get_row(100).is_some());
/// assert!(cache.get_row(101).is_none());
/// ```
#[derive(Debug, Clone)]
pub struct SparseRowCache {
    layout: BatchLayout,
    columns: Vec<Column>,
    total: usize,
    rows: HashMap<usize, Arc<Row>>,
    loaded: HashSet<usize>,
    in_flight: HashSet<usize>,
    version: u64,
}

impl SparseRowCache {
    /// Creates an empty cache for a table of zero rows.
    pub fn new(layout: BatchLayout) -> Self {
        Self {
            layout,
            columns: Vec::new(),
            total: 0,
            rows: HashMap::new(),
            loaded: HashSet::new(),
            in_flight: HashSet::new(),
            version: 0,
        }
    }

    /// Resets all state and adopts a new schema and total.
    ///
    /// Every cached row and batch mark is dropped, so absolute offsets from
    /// before the call are never trusted against the new total.
    pub fn initialize(&mut self, columns: Vec<Column>, total: usize) {
        self.columns = columns;
        self.total = total;
        self.clear_rows();
    }

    /// Drops all rows and batch marks but keeps the schema and total.
    pub fn clear_rows(&mut self) {
        self.rows.clear();
        self.loaded.clear();
        self.in_flight.clear();
        self.bump();
    }

    /// Returns the row at `index`, or `None` if it is not loaded yet or
    /// lies outside the table.
    pub fn get_row(&self, index: usize) -> Option<Arc<Row>> {
        if index >= self.total {
            return None;
        }
        self.rows.get(&index).cloned()
    }

    /// Merges `rows` starting at absolute row `offset` and marks `batch`
    /// loaded.
    ///
    /// Only rows that fall inside `batch`'s row range are stored; indices
    /// already populated keep their first value, so re-appending a loaded
    /// batch only advances the version. Returns the number of rows newly
    /// stored.
    pub fn append_batch(&mut self, batch: usize, rows: Vec<Row>, offset: usize) -> usize {
        let range = self.layout.batch_rows(batch, self.total);
        let mut merged = 0;

        for (i, row) in rows.into_iter().enumerate() {
            let index = offset + i;
            if index < range.start {
                continue;
            }
            if index >= range.end {
                break;
            }
            if let std::collections::hash_map::Entry::Vacant(slot) = self.rows.entry(index) {
                slot.insert(Arc::new(row));
                merged += 1;
            }
        }

        if !range.is_empty() {
            self.loaded.insert(batch);
        }
        self.in_flight.remove(&batch);
        self.bump();
        merged
    }

    /// Marks `batch` in flight.
    ///
    /// Returns `false` without changing anything when the batch is already
    /// loaded, already in flight, or past the end of the table. The check and
    /// the mark happen together so two callers can never both win.
    pub fn mark_loading(&mut self, batch: usize) -> bool {
        if self.layout.batch_len(batch, self.total) == 0 || self.loaded.contains(&batch) {
            return false;
        }
        self.in_flight.insert(batch)
    }

    /// Clears the in-flight mark of a failed batch so it can be retried.
    pub fn release_loading(&mut self, batch: usize) -> bool {
        self.in_flight.remove(&batch)
    }

    /// Returns `true` if `batch` is loaded.
    pub fn is_loaded(&self, batch: usize) -> bool {
        self.loaded.contains(&batch)
    }

    /// Returns `true` if a fetch for `batch` is outstanding.
    pub fn is_loading(&self, batch: usize) -> bool {
        self.in_flight.contains(&batch)
    }

    /// Returns the load state of `batch`.
    pub fn state(&self, batch: usize) -> BatchState {
        if self.loaded.contains(&batch) {
            BatchState::Loaded
        } else if self.in_flight.contains(&batch) {
            BatchState::InFlight
        } else {
            BatchState::Unrequested
        }
    }

    /// Returns `true` if no batch is in flight.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Returns the in-flight batch indices, sorted.
    pub fn in_flight(&self) -> Vec<usize> {
        let mut batches: Vec<usize> = self.in_flight.iter().copied().collect();
        batches.sort_unstable();
        batches
    }

    /// Returns the number of rows currently stored.
    pub fn loaded_rows(&self) -> usize {
        self.rows.len()
    }

    /// Returns the table's columns.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the table's total row count.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Returns the batch layout.
    pub fn layout(&self) -> BatchLayout {
        self.layout
    }

    /// Returns the current version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Advances the version without touching rows.
    ///
    /// Used for mutations the cache does not own (error slot, selection).
    pub fn bump(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}
