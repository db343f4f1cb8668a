//! Batch index arithmetic

use std::ops::Range;
use std::ops::RangeInclusive;

use crate::source::MAX_BATCH_SIZE;

/// Rows per batch used when nothing else is configured.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Load state of one batch.
///
/// Transitions are monotonic, `Unrequested -> InFlight -> Loaded`, except
/// that a failed fetch returns an `InFlight` batch to `Unrequested` and a
/// session reset returns every batch to `Unrequested`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchState {
    /// Never requested, or released after a failure.
    Unrequested,
    /// A fetch is outstanding.
    InFlight,
    /// Rows are merged into the cache.
    Loaded,
}

/// Maps absolute row indices onto fixed-size batches.
///
/// Batch `b` covers rows `[b * batch_size, (b + 1) * batch_size)`, truncated
/// at the table's total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLayout {
    batch_size: usize,
}

impl BatchLayout {
    /// Creates a layout; `batch_size` is clamped to `[1, MAX_BATCH_SIZE]`.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
        }
    }

    /// Returns the number of rows per batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns the batch containing `row`.
    pub fn batch_of(&self, row: usize) -> usize {
        row / self.batch_size
    }

    /// Returns the absolute index of the first row of `batch`.
    pub fn batch_start(&self, batch: usize) -> usize {
        batch.saturating_mul(self.batch_size)
    }

    /// Returns how many rows `batch` holds in a table of `total` rows.
    ///
    /// Zero for batches past the end.
    pub fn batch_len(&self, batch: usize, total: usize) -> usize {
        total.saturating_sub(self.batch_start(batch)).min(self.batch_size)
    }

    /// Returns the row range covered by `batch`, truncated at `total`.
    pub fn batch_rows(&self, batch: usize, total: usize) -> Range<usize> {
        let start = self.batch_start(batch).min(total);
        start..start + self.batch_len(batch, total)
    }

    /// Returns the number of batches in a table of `total` rows.
    pub fn batch_count(&self, total: usize) -> usize {
        total.div_ceil(self.batch_size)
    }

    /// Returns the last batch index of a table, or `None` when it is empty.
    pub fn last_batch(&self, total: usize) -> Option<usize> {
        total.checked_sub(1).map(|last_row| self.batch_of(last_row))
    }

    /// Returns the batches covering rows `[start, end]`, with `end` clamped
    /// to the last row. `None` when the range is empty after clamping.
    pub fn batches_covering(
        &self,
        start: usize,
        end: usize,
        total: usize,
    ) -> Option<RangeInclusive<usize>> {
        let last_row = total.checked_sub(1)?;
        let end = end.min(last_row);
        if start > end {
            return None;
        }
        Some(self.batch_of(start)..=self.batch_of(end))
    }
}

impl Default for BatchLayout {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}
