//! Bulk loading from a row stream.

use futures::Stream;
use futures::StreamExt;

use super::TableSession;
use crate::cache::BatchLayout;
use crate::error::Error;
use crate::error::SourceError;
use crate::model::Row;
use crate::source::StreamMessage;

impl TableSession {
    /// Loads the table from a stream of [`StreamMessage`]s, such as
    /// [`HttpRowSource::stream_rows`](crate::source::HttpRowSource::stream_rows).
    ///
    /// Rows are merged one full batch at a time so partially received
    /// batches are never marked loaded. A `metadata` message announcing a
    /// different schema or total reinitializes the session first. Starting
    /// a new stream aborts the previous one.
    ///
    /// Returns the number of rows merged into the cache.
    pub async fn load_stream<S>(&self, stream: S) -> Result<usize, Error>
    where
        S: Stream<Item = Result<StreamMessage, SourceError>>,
    {
        let (token, mut generation, mut assembler) = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(Error::Closed);
            }
            if state.abort_stream() {
                log::debug!("Replacing running stream of table {}", self.shared.table);
            }
            let token = self.shared.shutdown.child_token();
            state.stream_cancel = Some(token.clone());
            state.bulk_loading = true;
            state.cache.bump();
            self.shared.publish(&state);

            let assembler = BatchAssembler::new(state.cache.layout(), state.cache.total());
            (token, state.generation, assembler)
        };

        let mut stream = std::pin::pin!(stream);
        let mut merged = 0;

        let result = loop {
            let message = tokio::select! {
                _ = token.cancelled() => break Err(Error::Aborted),
                message = stream.next() => message,
            };

            let mut state = self.shared.lock();
            if !state.is_current(generation) {
                break Err(Error::Aborted);
            }

            match message {
                Some(Ok(StreamMessage::Metadata { columns, total, .. })) => {
                    if total != state.cache.total() || columns != state.cache.columns() {
                        log::info!(
                            "Stream of table {} announced {} rows; reinitializing",
                            self.shared.table,
                            total
                        );
                        state.reinitialize(columns, total, &self.shared.shutdown);
                        generation = state.generation;
                    }
                    assembler = BatchAssembler::new(state.cache.layout(), total);
                    self.shared.publish(&state);
                }
                Some(Ok(StreamMessage::Batch { offset, data })) => {
                    let batches = assembler.push(offset, data);
                    if batches.is_empty() {
                        continue;
                    }
                    for batch in batches {
                        if !state.cache.is_loaded(batch.batch) {
                            merged += state.cache.append_batch(batch.batch, batch.rows, batch.offset);
                        }
                    }
                    self.shared.publish(&state);
                }
                Some(Ok(StreamMessage::Complete { total_loaded })) => {
                    log::info!(
                        "Stream of table {} complete: {} rows sent, {} merged",
                        self.shared.table,
                        total_loaded,
                        merged
                    );
                    break Ok(merged);
                }
                Some(Ok(StreamMessage::Error { error })) => {
                    state.set_error(error.clone());
                    break Err(Error::Stream(error));
                }
                Some(Err(err)) => {
                    state.set_error(format!("Stream failed: {}", err));
                    break Err(err.into());
                }
                None => {
                    log::warn!("Stream of table {} ended without a complete message", self.shared.table);
                    break Ok(merged);
                }
            }
        };

        let dropped = assembler.pending();
        if dropped > 0 {
            log::debug!(
                "Discarding {} rows of an incomplete batch of table {}",
                dropped,
                self.shared.table
            );
        }

        let mut state = self.shared.lock();
        if !token.is_cancelled() {
            state.stream_cancel = None;
            state.bulk_loading = false;
            state.cache.bump();
            self.shared.publish(&state);
        }
        if let Err(err) = &result {
            log::warn!("Stream of table {} stopped: {}", self.shared.table, err);
        }
        result
    }

    /// Aborts the running bulk stream. Rows already merged stay cached.
    pub fn abort_stream(&self) {
        let mut state = self.shared.lock();
        if state.abort_stream() {
            state.cache.bump();
            self.shared.publish(&state);
        }
    }

    pub fn is_bulk_loading(&self) -> bool {
        self.shared.lock().bulk_loading
    }
}

/// A full batch cut from streamed rows.
#[derive(Debug)]
pub(crate) struct AssembledBatch {
    pub(crate) batch: usize,
    pub(crate) offset: usize,
    pub(crate) rows: Vec<Row>,
}

/// Regroups arbitrarily sized runs of streamed rows into cache batches.
///
/// Runs must arrive in order. A run that does not continue the previous one
/// discards the pending rows and restarts at the next batch boundary.
#[derive(Debug)]
pub(crate) struct BatchAssembler {
    layout: BatchLayout,
    total: usize,
    /// Absolute index of `pending[0]`; always a batch boundary.
    start: usize,
    pending: Vec<Row>,
}

impl BatchAssembler {
    pub(crate) fn new(layout: BatchLayout, total: usize) -> Self {
        Self {
            layout,
            total,
            start: 0,
            pending: Vec::new(),
        }
    }

    /// Adds rows starting at absolute row `offset` and returns every batch
    /// completed by them.
    pub(crate) fn push(&mut self, offset: usize, mut rows: Vec<Row>) -> Vec<AssembledBatch> {
        if offset != self.start + self.pending.len() {
            if !self.pending.is_empty() {
                log::warn!(
                    "Stream jumped from row {} to {}; dropping {} pending rows",
                    self.start + self.pending.len(),
                    offset,
                    self.pending.len()
                );
                self.pending.clear();
            }
            let size = self.layout.batch_size();
            let boundary = offset.div_ceil(size) * size;
            let skip = (boundary - offset).min(rows.len());
            rows.drain(..skip);
            self.start = boundary;
            if rows.is_empty() {
                return Vec::new();
            }
        }

        self.pending.extend(rows);

        let mut complete = Vec::new();
        loop {
            if self.start >= self.total {
                self.pending.clear();
                break;
            }
            let batch = self.layout.batch_of(self.start);
            let len = self.layout.batch_len(batch, self.total);
            if self.pending.len() < len {
                break;
            }
            let rest = self.pending.split_off(len);
            let rows = std::mem::replace(&mut self.pending, rest);
            complete.push(AssembledBatch {
                batch,
                offset: self.start,
                rows,
            });
            self.start += len;
        }
        complete
    }

    /// Rows received but not yet part of a full batch.
    pub(crate) fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(range: std::ops::Range<i64>) -> Vec<Row> {
        range.map(|i| Row::new().set("id", i)).collect()
    }

    fn ids(batch: &AssembledBatch) -> (i64, i64) {
        let first = batch.rows.first().and_then(|r| r.get_i64("id").ok().flatten());
        let last = batch.rows.last().and_then(|r| r.get_i64("id").ok().flatten());
        (first.unwrap_or(-1), last.unwrap_or(-1))
    }

    #[test]
    fn test_regroups_uneven_runs() {
        let mut assembler = BatchAssembler::new(BatchLayout::new(10), 25);

        assert!(assembler.push(0, rows(0..7)).is_empty());
        assert_eq!(assembler.pending(), 7);

        let done = assembler.push(7, rows(7..18));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].batch, 0);
        assert_eq!(done[0].offset, 0);
        assert_eq!(ids(&done[0]), (0, 9));
        assert_eq!(assembler.pending(), 8);

        // Last batch is short.
        let done = assembler.push(18, rows(18..25));
        assert_eq!(done.len(), 2);
        assert_eq!((done[0].batch, done[0].offset), (1, 10));
        assert_eq!((done[1].batch, done[1].offset), (2, 20));
        assert_eq!(done[1].rows.len(), 5);
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_one_run_spanning_batches() {
        let mut assembler = BatchAssembler::new(BatchLayout::new(10), 100);
        let done = assembler.push(0, rows(0..35));
        assert_eq!(done.iter().map(|b| b.batch).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(assembler.pending(), 5);
    }

    #[test]
    fn test_misaligned_start_skips_to_boundary() {
        let mut assembler = BatchAssembler::new(BatchLayout::new(10), 100);
        let done = assembler.push(5, rows(5..25));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].batch, 1);
        assert_eq!(ids(&done[0]), (10, 19));
        assert_eq!(assembler.pending(), 5);
    }

    #[test]
    fn test_gap_drops_pending() {
        let mut assembler = BatchAssembler::new(BatchLayout::new(10), 100);
        assembler.push(0, rows(0..6));

        let done = assembler.push(20, rows(20..30));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].batch, 2);
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_rows_past_total_dropped() {
        let mut assembler = BatchAssembler::new(BatchLayout::new(10), 12);
        let done = assembler.push(0, rows(0..20));
        assert_eq!(done.len(), 2);
        assert_eq!(done[1].rows.len(), 2);
        assert_eq!(assembler.pending(), 0);
    }
}
