//! Table sessions
//!
//! A [`TableSession`] is the per-table entry point: it owns the sparse row
//! cache, the batch fetcher, the visible range and the column selection of
//! one table, and exposes a synchronous read API for rendering.
//!
//! Mutations never block on the network. Requests run on the Tokio runtime
//! the session was created in; when they complete the session version
//! advances and every [`subscribe`](TableSession::subscribe) receiver is
//! woken.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rowcache_lib::{Column, MemoryRowSource, Row, SessionConfig, TableSession};
//!
//! # async fn example() -> Result<(), rowcache_lib::Error> {
//! let rows = (0..1_000).map(|i| Row::new().set("id", i as i64)).collect();
//! let source = Arc::new(MemoryRowSource::new(vec![Column::new("id", "BIGINT")], rows));
//!
//! let session = TableSession::open("users", source, SessionConfig::default()).await?;
//! session.set_visible_range(480, 520);
//! session.wait_idle().await;
//! assert!(session.get_row(500).is_some());
//! # Ok(())
//! # }
//! ```

mod shared;
mod stream;

pub(crate) use shared::SessionState;
pub(crate) use shared::Shared;

use std::ops::Range;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::cache::BatchState;
use crate::config::SessionConfig;
use crate::error::Error;
use crate::fetch;
use crate::fetch::BatchFetcher;
use crate::fetch::FetchPlan;
use crate::model::Column;
use crate::model::Row;
use crate::source::RowSource;
use crate::source::TableId;
use crate::viewport::Viewport;
use crate::viewport::ViewportController;

/// Snapshot of a session's loading progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadState {
    /// Total rows in the table.
    pub total: usize,
    /// Rows currently cached.
    pub loaded_rows: usize,
    /// Batches with a request outstanding, ascending.
    pub in_flight: Vec<usize>,
    /// Whether a bulk stream is running.
    pub is_bulk_loading: bool,
    /// The most recent load failure, until cleared or reset.
    pub error: Option<String>,
    /// Session version the snapshot was taken at.
    pub version: u64,
}

impl LoadState {
    pub fn is_fully_loaded(&self) -> bool {
        self.loaded_rows >= self.total
    }

    /// Fraction of rows cached, `1.0` for an empty table.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.loaded_rows as f64 / self.total as f64
        }
    }
}

/// A cached, lazily loaded view of one table.
///
/// Cloning is cheap; clones share the same session.
#[derive(Clone)]
pub struct TableSession {
    shared: Arc<Shared>,
    viewport: ViewportController,
}

impl TableSession {
    /// Opens `table` by fetching its first batch, which also reports the
    /// schema and total row count.
    ///
    /// Must be called within a Tokio runtime. A failure here is returned as
    /// [`Error::Bootstrap`]; no session exists afterwards.
    pub async fn open(
        table: impl Into<TableId>,
        source: Arc<dyn RowSource>,
        config: SessionConfig,
    ) -> Result<Self, Error> {
        let shared = Arc::new(Shared::new(table.into(), source, config, current_runtime()?));
        let batch_size = shared.config.layout().batch_size();

        let page = fetch::fetch_page(&shared, batch_size, 0)
            .await
            .map_err(|err| match err {
                Error::Source(source) => Error::Bootstrap {
                    table: shared.table.clone(),
                    source,
                },
                other => other,
            })?;

        let total = {
            let mut state = shared.lock();
            let (columns, rows, total) = page.into_parts();
            state.cache.initialize(columns, total);
            let expected = state.cache.layout().batch_len(0, total);
            if rows.len() < expected {
                log::warn!(
                    "First batch of table {} returned {} of {} rows; leaving it unloaded",
                    shared.table,
                    rows.len(),
                    expected
                );
            } else {
                state.cache.append_batch(0, rows, 0);
            }
            shared.publish(&state);
            total
        };

        log::info!("Opened table {} ({} rows)", shared.table, total);
        Ok(Self::from_shared(shared))
    }

    /// Creates a session for a table whose schema and total are already
    /// known. No request is made until a range is requested.
    pub fn with_schema(
        table: impl Into<TableId>,
        source: Arc<dyn RowSource>,
        columns: Vec<Column>,
        total: usize,
        config: SessionConfig,
    ) -> Result<Self, Error> {
        let shared = Arc::new(Shared::new(table.into(), source, config, current_runtime()?));
        {
            let mut state = shared.lock();
            state.cache.initialize(columns, total);
            shared.publish(&state);
        }
        log::debug!("Created session for table {} ({} rows)", shared.table, total);
        Ok(Self::from_shared(shared))
    }

    fn from_shared(shared: Arc<Shared>) -> Self {
        let overscan = shared.config.overscan;
        let viewport = ViewportController::new(BatchFetcher::new(Arc::clone(&shared)), overscan);
        Self { shared, viewport }
    }

    /// Returns `true` if both handles refer to the same session.
    pub fn same_session(&self, other: &TableSession) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn table(&self) -> &TableId {
        &self.shared.table
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn source(&self) -> &Arc<dyn RowSource> {
        &self.shared.source
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Returns row `index` if it is cached. `None` means "not yet loaded"
    /// (render a placeholder) or out of range.
    pub fn get_row(&self, index: usize) -> Option<Arc<Row>> {
        self.shared.lock().cache.get_row(index)
    }

    /// Returns the cached rows of `range`, `None` for gaps.
    pub fn rows(&self, range: Range<usize>) -> Vec<Option<Arc<Row>>> {
        let state = self.shared.lock();
        range.map(|index| state.cache.get_row(index)).collect()
    }

    pub fn columns(&self) -> Vec<Column> {
        self.shared.lock().cache.columns().to_vec()
    }

    pub fn total(&self) -> usize {
        self.shared.lock().cache.total()
    }

    pub fn batch_state(&self, batch: usize) -> BatchState {
        self.shared.lock().cache.state(batch)
    }

    pub fn is_batch_loaded(&self, batch: usize) -> bool {
        self.shared.lock().cache.is_loaded(batch)
    }

    pub fn is_batch_loading(&self, batch: usize) -> bool {
        self.shared.lock().cache.is_loading(batch)
    }

    pub fn load_state(&self) -> LoadState {
        let state = self.shared.lock();
        LoadState {
            total: state.cache.total(),
            loaded_rows: state.cache.loaded_rows(),
            in_flight: state.cache.in_flight(),
            is_bulk_loading: state.bulk_loading,
            error: state.error.clone(),
            version: state.cache.version(),
        }
    }

    pub fn error(&self) -> Option<String> {
        self.shared.lock().error.clone()
    }

    /// Monotonic counter, advanced on every observable change.
    pub fn version(&self) -> u64 {
        self.shared.lock().cache.version()
    }

    /// Receives the session version whenever it advances.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.subscribe()
    }

    /// Resolves once no batch request is outstanding.
    pub async fn wait_idle(&self) {
        self.shared.wait_idle().await
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Reports the rows on screen. Every batch overlapping `start..=end`
    /// widened by the overscan margin is requested unless already loaded or
    /// in flight.
    pub fn set_visible_range(&self, start: usize, end: usize) -> FetchPlan {
        self.viewport.set_visible_range(start, end)
    }

    /// The last visible range reported.
    pub fn visible_range(&self) -> Option<Viewport> {
        self.viewport.visible_range()
    }

    /// Re-requests the last visible range.
    pub fn refresh(&self) -> FetchPlan {
        self.viewport.refresh()
    }

    /// Requests the batches covering `start..=end` without overscan.
    pub fn request_range(&self, start: usize, end: usize) -> FetchPlan {
        self.viewport.fetcher().request_range(start, end)
    }

    /// Drops every cached row, cancels outstanding requests and any bulk
    /// stream. Schema, total and column selection are kept.
    pub fn reset(&self) {
        let mut state = self.shared.lock();
        if state.closed {
            return;
        }
        state.abort_stream();
        state.reset_rows(&self.shared.shutdown);
        log::info!("Reset rows of table {}", self.shared.table);
        self.shared.publish(&state);
    }

    /// Replaces the schema and total. Everything [`reset`](Self::reset)
    /// drops is dropped too, and selected columns missing from the new
    /// schema are deselected.
    pub fn reinitialize(&self, columns: Vec<Column>, total: usize) {
        let mut state = self.shared.lock();
        if state.closed {
            return;
        }
        state.abort_stream();
        state.reinitialize(columns, total, &self.shared.shutdown);
        log::info!("Reinitialized table {} ({} rows)", self.shared.table, total);
        self.shared.publish(&state);
    }

    pub fn clear_error(&self) {
        let mut state = self.shared.lock();
        if state.error.take().is_some() {
            state.cache.bump();
            self.shared.publish(&state);
        }
    }

    /// Cancels all work and releases cached rows. Further requests are
    /// ignored and in-flight results are discarded.
    pub fn close(&self) {
        self.shared.close()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    // =========================================================================
    // Column selection
    // =========================================================================

    /// Selected columns in schema order.
    pub fn selected_columns(&self) -> Vec<String> {
        let state = self.shared.lock();
        state.selection.ordered(state.cache.columns())
    }

    pub fn is_column_selected(&self, name: &str) -> bool {
        self.shared.lock().selection.contains(name)
    }

    /// Flips `name` in or out of the selection; returns whether it is now
    /// selected.
    pub fn toggle_column(&self, name: &str) -> bool {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        let selected = state.selection.toggle(name, state.cache.columns());
        state.cache.bump();
        self.shared.publish(state);
        selected
    }

    pub fn select_all_columns(&self) {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        state.selection.select_all(state.cache.columns());
        state.cache.bump();
        self.shared.publish(state);
    }

    pub fn clear_column_selection(&self) {
        let mut state = self.shared.lock();
        state.selection.clear();
        state.cache.bump();
        self.shared.publish(&state);
    }

    /// Replaces the selection. Names not in the schema are ignored.
    pub fn set_selected_columns<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        state.selection.set_explicit(names, state.cache.columns());
        state.cache.bump();
        self.shared.publish(state);
    }
}

impl std::fmt::Debug for TableSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("TableSession")
            .field("table", &self.shared.table)
            .field("total", &state.cache.total())
            .field("loaded_rows", &state.cache.loaded_rows())
            .field("version", &state.cache.version())
            .field("closed", &state.closed)
            .finish()
    }
}

fn current_runtime() -> Result<Handle, Error> {
    Handle::try_current().map_err(|_| Error::NoRuntime)
}
