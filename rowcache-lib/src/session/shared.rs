//! State shared between a session handle and its fetch tasks.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::cache::SparseRowCache;
use crate::config::SessionConfig;
use crate::error::Error;
use crate::fetch;
use crate::fetch::ConcurrencyLimiter;
use crate::model::Column;
use crate::selection::ColumnSelection;
use crate::source::RowPage;
use crate::source::RowSource;
use crate::source::TableId;
use crate::viewport::Viewport;

/// Everything a session owns. Handles and fetch tasks hold it by `Arc`.
///
/// All mutation goes through [`Shared::lock`]; the guard is never held
/// across an `.await`.
pub(crate) struct Shared {
    pub(crate) table: TableId,
    pub(crate) source: Arc<dyn RowSource>,
    pub(crate) config: SessionConfig,
    pub(crate) runtime: Handle,
    pub(crate) limiter: ConcurrencyLimiter,
    /// Cancelled when the session closes; parent of every other token.
    pub(crate) shutdown: CancellationToken,
    state: Mutex<SessionState>,
    version_tx: watch::Sender<u64>,
    idle: Notify,
}

/// Mutable part of a session.
pub(crate) struct SessionState {
    pub(crate) cache: SparseRowCache,
    pub(crate) selection: ColumnSelection,
    pub(crate) error: Option<String>,
    pub(crate) bulk_loading: bool,
    pub(crate) viewport: Option<Viewport>,
    /// Bumped on every reset; completions from older generations are dropped.
    pub(crate) generation: u64,
    /// Cancels the fetch tasks of the current generation.
    pub(crate) cancel: CancellationToken,
    /// Cancels the running bulk stream, if any.
    pub(crate) stream_cancel: Option<CancellationToken>,
    pub(crate) closed: bool,
}

impl Shared {
    pub(crate) fn new(
        table: TableId,
        source: Arc<dyn RowSource>,
        config: SessionConfig,
        runtime: Handle,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let state = SessionState {
            cache: SparseRowCache::new(config.layout()),
            selection: ColumnSelection::new(),
            error: None,
            bulk_loading: false,
            viewport: None,
            generation: 0,
            cancel: shutdown.child_token(),
            stream_cancel: None,
            closed: false,
        };
        let (version_tx, _) = watch::channel(state.cache.version());

        Self {
            table,
            source,
            limiter: ConcurrencyLimiter::new(config.max_concurrent_fetches),
            config,
            runtime,
            shutdown,
            state: Mutex::new(state),
            version_tx,
            idle: Notify::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Announces the state's version and wakes idle waiters when nothing is
    /// in flight. Call after every mutation, with the guard still held.
    pub(crate) fn publish(&self, state: &SessionState) {
        self.version_tx.send_replace(state.cache.version());
        if state.closed || state.cache.is_idle() {
            self.idle.notify_waiters();
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    /// Resolves once no batch is in flight or the session is closed.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            {
                let state = self.lock();
                if state.closed || state.cache.is_idle() {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Merges the outcome of a batch fetch issued under `generation`.
    ///
    /// A page reporting a different total resets the cache and re-requests
    /// the recorded viewport. A page shorter than its batch counts as a
    /// failure: nothing is merged and the batch is left to be requested
    /// again.
    pub(crate) fn complete_batch(
        self: &Arc<Self>,
        batch: usize,
        generation: u64,
        offset: usize,
        result: Result<RowPage, Error>,
    ) {
        let mut state = self.lock();
        if !state.is_current(generation) {
            log::debug!(
                "Discarding stale batch {} of table {} (generation {}, now {})",
                batch,
                self.table,
                generation,
                state.generation
            );
            return;
        }

        let expected = state.cache.layout().batch_len(batch, state.cache.total());
        match result {
            Ok(page) if page.total() != state.cache.total() => {
                log::warn!(
                    "Total row count of table {} changed from {} to {}; resetting cache",
                    self.table,
                    state.cache.total(),
                    page.total()
                );
                let (columns, _, total) = page.into_parts();
                let columns = if columns.is_empty() {
                    state.cache.columns().to_vec()
                } else {
                    columns
                };
                state.reinitialize(columns, total, &self.shutdown);
                self.refetch_viewport(&mut state);
            }
            Ok(page) if page.len() < expected => {
                state.cache.release_loading(batch);
                let message = format!(
                    "Failed to load batch {}: received {} of {} rows",
                    batch,
                    page.len(),
                    expected
                );
                log::warn!("Table {}: {}", self.table, message);
                state.set_error(message);
            }
            Ok(page) => {
                let (_, rows, _) = page.into_parts();
                let merged = state.cache.append_batch(batch, rows, offset);
                log::debug!(
                    "Merged {} rows at offset {} into batch {} of table {}",
                    merged,
                    offset,
                    batch,
                    self.table
                );
            }
            Err(err) => {
                state.cache.release_loading(batch);
                let message = format!("Failed to load batch {}: {}", batch, err);
                log::warn!("Table {}: {}", self.table, message);
                state.set_error(message);
            }
        }

        self.publish(&state);
    }

    /// Requests the recorded viewport, widened by the overscan margin and
    /// clamped to the current total.
    fn refetch_viewport(self: &Arc<Self>, state: &mut SessionState) {
        let Some(visible) = state.viewport else {
            return;
        };
        let Some(buffered) = visible.buffer(self.config.overscan, state.cache.total()) else {
            return;
        };
        let plan = fetch::claim_batches(self, state, buffered.start, buffered.end);
        if !plan.is_empty() {
            log::debug!(
                "Re-requesting batches {:?} of table {} after reset",
                plan.batches,
                self.table
            );
            fetch::spawn_batches(self, state, &plan);
        }
    }

    /// Marks the session closed and cancels all outstanding work.
    pub(crate) fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.abort_stream();
        state.cache.initialize(Vec::new(), 0);
        self.shutdown.cancel();
        self.limiter.close();
        log::debug!("Closed session for table {}", self.table);
        self.publish(&state);
    }
}

impl SessionState {
    /// Returns `true` if work issued under `generation` may still write.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        !self.closed && self.generation == generation
    }

    /// Starts a new generation: cancels outstanding fetches and drops every
    /// cached row and batch mark.
    fn next_generation(&mut self, shutdown: &CancellationToken) {
        self.cancel.cancel();
        self.cancel = shutdown.child_token();
        self.generation += 1;
        self.error = None;
    }

    /// Full reset to a new schema and total.
    pub(crate) fn reinitialize(
        &mut self,
        columns: Vec<Column>,
        total: usize,
        shutdown: &CancellationToken,
    ) {
        self.next_generation(shutdown);
        self.selection.retain_columns(&columns);
        self.cache.initialize(columns, total);
    }

    /// Drops all rows but keeps the schema and total.
    pub(crate) fn reset_rows(&mut self, shutdown: &CancellationToken) {
        self.next_generation(shutdown);
        self.cache.clear_rows();
    }

    /// Cancels the running bulk stream, if any.
    pub(crate) fn abort_stream(&mut self) -> bool {
        self.bulk_loading = false;
        match self.stream_cancel.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_error(&mut self, message: String) {
        self.error = Some(message);
        self.cache.bump();
    }
}
