//! Batch fetching
//!
//! [`BatchFetcher`] turns a requested row range into batch requests. Each
//! batch is claimed in the session cache before its request starts, so a
//! batch is never requested twice while in flight or after it loaded.
//!
//! Requests run on the session's runtime. Each attempt is bounded by the
//! configured timeout, failed attempts are retried per [`RetryConfig`], and
//! at most [`SessionConfig::max_concurrent_fetches`] requests run at once.
//! Resetting the session cancels outstanding requests; a completion that
//! arrives anyway is discarded.
//!
//! [`SessionConfig::max_concurrent_fetches`]: crate::config::SessionConfig::max_concurrent_fetches

mod concurrency;
mod retry;

pub use concurrency::ConcurrencyLimiter;
pub use retry::RetryConfig;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::error::SourceError;
use crate::session::SessionState;
use crate::session::Shared;
use crate::source::RowPage;

/// Batches issued by one [`BatchFetcher::request_range`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPlan {
    /// Batches covering the requested range that were not yet loaded or in
    /// flight, in ascending order.
    pub batches: Vec<usize>,
    /// The batch after the range, if it was prefetched.
    pub prefetch: Option<usize>,
}

impl FetchPlan {
    /// Returns `true` if no request was issued.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty() && self.prefetch.is_none()
    }

    /// Number of requests issued, prefetch included.
    pub fn len(&self) -> usize {
        self.batches.len() + usize::from(self.prefetch.is_some())
    }

    /// All issued batches, prefetch last.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.batches.iter().copied().chain(self.prefetch)
    }
}

/// Issues batch requests for a session.
#[derive(Clone)]
pub struct BatchFetcher {
    shared: Arc<Shared>,
}

impl BatchFetcher {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Requests every batch overlapping rows `start..=end`.
    ///
    /// Rows past the end of the table are ignored. Batches already loaded or
    /// in flight are skipped. When prefetching is enabled the batch after
    /// the range is requested too. Returns what was issued; the rows arrive
    /// later and are announced through the session version.
    pub fn request_range(&self, start: usize, end: usize) -> FetchPlan {
        let mut state = self.shared.lock();
        if state.closed {
            return FetchPlan::default();
        }

        let plan = claim_batches(&self.shared, &mut state, start, end);
        if plan.is_empty() {
            return plan;
        }

        log::debug!(
            "Requesting batches {:?} (prefetch {:?}) of table {} for rows {}..={}",
            plan.batches,
            plan.prefetch,
            self.shared.table,
            start,
            end
        );
        spawn_batches(&self.shared, &state, &plan);
        self.shared.publish(&state);
        plan
    }
}

/// Marks in flight every batch overlapping `start..=end` that is neither
/// loaded nor loading, plus the prefetch batch.
pub(crate) fn claim_batches(shared: &Shared, state: &mut SessionState, start: usize, end: usize) -> FetchPlan {
    let mut plan = FetchPlan::default();
    let total = state.cache.total();
    let Some(batches) = state.cache.layout().batches_covering(start, end, total) else {
        return plan;
    };
    let next = *batches.end() + 1;

    for batch in batches {
        if state.cache.mark_loading(batch) {
            plan.batches.push(batch);
        }
    }
    if shared.config.prefetch && state.cache.mark_loading(next) {
        plan.prefetch = Some(next);
    }

    if !plan.is_empty() {
        state.cache.bump();
    }
    plan
}

/// Spawns one fetch task per batch of `plan` under the current generation.
pub(crate) fn spawn_batches(shared: &Arc<Shared>, state: &SessionState, plan: &FetchPlan) {
    let total = state.cache.total();
    for batch in plan.iter() {
        shared.runtime.spawn(run_batch(
            Arc::clone(shared),
            batch,
            state.generation,
            total,
            state.cancel.clone(),
        ));
    }
}

async fn run_batch(
    shared: Arc<Shared>,
    batch: usize,
    generation: u64,
    total: usize,
    cancel: CancellationToken,
) {
    let layout = shared.config.layout();
    let offset = layout.batch_start(batch);
    let limit = layout.batch_len(batch, total);

    let result = tokio::select! {
        _ = cancel.cancelled() => {
            log::debug!("Batch {} of table {} cancelled", batch, shared.table);
            return;
        }
        result = fetch_page(&shared, limit, offset) => result,
    };

    shared.complete_batch(batch, generation, offset, result);
}

/// Fetches `limit` rows at `offset` under the session's concurrency, timeout
/// and retry settings.
pub(crate) async fn fetch_page(shared: &Shared, limit: usize, offset: usize) -> Result<RowPage, Error> {
    let _permit = shared.limiter.acquire().await?;
    let retry = &shared.config.retry;
    let timeout = shared.config.fetch_timeout;
    let mut attempts = 0;
    let mut delay = retry.initial_delay;

    loop {
        let result =
            match tokio::time::timeout(timeout, shared.source.fetch_rows(&shared.table, limit, offset)).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout(timeout)),
            };

        match result {
            Ok(page) => return Ok(page),
            Err(err) if retry.should_retry(&err, attempts) => {
                log::debug!(
                    "Retrying rows {}..{} of table {} in {:?}: {}",
                    offset,
                    offset + limit,
                    shared.table,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
                delay = retry.next_delay(delay);
                attempts += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}
