//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use rowcache_lib::{Column, Row, RowPage, RowSource, SourceError, TableId};

pub fn columns() -> Vec<Column> {
    vec![Column::new("id", "BIGINT"), Column::new("name", "VARCHAR")]
}

pub fn row(index: usize) -> Row {
    Row::new()
        .set("id", index as i64)
        .set("name", format!("row {}", index))
}

pub fn rows(range: std::ops::Range<usize>) -> Vec<Row> {
    range.map(row).collect()
}

/// A row source with a mutable total, injectable failures and an optional
/// gate that holds every request until a permit is released.
pub struct ScriptedSource {
    total: AtomicUsize,
    calls: Mutex<Vec<(usize, usize)>>,
    failures: Mutex<HashMap<usize, usize>>,
    short: Mutex<HashMap<usize, (usize, usize)>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedSource {
    pub fn new(total: usize) -> Self {
        Self {
            total: AtomicUsize::new(total),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            short: Mutex::new(HashMap::new()),
            gate: None,
        }
    }

    /// Every request waits for a permit of the returned semaphore.
    pub fn gated(total: usize) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let source = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::new(total)
        };
        (source, gate)
    }

    /// The next `times` requests at `offset` fail with HTTP 500.
    pub fn fail_at(self, offset: usize, times: usize) -> Self {
        self.failures.lock().unwrap().insert(offset, times);
        self
    }

    /// The next `times` responses at `offset` carry only `rows` rows.
    pub fn truncate_at(self, offset: usize, rows: usize, times: usize) -> Self {
        self.short.lock().unwrap().insert(offset, (rows, times));
        self
    }

    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
    }

    /// `(offset, limit)` of every request, in arrival order.
    pub fn calls(&self) -> Vec<(usize, usize)> {
        self.calls.lock().unwrap().clone()
    }

    /// Requested offsets, sorted.
    pub fn offsets(&self) -> Vec<usize> {
        let mut offsets: Vec<usize> = self.calls().into_iter().map(|(offset, _)| offset).collect();
        offsets.sort_unstable();
        offsets
    }
}

#[async_trait]
impl RowSource for ScriptedSource {
    async fn fetch_rows(
        &self,
        _table: &TableId,
        limit: usize,
        offset: usize,
    ) -> Result<RowPage, SourceError> {
        self.calls.lock().unwrap().push((offset, limit));

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&offset) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(SourceError::http(500, "scripted failure"));
                }
            }
        }

        let mut limit = limit;
        if let Some((rows, remaining)) = self.short.lock().unwrap().get_mut(&offset) {
            if *remaining > 0 {
                *remaining -= 1;
                limit = limit.min(*rows);
            }
        }

        let total = self.total.load(Ordering::SeqCst);
        let end = offset.saturating_add(limit).min(total);
        let rows = if offset < end { rows(offset..end) } else { Vec::new() };
        Ok(RowPage::new(columns(), rows, total))
    }
}

/// Yields until `source` has received `count` requests.
pub async fn wait_for_calls(source: &ScriptedSource, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while source.calls().len() < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("requests not issued in time");
}
