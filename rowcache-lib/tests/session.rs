//! Viewport-driven loading through a `TableSession`.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{columns, wait_for_calls, ScriptedSource};
use rowcache_lib::{BatchState, Error, RetryConfig, SessionConfig, TableSession};

fn exact_config() -> SessionConfig {
    SessionConfig::default()
        .with_overscan(0)
        .with_prefetch(false)
        .with_retry(RetryConfig::no_retry())
}

fn session(source: &Arc<ScriptedSource>, total: usize, config: SessionConfig) -> TableSession {
    TableSession::with_schema("users", source.clone(), columns(), total, config).unwrap()
}

// =============================================================================
// Bootstrap
// =============================================================================

#[tokio::test]
async fn test_open_loads_first_batch() {
    let source = Arc::new(ScriptedSource::new(250));
    let session = TableSession::open("users", source.clone(), SessionConfig::default())
        .await
        .unwrap();

    assert_eq!(session.total(), 250);
    assert_eq!(session.columns(), columns());
    assert!(session.is_batch_loaded(0));
    assert!(session.get_row(99).is_some());
    assert!(session.get_row(100).is_none());
    assert_eq!(source.calls(), vec![(0, 100)]);
}

#[tokio::test]
async fn test_open_empty_table() {
    let source = Arc::new(ScriptedSource::new(0));
    let session = TableSession::open("users", source, SessionConfig::default())
        .await
        .unwrap();

    assert_eq!(session.total(), 0);
    assert!(session.load_state().is_fully_loaded());
    assert!(session.set_visible_range(0, 40).is_empty());
}

#[tokio::test]
async fn test_open_failure_is_bootstrap_error() {
    let source = Arc::new(ScriptedSource::new(250).fail_at(0, 1));
    let config = SessionConfig::default().with_retry(RetryConfig::no_retry());

    let err = TableSession::open("users", source, config).await.unwrap_err();
    assert!(matches!(err, Error::Bootstrap { ref table, .. } if table.as_str() == "users"));
    assert!(err.is_fatal());
}

#[test]
fn test_session_requires_runtime() {
    let source = Arc::new(ScriptedSource::new(10));
    let err = TableSession::with_schema("users", source, columns(), 10, SessionConfig::default()).unwrap_err();
    assert!(matches!(err, Error::NoRuntime));
}

// =============================================================================
// Viewport loading
// =============================================================================

#[tokio::test]
async fn test_visible_range_near_end_of_table() {
    let (source, gate) = ScriptedSource::gated(250);
    let source = Arc::new(source);
    let session = session(&source, 250, SessionConfig::default());

    // 180..=220 widened by 20 is 160..=240: batches 1 and 2, nothing past the end.
    let plan = session.set_visible_range(180, 220);
    assert_eq!(plan.batches, vec![1, 2]);
    assert_eq!(plan.prefetch, None);
    assert_eq!(session.batch_state(1), BatchState::InFlight);
    assert_eq!(session.batch_state(3), BatchState::Unrequested);

    gate.add_permits(2);
    session.wait_idle().await;

    let mut calls = source.calls();
    calls.sort_unstable();
    assert_eq!(calls, vec![(100, 100), (200, 50)]);
    assert!(session.get_row(180).is_some());
    assert!(session.get_row(249).is_some());
    assert!(session.get_row(99).is_none());
    assert_eq!(session.load_state().loaded_rows, 150);
}

#[tokio::test]
async fn test_overlapping_ranges_fetch_once() {
    let (source, gate) = ScriptedSource::gated(1000);
    let source = Arc::new(source);
    let session = session(&source, 1000, SessionConfig::default());

    let first = session.set_visible_range(0, 50);
    let second = session.set_visible_range(10, 60);

    assert_eq!(first.batches, vec![0]);
    assert_eq!(first.prefetch, Some(1));
    assert!(second.is_empty());

    gate.add_permits(10);
    session.wait_idle().await;

    assert_eq!(source.offsets(), vec![0, 100]);
}

#[tokio::test]
async fn test_buffered_range_fully_covered() {
    let source = Arc::new(ScriptedSource::new(1000));
    let session = session(&source, 1000, SessionConfig::default());

    session.set_visible_range(430, 470);
    session.wait_idle().await;

    for index in 410..=490 {
        assert!(session.get_row(index).is_some(), "row {}", index);
    }
}

#[tokio::test]
async fn test_range_past_end_is_clamped() {
    let (source, gate) = ScriptedSource::gated(250);
    let source = Arc::new(source);
    let session = session(&source, 250, SessionConfig::default());

    let plan = session.set_visible_range(240, 5_000);
    assert_eq!(plan.batches, vec![2]);
    assert_eq!(plan.prefetch, None);
    assert!(session.set_visible_range(900, 5_000).is_empty());

    gate.add_permits(1);
    session.wait_idle().await;
    assert_eq!(source.calls(), vec![(200, 50)]);
}

#[tokio::test]
async fn test_loaded_batches_not_requested_again() {
    let source = Arc::new(ScriptedSource::new(1000));
    let session = session(&source, 1000, SessionConfig::default());

    session.set_visible_range(150, 180);
    session.wait_idle().await;
    let calls = source.calls().len();

    assert!(session.set_visible_range(150, 180).is_empty());
    assert!(session.set_visible_range(160, 170).is_empty());
    session.wait_idle().await;
    assert_eq!(source.calls().len(), calls);
}

#[tokio::test]
async fn test_rows_present_only_in_loaded_batches() {
    let source = Arc::new(ScriptedSource::new(1000));
    let session = session(&source, 1000, exact_config());

    session.set_visible_range(120, 130);
    session.set_visible_range(610, 700);
    session.wait_idle().await;

    for index in 0..1000 {
        let batch = index / 100;
        assert_eq!(
            session.get_row(index).is_some(),
            session.is_batch_loaded(batch),
            "row {}",
            index
        );
    }
    assert!(session.get_row(1000).is_none());
    assert_eq!(session.load_state().loaded_rows, 300);
}

#[tokio::test]
async fn test_rows_returns_gaps() {
    let source = Arc::new(ScriptedSource::new(1000));
    let session = session(&source, 1000, exact_config());

    session.set_visible_range(100, 110);
    session.wait_idle().await;

    let window = session.rows(95..105);
    assert_eq!(window.len(), 10);
    assert!(window[..5].iter().all(Option::is_none));
    assert!(window[5..].iter().all(Option::is_some));
    assert_eq!(window[5].as_ref().unwrap().get_i64("id").unwrap(), Some(100));
}

#[tokio::test]
async fn test_version_advances_and_notifies() {
    let source = Arc::new(ScriptedSource::new(1000));
    let session = session(&source, 1000, exact_config());
    let mut changes = session.subscribe();
    let before = *changes.borrow_and_update();

    session.set_visible_range(0, 10);
    session.wait_idle().await;

    assert!(changes.has_changed().unwrap());
    assert!(*changes.borrow_and_update() > before);
    assert_eq!(session.version(), session.load_state().version);
}

#[tokio::test]
async fn test_refresh_reissues_last_range() {
    let source = Arc::new(ScriptedSource::new(1000));
    let session = session(&source, 1000, exact_config());

    assert!(session.refresh().is_empty());

    session.set_visible_range(300, 310);
    session.wait_idle().await;
    session.reset();

    let plan = session.refresh();
    assert_eq!(plan.batches, vec![3]);
    session.wait_idle().await;
    assert!(session.get_row(305).is_some());
    assert_eq!(session.visible_range().map(|v| (v.start, v.end)), Some((300, 310)));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_failed_batch_is_retried_on_next_request() {
    let source = Arc::new(ScriptedSource::new(1000).fail_at(100, 1));
    let session = session(&source, 1000, exact_config());

    assert_eq!(session.set_visible_range(100, 150).batches, vec![1]);
    session.wait_idle().await;

    let state = session.load_state();
    assert!(state.error.is_some());
    assert!(state.in_flight.is_empty());
    assert!(!session.is_batch_loaded(1));
    assert!(!session.is_batch_loading(1));
    assert!(session.get_row(120).is_none());

    assert_eq!(session.set_visible_range(100, 150).batches, vec![1]);
    session.wait_idle().await;
    assert!(session.is_batch_loaded(1));
    assert_eq!(source.offsets(), vec![100, 100]);

    session.clear_error();
    assert!(session.error().is_none());
}

#[tokio::test]
async fn test_transient_failure_retried_in_background() {
    let source = Arc::new(ScriptedSource::new(1000).fail_at(0, 1));
    let config = exact_config().with_retry(RetryConfig::default().initial_delay(Duration::from_millis(1)));
    let session = session(&source, 1000, config);

    session.set_visible_range(0, 10);
    session.wait_idle().await;

    assert!(session.is_batch_loaded(0));
    assert!(session.error().is_none());
    assert_eq!(source.offsets(), vec![0, 0]);
}

#[tokio::test]
async fn test_timeout_releases_batch() {
    let (source, _gate) = ScriptedSource::gated(1000);
    let source = Arc::new(source);
    let config = exact_config().with_fetch_timeout(Duration::from_millis(50));
    let session = session(&source, 1000, config);

    session.set_visible_range(0, 10);
    session.wait_idle().await;

    assert!(!session.is_batch_loading(0));
    assert!(!session.is_batch_loaded(0));
    assert!(session.error().unwrap().contains("Timeout"));
}

// =============================================================================
// Reset and cancellation
// =============================================================================

#[tokio::test]
async fn test_reset_discards_in_flight_batches() {
    let (source, gate) = ScriptedSource::gated(1000);
    let source = Arc::new(source);
    let session = session(&source, 1000, exact_config());

    session.set_visible_range(0, 10);
    wait_for_calls(&source, 1).await;

    let version = session.version();
    session.reset();
    assert!(session.version() > version);
    assert_eq!(session.batch_state(0), BatchState::Unrequested);

    // Same batch again under the new generation.
    assert_eq!(session.set_visible_range(0, 10).batches, vec![0]);
    wait_for_calls(&source, 2).await;
    gate.add_permits(2);
    session.wait_idle().await;

    assert!(session.is_batch_loaded(0));
    assert_eq!(session.load_state().loaded_rows, 100);
    assert_eq!(source.offsets(), vec![0, 0]);
}

#[tokio::test]
async fn test_total_change_resets_cache() {
    let source = Arc::new(ScriptedSource::new(1000));
    let session = session(&source, 1000, exact_config());

    session.set_visible_range(0, 10);
    session.wait_idle().await;
    assert!(session.get_row(0).is_some());

    source.set_total(500);
    session.set_visible_range(300, 310);
    session.wait_idle().await;

    // The visible batch is fetched again under the new total.
    assert_eq!(session.total(), 500);
    assert!(session.get_row(0).is_none());
    assert!(session.get_row(300).is_some());
    assert_eq!(session.batch_state(3), BatchState::Loaded);
    assert_eq!(session.load_state().loaded_rows, 100);
    assert_eq!(source.offsets(), vec![0, 300, 300]);
}

#[tokio::test]
async fn test_total_change_skips_viewport_past_new_end() {
    let source = Arc::new(ScriptedSource::new(1000));
    let session = session(&source, 1000, exact_config());

    source.set_total(200);
    session.set_visible_range(500, 510);
    session.wait_idle().await;

    assert_eq!(session.total(), 200);
    assert_eq!(session.load_state().loaded_rows, 0);
    assert_eq!(source.offsets(), vec![500]);
}

#[tokio::test]
async fn test_short_page_leaves_batch_pending() {
    let source = Arc::new(ScriptedSource::new(1000).truncate_at(0, 40, 1));
    let session = session(&source, 1000, exact_config());

    session.set_visible_range(0, 99);
    session.wait_idle().await;

    assert_eq!(session.batch_state(0), BatchState::Unrequested);
    assert!(session.get_row(0).is_none());
    assert!(session.error().unwrap().contains("received 40 of 100 rows"));

    assert_eq!(session.set_visible_range(0, 99).batches, vec![0]);
    session.wait_idle().await;

    assert_eq!(session.batch_state(0), BatchState::Loaded);
    assert!(session.get_row(50).is_some());
    assert!(session.get_row(99).is_some());
}

#[tokio::test]
async fn test_open_with_short_first_batch() {
    let source = Arc::new(ScriptedSource::new(250).truncate_at(0, 10, 1));
    let session = TableSession::open("users", source.clone(), SessionConfig::default())
        .await
        .unwrap();

    assert_eq!(session.total(), 250);
    assert!(!session.is_batch_loaded(0));
    assert!(session.get_row(0).is_none());
}

#[tokio::test]
async fn test_reinitialize_adopts_new_schema() {
    let source = Arc::new(ScriptedSource::new(1000));
    let session = session(&source, 1000, exact_config());

    session.set_visible_range(0, 10);
    session.wait_idle().await;
    session.reinitialize(vec![rowcache_lib::Column::untyped("id")], 40);

    assert_eq!(session.total(), 40);
    assert_eq!(session.columns().len(), 1);
    assert!(session.get_row(0).is_none());
    assert!(session.set_visible_range(50, 60).is_empty());
}

#[tokio::test]
async fn test_close_ignores_further_work() {
    let (source, gate) = ScriptedSource::gated(1000);
    let source = Arc::new(source);
    let session = session(&source, 1000, exact_config());

    session.set_visible_range(0, 10);
    wait_for_calls(&source, 1).await;
    session.close();
    gate.add_permits(1);
    session.wait_idle().await;

    assert!(session.is_closed());
    assert!(session.get_row(0).is_none());
    assert!(session.set_visible_range(0, 10).is_empty());
    assert_eq!(source.calls().len(), 1);
}

// =============================================================================
// Column selection
// =============================================================================

#[tokio::test]
async fn test_column_selection() {
    let source = Arc::new(ScriptedSource::new(100));
    let session = session(&source, 100, exact_config());

    assert!(session.toggle_column("name"));
    assert!(!session.toggle_column("bogus"));
    assert_eq!(session.selected_columns(), vec!["name"]);

    session.select_all_columns();
    assert_eq!(session.selected_columns(), vec!["id", "name"]);

    session.reset();
    assert_eq!(session.selected_columns(), vec!["id", "name"]);

    session.reinitialize(vec![rowcache_lib::Column::untyped("id")], 100);
    assert_eq!(session.selected_columns(), vec!["id"]);

    session.set_selected_columns(["id", "name"]);
    assert!(session.is_column_selected("id"));
    assert!(!session.is_column_selected("name"));

    session.clear_column_selection();
    assert!(session.selected_columns().is_empty());
}
