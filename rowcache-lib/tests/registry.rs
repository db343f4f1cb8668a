//! One session per table through `SessionRegistry`.

mod common;

use std::sync::Arc;

use common::ScriptedSource;
use rowcache_lib::{Error, RetryConfig, SessionConfig, SessionRegistry, TableId};

fn registry(source: ScriptedSource) -> SessionRegistry {
    SessionRegistry::new(Arc::new(source), SessionConfig::default().with_retry(RetryConfig::no_retry()))
}

#[tokio::test]
async fn test_open_reuses_session() {
    let registry = registry(ScriptedSource::new(500));

    let first = registry.open("orders").await.unwrap();
    let second = registry.open("orders").await.unwrap();
    let other = registry.open("customers").await.unwrap();

    assert!(first.same_session(&second));
    assert!(!first.same_session(&other));
    assert_eq!(registry.len(), 2);
    assert_eq!(
        registry.tables(),
        vec![TableId::new("customers"), TableId::new("orders")]
    );
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let registry = registry(ScriptedSource::new(500));
    let orders = registry.open("orders").await.unwrap();
    let customers = registry.open("customers").await.unwrap();

    orders.set_visible_range(300, 320);
    orders.wait_idle().await;
    customers.reset();

    assert!(orders.get_row(310).is_some());
    assert!(customers.get_row(0).is_none());
    assert!(orders.get_row(0).is_some());
}

#[tokio::test]
async fn test_close_and_replace() {
    let registry = registry(ScriptedSource::new(500));
    let table = TableId::new("orders");

    let first = registry.open(table.clone()).await.unwrap();
    let second = registry.replace(table.clone()).await.unwrap();

    assert!(first.is_closed());
    assert!(!second.is_closed());
    assert!(registry.contains(&table));

    assert!(registry.close(&table));
    assert!(!registry.close(&table));
    assert!(second.is_closed());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_close_all() {
    let registry = registry(ScriptedSource::new(500));
    let orders = registry.open("orders").await.unwrap();
    let customers = registry.open("customers").await.unwrap();

    registry.close_all();

    assert!(registry.is_empty());
    assert!(orders.is_closed());
    assert!(customers.is_closed());
}

#[tokio::test]
async fn test_failed_open_not_registered() {
    let registry = registry(ScriptedSource::new(500).fail_at(0, 1));

    let err = registry.open("orders").await.unwrap_err();
    assert!(matches!(err, Error::Bootstrap { .. }));
    assert!(registry.is_empty());

    // The scripted failure is spent; the next open succeeds.
    assert!(registry.open("orders").await.is_ok());
}

#[tokio::test]
async fn test_reopen_after_handle_close() {
    let registry = registry(ScriptedSource::new(500));
    let table = TableId::new("orders");

    let first = registry.open(table.clone()).await.unwrap();
    first.close();

    assert!(registry.get(&table).is_none());
    assert!(registry.is_empty());

    let second = registry.open(table.clone()).await.unwrap();
    assert!(!second.is_closed());
    assert!(!second.same_session(&first));
    assert_eq!(second.total(), 500);
    assert_eq!(second.set_visible_range(200, 220).batches, vec![1, 2]);
}
