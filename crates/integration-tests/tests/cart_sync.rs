//! Debounced quantity synchronization end to end: a burst of local edits
//! must reach the backend as exactly one absolute-set call carrying the
//! final value, and cancelled syncs must never hit the wire.
//!
//! Quiet periods are shortened to keep wall-clock time down; `settle`
//! sleeps long past them so timer tasks and loopback HTTP can finish.

use std::time::Duration;

use ruou_lang_cart::{CartApi, CartConfig, CartEvent, CartStore, Session};
use ruou_lang_core::ProductId;
use ruou_lang_integration_tests::{StoredItem, StubBackend};
use tokio::sync::broadcast;
use tokio::time::sleep;

const QUIET: Duration = Duration::from_millis(50);

async fn settle() {
    sleep(Duration::from_millis(400)).await;
}

fn drain(rx: &mut broadcast::Receiver<CartEvent>) -> Vec<CartEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn loaded_store(backend: &StubBackend) -> CartStore {
    let config = CartConfig::new(&backend.base_url())
        .unwrap()
        .with_sync_debounce(QUIET)
        .with_input_debounce(QUIET);
    let session = Session::new();
    session.set_token(backend.valid_token());
    let api = CartApi::new(&config, session).unwrap();
    let store = CartStore::new(api, &config);
    store.load_from_api().await.unwrap();
    store
}

fn seeded_item(id: &str, quantity: u32) -> StoredItem {
    StoredItem {
        product_id: id.to_string(),
        product_name: format!("Rượu {id}"),
        price: 120_000,
        quantity,
        stock: None,
    }
}

#[tokio::test]
async fn test_edit_burst_collapses_to_one_put_with_final_value() {
    let backend = StubBackend::start().await;
    backend.seed_item(seeded_item("P1", 1));
    let store = loaded_store(&backend).await;
    let mut events = store.subscribe();
    let pid = ProductId::new("P1");

    for quantity in [2, 3, 4, 5] {
        store.update_local_quantity(&pid, quantity).unwrap();
    }
    assert_eq!(store.line(&pid).unwrap().quantity, 5, "optimistic update");
    assert!(store.is_sync_pending(&pid));

    settle().await;

    assert_eq!(
        backend.put_quantities("P1"),
        vec![5],
        "one call, final value only"
    );
    let line = store.line(&pid).unwrap();
    assert_eq!(line.last_synced_quantity, 5);
    assert!(!line.has_unsynced_change());
    assert!(store.last_sync_time(&pid).is_some());
    assert!(drain(&mut events).contains(&CartEvent::QuantitySynced {
        product_id: pid.clone(),
        quantity: 5
    }));
}

#[tokio::test]
async fn test_returning_to_synced_value_sends_nothing() {
    let backend = StubBackend::start().await;
    backend.seed_item(seeded_item("P1", 3));
    let store = loaded_store(&backend).await;
    let pid = ProductId::new("P1");

    store.update_local_quantity(&pid, 5).unwrap();
    store.update_local_quantity(&pid, 3).unwrap();
    assert!(!store.is_sync_pending(&pid), "edit back to baseline cancels");

    settle().await;
    assert!(backend.put_quantities("P1").is_empty());
}

#[tokio::test]
async fn test_independent_products_sync_independently() {
    let backend = StubBackend::start().await;
    backend.seed_item(seeded_item("P1", 1));
    backend.seed_item(seeded_item("P2", 1));
    let store = loaded_store(&backend).await;

    store
        .update_local_quantity(&ProductId::new("P1"), 4)
        .unwrap();
    store
        .update_local_quantity(&ProductId::new("P2"), 9)
        .unwrap();

    settle().await;

    assert_eq!(backend.put_quantities("P1"), vec![4]);
    assert_eq!(backend.put_quantities("P2"), vec![9]);
}

#[tokio::test]
async fn test_remove_cancels_pending_sync_for_that_line() {
    let backend = StubBackend::start().await;
    backend.seed_item(seeded_item("P1", 2));
    backend.seed_item(seeded_item("P2", 2));
    let store = loaded_store(&backend).await;
    let pid = ProductId::new("P1");

    store.update_local_quantity(&pid, 9).unwrap();
    store.remove_item(&pid).unwrap();

    settle().await;

    assert!(
        backend.put_quantities("P1").is_empty(),
        "no stale set after the delete"
    );
    assert_eq!(backend.item_count(), 1, "delete reached the backend");
    assert!(store.line(&pid).is_none());
}

#[tokio::test]
async fn test_clear_cancels_all_timers_and_empties_backend() {
    let backend = StubBackend::start().await;
    backend.seed_item(seeded_item("P1", 2));
    backend.seed_item(seeded_item("P2", 2));
    let store = loaded_store(&backend).await;

    store
        .update_local_quantity(&ProductId::new("P1"), 8)
        .unwrap();
    store
        .update_local_quantity(&ProductId::new("P2"), 8)
        .unwrap();
    store.clear();

    settle().await;

    assert!(backend.put_quantities("P1").is_empty());
    assert!(backend.put_quantities("P2").is_empty());
    assert_eq!(backend.item_count(), 0);
    assert!(store.lines().is_empty());
}

#[tokio::test]
async fn test_out_of_stock_line_never_syncs_an_increase() {
    let backend = StubBackend::start().await;
    backend.seed_item(StoredItem {
        product_id: "P1".to_string(),
        product_name: "Rượu P1".to_string(),
        price: 120_000,
        quantity: 1,
        stock: Some(0),
    });
    let store = loaded_store(&backend).await;
    let pid = ProductId::new("P1");

    assert!(store.update_local_quantity(&pid, 5).is_err());
    assert_eq!(store.line(&pid).unwrap().quantity, 1, "increase refused");

    settle().await;
    assert!(
        backend.put_quantities("P1").is_empty(),
        "a refused increase never reaches the wire"
    );
}

#[tokio::test]
async fn test_typed_input_commits_final_value_only() {
    let backend = StubBackend::start().await;
    backend.seed_item(seeded_item("P1", 1));
    let store = loaded_store(&backend).await;
    let pid = ProductId::new("P1");

    // Keystrokes: "2", then "25", corrected to "7"
    store.queue_quantity_input(&pid, "2").unwrap();
    store.queue_quantity_input(&pid, "25").unwrap();
    store.queue_quantity_input(&pid, "7").unwrap();

    settle().await;

    assert_eq!(store.line(&pid).unwrap().quantity, 7);
    assert_eq!(
        backend.put_quantities("P1"),
        vec![7],
        "intermediate keystrokes never hit the wire"
    );
}
