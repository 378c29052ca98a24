//! Token refresh behavior of the cart API client against a live stub
//! backend: 401 recovery, single-flight coalescing, and the give-up path
//! when the refresh itself is rejected.

use ruou_lang_cart::api::ApiError;
use ruou_lang_cart::{CartApi, CartConfig, Session};
use ruou_lang_integration_tests::{StoredItem, StubBackend};

fn seeded_item(id: &str) -> StoredItem {
    StoredItem {
        product_id: id.to_string(),
        product_name: format!("Rượu {id}"),
        price: 120_000,
        quantity: 2,
        stock: Some(10),
    }
}

fn client(backend: &StubBackend, token: &str) -> CartApi {
    let config = CartConfig::new(&backend.base_url()).unwrap();
    let session = Session::new();
    session.set_token(token);
    CartApi::new(&config, session).unwrap()
}

#[tokio::test]
async fn test_valid_token_never_refreshes() {
    let backend = StubBackend::start().await;
    backend.seed_item(seeded_item("P1"));
    let api = client(&backend, &backend.valid_token());

    let response = api.get_cart_items().await.unwrap();
    assert_eq!(response.items.len(), 1);
    assert_eq!(backend.refresh_calls(), 0);
}

#[tokio::test]
async fn test_expired_token_refreshes_and_retries_once() {
    let backend = StubBackend::start().await;
    backend.seed_item(seeded_item("P1"));

    // The client holds a token the backend no longer accepts
    let api = client(&backend, "stale-token");

    let response = api.get_cart_items().await.unwrap();
    assert_eq!(response.items.len(), 1, "retry after refresh succeeded");
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(
        api.session().token().as_deref(),
        Some(backend.valid_token().as_str()),
        "rotated token installed into the session"
    );
}

#[tokio::test]
async fn test_concurrent_401s_coalesce_into_one_refresh() {
    let backend = StubBackend::start().await;
    backend.seed_item(seeded_item("P1"));
    let api = client(&backend, "stale-token");

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let api = api.clone();
        tasks.push(tokio::spawn(async move { api.get_cart_items().await }));
    }
    for task in tasks {
        let result = task.await.unwrap();
        assert!(result.is_ok(), "every caller recovers: {result:?}");
    }

    assert_eq!(
        backend.refresh_calls(),
        1,
        "exactly one network refresh for the whole burst"
    );
}

#[tokio::test]
async fn test_refresh_rejection_surfaces_auth_expired() {
    let backend = StubBackend::start().await;
    backend.seed_item(seeded_item("P1"));
    backend.set_refresh_fails(true);
    let api = client(&backend, "stale-token");

    let err = api.get_cart_items().await.unwrap_err();
    assert!(matches!(err, ApiError::AuthExpired), "got: {err}");
    assert_eq!(
        err.to_string(),
        "Authentication failed - please login again"
    );
}

#[tokio::test]
async fn test_refresh_recovers_mid_session_expiry() {
    let backend = StubBackend::start().await;
    backend.seed_item(seeded_item("P1"));
    let api = client(&backend, &backend.valid_token());

    api.get_cart_items().await.unwrap();
    assert_eq!(backend.refresh_calls(), 0);

    // The server rotates its accepted token behind the client's back
    backend.expire_token();

    let response = api.get_cart_items().await.unwrap();
    assert_eq!(response.items.len(), 1);
    assert_eq!(backend.refresh_calls(), 1);
}
