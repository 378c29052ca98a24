//! Integration test support for the cart subsystem.
//!
//! [`StubBackend`] is an in-process axum server that speaks the cart REST
//! protocol: bearer-token auth on the `/customer/*` routes, a cookie-free
//! `/auth/refresh`, and the `success`/`items`/`item` JSON envelopes. Tests
//! drive the real `CartApi`/`CartStore` against it over loopback HTTP.
//!
//! The backend records what it was told (every PUT quantity per product,
//! every refresh call) and can be pushed into failure modes: an expired
//! access token, a refresh endpoint that rejects, a one-shot 500.
//!
//! ```bash
//! cargo test -p ruou-lang-integration-tests
//! ```

// Test support: panicking on broken fixtures is the desired behavior.
#![allow(clippy::unwrap_used, clippy::missing_panics_doc, clippy::missing_errors_doc)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::{Value, json};

/// One cart row as the backend stores it.
#[derive(Debug, Clone)]
pub struct StoredItem {
    pub product_id: String,
    pub product_name: String,
    pub price: i64,
    pub quantity: u32,
    pub stock: Option<u32>,
}

#[derive(Debug, Default)]
struct BackendState {
    items: Mutex<Vec<StoredItem>>,
    /// The one token the `/customer/*` routes currently accept.
    valid_token: Mutex<String>,
    refresh_calls: AtomicU32,
    /// Every quantity received via PUT, per product, in arrival order.
    put_quantities: Mutex<HashMap<String, Vec<u32>>>,
    /// Next `/customer/*` request answers 500, then the flag clears.
    fail_next: AtomicBool,
    /// `/auth/refresh` answers 401.
    refresh_fails: AtomicBool,
}

type SharedState = Arc<BackendState>;

/// In-process cart backend bound to an ephemeral loopback port.
pub struct StubBackend {
    state: SharedState,
    addr: SocketAddr,
    server: tokio::task::JoinHandle<()>,
}

/// Install a fmt subscriber once per test process; later calls are no-ops.
/// Controlled through `RUST_LOG` as usual.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl StubBackend {
    /// Bind and serve. Requires an ambient tokio runtime.
    pub async fn start() -> Self {
        init_tracing();
        let state: SharedState = Arc::new(BackendState {
            valid_token: Mutex::new(uuid::Uuid::new_v4().to_string()),
            ..BackendState::default()
        });

        let router = Router::new()
            .route("/customer/cartitems", get(get_items).delete(clear_items))
            .route(
                "/customer/cartitems/{product_id}",
                put(set_quantity).delete(delete_item),
            )
            .route("/customer/insertitems", post(insert_item))
            .route("/customer/incrementby1/{product_id}", post(increment))
            .route("/customer/decrementby1/{product_id}", post(decrement))
            .route("/auth/refresh", post(refresh))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { state, addr, server }
    }

    /// Origin URL for `CartConfig::new`.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The token the backend currently accepts. Install it into a `Session`
    /// to start authenticated.
    #[must_use]
    pub fn valid_token(&self) -> String {
        self.state.valid_token.lock().unwrap().clone()
    }

    /// Rotate the accepted token server-side without telling the client:
    /// its held token now draws 401s until it refreshes.
    pub fn expire_token(&self) {
        *self.state.valid_token.lock().unwrap() = uuid::Uuid::new_v4().to_string();
    }

    /// Make `/auth/refresh` reject (or accept again).
    pub fn set_refresh_fails(&self, fails: bool) {
        self.state.refresh_fails.store(fails, Ordering::SeqCst);
    }

    /// Answer the next `/customer/*` request with a 500.
    pub fn fail_next_request(&self) {
        self.state.fail_next.store(true, Ordering::SeqCst);
    }

    /// How many times `/auth/refresh` has been called.
    #[must_use]
    pub fn refresh_calls(&self) -> u32 {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    /// Quantities received via PUT for the product, in arrival order.
    #[must_use]
    pub fn put_quantities(&self, product_id: &str) -> Vec<u32> {
        self.state
            .put_quantities
            .lock()
            .unwrap()
            .get(product_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Pre-populate a cart row.
    pub fn seed_item(&self, item: StoredItem) {
        self.state.items.lock().unwrap().push(item);
    }

    /// Server-side view of a product's quantity.
    #[must_use]
    pub fn item_quantity(&self, product_id: &str) -> Option<u32> {
        self.state
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.product_id == product_id)
            .map(|i| i.quantity)
    }

    /// Mutate a row directly, as if another session changed it.
    pub fn set_item_quantity(&self, product_id: &str, quantity: u32) {
        let mut items = self.state.items.lock().unwrap();
        if let Some(item) = items.iter_mut().find(|i| i.product_id == product_id) {
            item.quantity = quantity;
        }
    }

    /// Number of rows in the backend cart.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.state.items.lock().unwrap().len()
    }
}

impl Drop for StubBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

// =============================================================================
// Handlers
// =============================================================================

type Reply = (StatusCode, Json<Value>);

fn item_json(item: &StoredItem) -> Value {
    json!({
        "itemId": format!("item-{}", item.product_id),
        "productId": item.product_id,
        "productName": item.product_name,
        "image": "/images/stub.png",
        "price": item.price,
        "quantity": item.quantity,
        "stock": item.stock,
    })
}

/// Bearer-token gate plus the one-shot 500, shared by every cart route.
fn guard(state: &BackendState, headers: &HeaderMap) -> Result<(), Reply> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let valid = state.valid_token.lock().unwrap();
    if presented != Some(valid.as_str()) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "message": "token expired"})),
        ));
    }
    drop(valid);

    if state.fail_next.swap(false, Ordering::SeqCst) {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"success": false, "message": "injected failure"})),
        ));
    }
    Ok(())
}

async fn get_items(State(state): State<SharedState>, headers: HeaderMap) -> Reply {
    if let Err(reply) = guard(&state, &headers) {
        return reply;
    }
    let items = state.items.lock().unwrap();
    let total: u32 = items.iter().map(|i| i.quantity).sum();
    let body = json!({
        "success": true,
        "items": items.iter().map(item_json).collect::<Vec<_>>(),
        "totalItems": total,
    });
    (StatusCode::OK, Json(body))
}

async fn insert_item(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    if let Err(reply) = guard(&state, &headers) {
        return reply;
    }
    let product_id = body["productId"].as_str().unwrap_or_default().to_string();
    let quantity = u32::try_from(body["quantity"].as_u64().unwrap_or(1)).unwrap_or(1);

    let mut items = state.items.lock().unwrap();
    let item = if let Some(item) = items.iter_mut().find(|i| i.product_id == product_id) {
        item.quantity += quantity;
        item.clone()
    } else {
        let item = StoredItem {
            product_id,
            product_name: body["productName"]
                .as_str()
                .unwrap_or("unnamed")
                .to_string(),
            price: body["price"].as_i64().unwrap_or(0),
            quantity,
            stock: None,
        };
        items.push(item.clone());
        item
    };

    (
        StatusCode::OK,
        Json(json!({"success": true, "item": item_json(&item)})),
    )
}

async fn set_quantity(
    State(state): State<SharedState>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    if let Err(reply) = guard(&state, &headers) {
        return reply;
    }
    let quantity = u32::try_from(body["quantity"].as_u64().unwrap_or(0)).unwrap_or(0);
    state
        .put_quantities
        .lock()
        .unwrap()
        .entry(product_id.clone())
        .or_default()
        .push(quantity);

    let mut items = state.items.lock().unwrap();
    let Some(item) = items.iter_mut().find(|i| i.product_id == product_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"success": false, "message": "item not found"})),
        );
    };
    item.quantity = quantity;
    let item = item.clone();
    (
        StatusCode::OK,
        Json(json!({"success": true, "item": item_json(&item)})),
    )
}

async fn increment(
    State(state): State<SharedState>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
) -> Reply {
    adjust(&state, &headers, &product_id, 1)
}

async fn decrement(
    State(state): State<SharedState>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
) -> Reply {
    adjust(&state, &headers, &product_id, -1)
}

/// Shared ±1 handler: clamps to stock on the way up, floors at 1 on the
/// way down, and returns the resulting row.
fn adjust(state: &BackendState, headers: &HeaderMap, product_id: &str, delta: i64) -> Reply {
    if let Err(reply) = guard(state, headers) {
        return reply;
    }
    let mut items = state.items.lock().unwrap();
    let Some(item) = items.iter_mut().find(|i| i.product_id == product_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"success": false, "message": "item not found"})),
        );
    };

    let mut next = i64::from(item.quantity) + delta;
    next = next.max(1);
    if let Some(stock) = item.stock {
        next = next.min(i64::from(stock));
    }
    item.quantity = u32::try_from(next).unwrap_or(1);
    let item = item.clone();
    (
        StatusCode::OK,
        Json(json!({"success": true, "item": item_json(&item)})),
    )
}

async fn delete_item(
    State(state): State<SharedState>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
) -> Reply {
    if let Err(reply) = guard(&state, &headers) {
        return reply;
    }
    state
        .items
        .lock()
        .unwrap()
        .retain(|i| i.product_id != product_id);
    (StatusCode::OK, Json(json!({"success": true})))
}

async fn clear_items(State(state): State<SharedState>, headers: HeaderMap) -> Reply {
    if let Err(reply) = guard(&state, &headers) {
        return reply;
    }
    state.items.lock().unwrap().clear();
    (StatusCode::OK, Json(json!({"success": true})))
}

/// Real backends authenticate this with an httpOnly cookie; the stub skips
/// that and hands out the currently-valid token unless pushed into the
/// failure mode.
async fn refresh(State(state): State<SharedState>) -> Reply {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if state.refresh_fails.load(Ordering::SeqCst) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "message": "refresh token expired"})),
        );
    }
    let token = state.valid_token.lock().unwrap().clone();
    (StatusCode::OK, Json(json!({"accessToken": token})))
}
