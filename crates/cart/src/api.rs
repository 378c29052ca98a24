//! Cart REST API client.
//!
//! Thin HTTP wrapper over the backend cart endpoints with bearer-token auth
//! and transparent recovery from expired access tokens: a 401 triggers at
//! most one coalesced token refresh (see [`Session`]) and one retry of the
//! original request. If the refresh itself fails, the error surfaces as
//! [`ApiError::AuthExpired`] and the caller routes the user back to sign-in.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument};
use url::Url;

use ruou_lang_core::{ItemId, ProductId};

use crate::config::CartConfig;
use crate::session::Session;

/// Errors that can occur when talking to the cart API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed at the transport level.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be constructed.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Non-2xx response that is not a recoverable 401.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Response status code.
        status: StatusCode,
        /// Response body, truncated for logging.
        body: String,
    },

    /// The access token expired and could not be refreshed. The user must
    /// authenticate again.
    #[error("Authentication failed - please login again")]
    AuthExpired,

    /// 2xx envelope with `success: false`.
    #[error("Backend rejected request: {0}")]
    Backend(String),
}

// =============================================================================
// Wire Types
// =============================================================================

/// One cart line as the backend serializes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemPayload {
    /// Backend row identity.
    #[serde(default)]
    pub item_id: Option<ItemId>,
    /// Product identity; unique per cart.
    pub product_id: ProductId,
    /// Display name, snapshot at add time.
    pub product_name: String,
    /// Product image path.
    #[serde(default)]
    pub image: Option<String>,
    /// Unit price in whole đồng.
    pub price: i64,
    /// Persisted quantity.
    pub quantity: u32,
    /// Remaining stock, when the backend knows it.
    #[serde(default)]
    pub stock: Option<u32>,
    /// Row creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Response shape of `GET /customer/cartitems`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemsResponse {
    /// Envelope flag.
    pub success: bool,
    /// All cart lines for the session.
    pub items: Vec<CartItemPayload>,
    /// Sum of quantities, as the server computed it.
    #[serde(default)]
    pub total_items: u32,
}

/// Response shape of the mutating item endpoints (add, set, ±1).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMutationResponse {
    /// Envelope flag.
    pub success: bool,
    /// Human-readable outcome message.
    #[serde(default)]
    pub message: Option<String>,
    /// The resulting item state, authoritative for quantity.
    #[serde(default)]
    pub item: Option<CartItemPayload>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddToCartRequest<'a> {
    product_id: &'a ProductId,
    quantity: u32,
}

#[derive(Debug, Serialize)]
struct UpdateQuantityRequest {
    quantity: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
}

// =============================================================================
// CartApi
// =============================================================================

/// Client for the cart REST API.
///
/// Cheap to clone. Holds a cookie store so the httpOnly refresh cookie set
/// at login flows with `POST /auth/refresh`.
#[derive(Clone)]
pub struct CartApi {
    inner: Arc<CartApiInner>,
}

struct CartApiInner {
    http: reqwest::Client,
    base_url: Url,
    session: Session,
}

impl CartApi {
    /// Create a new cart API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &CartConfig, session: Session) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(CartApiInner {
                http,
                base_url: config.api_base_url.clone(),
                session,
            }),
        })
    }

    /// The session this client authenticates with.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    // =========================================================================
    // Cart Operations
    // =========================================================================

    /// Fetch every cart line for the current session.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-2xx response, or an
    /// unparseable body.
    #[instrument(skip(self))]
    pub async fn get_cart_items(&self) -> Result<CartItemsResponse, ApiError> {
        let response: CartItemsResponse = self
            .send_json(Method::GET, "customer/cartitems", None)
            .await?;
        if !response.success {
            return Err(ApiError::Backend("cart listing failed".to_string()));
        }
        Ok(response)
    }

    /// Insert-or-increment a line; the backend decides which.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects it.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_to_cart(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartMutationResponse, ApiError> {
        let body = serde_json::to_value(AddToCartRequest {
            product_id,
            quantity,
        })?;
        let response: CartMutationResponse = self
            .send_json(Method::POST, "customer/insertitems", Some(body))
            .await?;
        ensure_mutation_success(response)
    }

    /// Absolute set of a line's quantity.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects it.
    #[instrument(skip(self), fields(product_id = %product_id, quantity))]
    pub async fn update_quantity(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartMutationResponse, ApiError> {
        let body = serde_json::to_value(UpdateQuantityRequest { quantity })?;
        let path = format!("customer/cartitems/{product_id}");
        let response: CartMutationResponse =
            self.send_json(Method::PUT, &path, Some(body)).await?;
        ensure_mutation_success(response)
    }

    /// Atomic server-side +1. The returned item carries the authoritative
    /// resulting quantity (the server may clamp against stock).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects it.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn increment_by_one(
        &self,
        product_id: &ProductId,
    ) -> Result<CartMutationResponse, ApiError> {
        let path = format!("customer/incrementby1/{product_id}");
        let response: CartMutationResponse = self.send_json(Method::POST, &path, None).await?;
        ensure_mutation_success(response)
    }

    /// Atomic server-side -1 (server floors at 1).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects it.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn decrement_by_one(
        &self,
        product_id: &ProductId,
    ) -> Result<CartMutationResponse, ApiError> {
        let path = format!("customer/decrementby1/{product_id}");
        let response: CartMutationResponse = self.send_json(Method::POST, &path, None).await?;
        ensure_mutation_success(response)
    }

    /// Delete one line.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects it.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_from_cart(&self, product_id: &ProductId) -> Result<(), ApiError> {
        let path = format!("customer/cartitems/{product_id}");
        self.send_delete(&path).await
    }

    /// Delete every line for the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects it.
    #[instrument(skip(self))]
    pub async fn clear_all_cart_items(&self) -> Result<(), ApiError> {
        self.send_delete("customer/cartitems").await
    }

    // =========================================================================
    // Token Refresh
    // =========================================================================

    /// Rotate the access token via `POST /auth/refresh`.
    ///
    /// Authenticates with the httpOnly refresh cookie, not the bearer token.
    /// On success the new token is installed into the session and returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh endpoint rejects the cookie or the
    /// response cannot be parsed.
    pub async fn refresh_access_token(&self) -> Result<String, ApiError> {
        let url = self.endpoint("auth/refresh")?;
        let response = self
            .inner
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status,
                body: truncate(&text),
            });
        }

        let parsed: RefreshResponse = parse_body(&text)?;
        self.inner.session.set_token(parsed.access_token.clone());
        debug!("access token rotated");
        Ok(parsed.access_token)
    }

    /// Coalesced refresh after an observed 401.
    ///
    /// Exactly one of N concurrent callers performs the network refresh;
    /// the rest wait on the guard and reuse the rotated token.
    async fn refresh_coalesced(&self, observed_epoch: u64) -> Result<String, ApiError> {
        let session = &self.inner.session;
        let _guard = session.begin_refresh().await;

        if session.epoch() > observed_epoch
            && let Some(token) = session.token()
        {
            debug!("token already rotated by a concurrent refresh");
            return Ok(token);
        }

        self.refresh_access_token().await.map_err(|e| {
            error!(error = %e, "token refresh failed");
            ApiError::AuthExpired
        })
    }

    // =========================================================================
    // Request Plumbing
    // =========================================================================

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.inner.base_url.join(path)?)
    }

    async fn dispatch(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
        token: Option<String>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self
            .inner
            .http
            .request(method, url)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Issue a request with the 401-refresh-retry-once policy and return the
    /// successful response body as text.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String, ApiError> {
        let url = self.endpoint(path)?;

        // Read token and epoch before the first attempt; the epoch tells the
        // refresh path whether a concurrent caller rotated the token first.
        let observed_epoch = self.inner.session.epoch();
        let token = self.inner.session.token();

        let response = self
            .dispatch(method.clone(), url.clone(), body.as_ref(), token)
            .await?;

        let response = if response.status() == StatusCode::UNAUTHORIZED {
            debug!(path, "got 401, attempting token refresh");
            let token = self.refresh_coalesced(observed_epoch).await?;
            self.dispatch(method, url, body.as_ref(), Some(token))
                .await?
        } else {
            response
        };

        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            // Still unauthorized after the single retry
            return Err(ApiError::AuthExpired);
        }
        if !status.is_success() {
            error!(%status, path, body = %truncate(&text), "cart API returned non-success status");
            return Err(ApiError::Status {
                status,
                body: truncate(&text),
            });
        }

        Ok(text)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ApiError> {
        let text = self.send(method, path, body).await?;
        parse_body(&text)
    }

    /// DELETE endpoints may answer with an empty body or a success envelope.
    async fn send_delete(&self, path: &str) -> Result<(), ApiError> {
        let text = self.send(Method::DELETE, path, None).await?;
        if text.trim().is_empty() {
            return Ok(());
        }
        let parsed: DeleteResponse = parse_body(&text)?;
        if !parsed.success {
            return Err(ApiError::Backend(
                parsed.message.unwrap_or_else(|| "delete failed".to_string()),
            ));
        }
        Ok(())
    }
}

fn ensure_mutation_success(
    response: CartMutationResponse,
) -> Result<CartMutationResponse, ApiError> {
    if !response.success {
        return Err(ApiError::Backend(
            response
                .message
                .unwrap_or_else(|| "cart mutation failed".to_string()),
        ));
    }
    Ok(response)
}

fn parse_body<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    serde_json::from_str(text).map_err(|e| {
        error!(error = %e, body = %truncate(text), "failed to parse cart API response");
        ApiError::Parse(e)
    })
}

fn truncate(text: &str) -> String {
    text.chars().take(500).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_items_response_parses() {
        let json = r#"{
            "success": true,
            "items": [{
                "itemId": "item-1",
                "productId": "ruou-nep-cai",
                "productName": "Rượu Nếp Cái Hoa Vàng",
                "image": "/images/nep-cai.png",
                "price": 120000,
                "quantity": 2,
                "stock": 10,
                "createdAt": "2025-11-02T08:30:00Z"
            }],
            "totalItems": 2
        }"#;

        let parsed: CartItemsResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.total_items, 2);
        assert_eq!(parsed.items.len(), 1);

        let item = &parsed.items[0];
        assert_eq!(item.product_id, ProductId::new("ruou-nep-cai"));
        assert_eq!(item.price, 120_000);
        assert_eq!(item.quantity, 2);
        assert_eq!(item.stock, Some(10));
        assert!(item.created_at.is_some());
    }

    #[test]
    fn test_mutation_response_optional_fields() {
        // Remove/clear style envelope without an item
        let json = r#"{"success": true, "message": "Đã thêm vào giỏ hàng"}"#;
        let parsed: CartMutationResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.success);
        assert!(parsed.item.is_none());

        // Item without stock or timestamps
        let json = r#"{
            "success": true,
            "item": {"productId": "P1", "productName": "A", "price": 50000, "quantity": 3}
        }"#;
        let parsed: CartMutationResponse = serde_json::from_str(json).unwrap();
        let item = parsed.item.unwrap();
        assert_eq!(item.quantity, 3);
        assert_eq!(item.stock, None);
        assert_eq!(item.item_id, None);
    }

    #[test]
    fn test_add_request_wire_shape() {
        let product_id = ProductId::new("P1");
        let body = serde_json::to_value(AddToCartRequest {
            product_id: &product_id,
            quantity: 1,
        })
        .unwrap();
        assert_eq!(body["productId"], "P1");
        assert_eq!(body["quantity"], 1);
    }

    #[test]
    fn test_refresh_response_wire_shape() {
        let parsed: RefreshResponse =
            serde_json::from_str(r#"{"accessToken": "tok-xyz"}"#).unwrap();
        assert_eq!(parsed.access_token, "tok-xyz");
    }

    #[test]
    fn test_ensure_mutation_success_rejects_envelope_failure() {
        let response = CartMutationResponse {
            success: false,
            message: Some("hết hàng".to_string()),
            item: None,
        };
        let err = ensure_mutation_success(response).unwrap_err();
        assert!(matches!(err, ApiError::Backend(msg) if msg == "hết hàng"));
    }

    #[test]
    fn test_truncate_caps_body() {
        let long = "x".repeat(2000);
        assert_eq!(truncate(&long).len(), 500);
    }
}
