//! Unified error handling for the cart subsystem.

use thiserror::Error;

use ruou_lang_core::ProductId;

use crate::api::ApiError;
use crate::config::ConfigError;

/// Top-level error type for cart store operations.
///
/// Background sync failures never surface here - the store catches those
/// itself and reports them through the event stream. This type covers
/// foreground calls: loading, validation, and guard rejections.
#[derive(Debug, Error)]
pub enum CartError {
    /// Cart API operation failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Configuration failed to load.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Client-side validation rejected the input before any network call.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A quantity increase was blocked by the known stock ceiling.
    #[error("Out of stock: {product_id} has {available} left")]
    OutOfStock {
        product_id: ProductId,
        available: u32,
    },

    /// The referenced line is not in the cart.
    #[error("Item not in cart: {0}")]
    ItemNotFound(ProductId),
}

impl CartError {
    /// Whether this error means the session is gone and the user must
    /// authenticate again.
    #[must_use]
    pub const fn requires_reauth(&self) -> bool {
        matches!(self, Self::Api(ApiError::AuthExpired))
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;
