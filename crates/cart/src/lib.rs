//! Client-side cart synchronization for the Rượu Làng storefront.
//!
//! # Architecture
//!
//! - [`store::CartStore`] is the single source of truth for the client-visible
//!   cart. All mutation flows through a reducer; optimistic updates apply
//!   immediately and network sync happens in the background.
//! - [`api::CartApi`] talks to the backend REST API with bearer-token auth
//!   and a refresh-on-401 retry-once policy.
//! - [`session::Session`] holds the access token with a single-flight
//!   refresh guard so concurrent 401s trigger exactly one refresh.
//! - [`debounce::Debouncer`] coalesces rapid per-product quantity edits into
//!   one absolute-set call per quiet period.
//! - [`events::CartEvent`] is the outcome stream the UI renders as toasts.
//!
//! # Example
//!
//! ```rust,ignore
//! use ruou_lang_cart::{CartApi, CartConfig, CartStore, NewCartLine, Session};
//! use ruou_lang_core::{Price, ProductId};
//!
//! let config = CartConfig::from_env()?;
//! let session = Session::new();
//! session.set_token("access-token-from-login");
//!
//! let api = CartApi::new(&config, session)?;
//! let store = CartStore::new(api, &config);
//! let mut events = store.subscribe();
//!
//! store.load_from_api().await?;
//! store.add_to_cart(NewCartLine {
//!     product_id: ProductId::new("ruou-nep-cai"),
//!     product_name: "Rượu Nếp Cái Hoa Vàng".into(),
//!     image: "/images/nep-cai.png".into(),
//!     price: Price::from_vnd(120_000),
//!     stock: Some(12),
//! });
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod config;
pub mod debounce;
pub mod error;
pub mod events;
pub mod session;
pub mod store;

pub use api::CartApi;
pub use config::CartConfig;
pub use debounce::Debouncer;
pub use error::CartError;
pub use events::CartEvent;
pub use session::Session;
pub use store::{CartLine, CartStore, NewCartLine};
