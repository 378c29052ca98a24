//! Cart state and the reducer that is its only mutation path.
//!
//! Every line tracks both the desired `quantity` and the
//! `last_synced_quantity` the server has confirmed; the delta between them
//! is the unsynced local change the store works to drive to zero.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use ruou_lang_core::{Price, ProductId};

use crate::api::CartItemPayload;
use crate::store::selection::CheckoutSelection;

/// Fallback image for lines the backend serialized without one.
pub(crate) const PLACEHOLDER_IMAGE: &str = "/placeholder-product.png";

/// One cart row for a distinct product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    /// Stable identity; unique key in the cart.
    pub product_id: ProductId,
    /// Display name, snapshot at add time.
    pub product_name: String,
    /// Product image path.
    pub image: String,
    /// Unit price, snapshot at add time.
    pub price: Price,
    /// Desired quantity, driven by the UI. Always >= 1.
    pub quantity: u32,
    /// Quantity last confirmed persisted server-side.
    pub last_synced_quantity: u32,
    /// Supply ceiling, when known. `Some(0)` means out of stock.
    pub stock: Option<u32>,
}

impl CartLine {
    /// Build a line from the wire payload after a full load. The server
    /// state is authoritative, so the synced baseline equals the quantity.
    pub(crate) fn from_payload(payload: CartItemPayload) -> Self {
        Self {
            product_id: payload.product_id,
            product_name: payload.product_name,
            image: payload
                .image
                .filter(|i| !i.is_empty())
                .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string()),
            price: Price::from_vnd(payload.price),
            quantity: payload.quantity,
            last_synced_quantity: payload.quantity,
            stock: payload.stock,
        }
    }

    /// Whether a local edit has not been confirmed by the server yet.
    #[must_use]
    pub fn has_unsynced_change(&self) -> bool {
        self.quantity != self.last_synced_quantity
    }

    /// Whether the line cannot be increased further.
    #[must_use]
    pub fn at_stock_ceiling(&self) -> bool {
        self.stock.is_some_and(|s| self.quantity >= s)
    }

    /// Line subtotal (price x quantity).
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.price.times(self.quantity)
    }
}

/// Parameters for a new optimistic line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCartLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub image: String,
    pub price: Price,
    pub stock: Option<u32>,
}

/// Reducer actions. The state is mutated exclusively through
/// [`CartState::apply`]; there is no other mutation path.
#[derive(Debug, Clone)]
pub(crate) enum CartAction {
    SetLoading(bool),
    SetError(Option<String>),
    /// Replace local state wholesale with server state (full resync).
    SetItems(Vec<CartLine>),
    /// Optimistic add: existing lines get `quantity += 1` with the synced
    /// baseline untouched; new lines start at `quantity = 1, synced = 0`.
    AddItemOptimistic(NewCartLine),
    /// Set the desired quantity, floored at 1.
    UpdateLocalQuantity {
        product_id: ProductId,
        quantity: u32,
    },
    /// Record a confirmed server acknowledgment.
    UpdateSyncedQuantity {
        product_id: ProductId,
        quantity: u32,
    },
    RecordSyncTime {
        product_id: ProductId,
        at: DateTime<Utc>,
    },
    RemoveItem(ProductId),
    Clear,
    SetSelected {
        product_id: ProductId,
        selected: bool,
    },
    SelectAll,
    DeselectAll,
    /// Back to the initial state (session teardown).
    Reset,
}

/// The cart's client-visible state.
#[derive(Debug, Clone, Default)]
pub(crate) struct CartState {
    items: Vec<CartLine>,
    pub is_loading: bool,
    pub error: Option<String>,
    last_sync_time: HashMap<ProductId, DateTime<Utc>>,
    selection: CheckoutSelection,
}

impl CartState {
    /// Apply an action. Pure state transition - no I/O, no timers.
    pub(crate) fn apply(&mut self, action: CartAction) {
        match action {
            CartAction::SetLoading(loading) => self.is_loading = loading,

            CartAction::SetError(error) => self.error = error,

            CartAction::SetItems(items) => {
                self.items = items;
                self.is_loading = false;
                self.error = None;
                self.last_sync_time.clear();
                self.resync_selection();
            }

            CartAction::AddItemOptimistic(new_line) => {
                if let Some(line) = self.line_mut(&new_line.product_id) {
                    // Existing line: bump quantity, leave the synced baseline
                    // for the add acknowledgment to reconcile
                    line.quantity += 1;
                } else {
                    self.items.push(CartLine {
                        product_id: new_line.product_id,
                        product_name: new_line.product_name,
                        image: if new_line.image.is_empty() {
                            PLACEHOLDER_IMAGE.to_string()
                        } else {
                            new_line.image
                        },
                        price: new_line.price,
                        quantity: 1,
                        last_synced_quantity: 0,
                        stock: new_line.stock,
                    });
                    self.resync_selection();
                }
            }

            CartAction::UpdateLocalQuantity {
                product_id,
                quantity,
            } => {
                if let Some(line) = self.line_mut(&product_id) {
                    line.quantity = quantity.max(1);
                }
            }

            CartAction::UpdateSyncedQuantity {
                product_id,
                quantity,
            } => {
                if let Some(line) = self.line_mut(&product_id) {
                    line.last_synced_quantity = quantity;
                }
            }

            CartAction::RecordSyncTime { product_id, at } => {
                self.last_sync_time.insert(product_id, at);
            }

            CartAction::RemoveItem(product_id) => {
                self.items.retain(|line| line.product_id != product_id);
                self.last_sync_time.remove(&product_id);
                self.resync_selection();
            }

            CartAction::Clear => {
                self.items.clear();
                self.last_sync_time.clear();
                self.resync_selection();
            }

            CartAction::SetSelected {
                product_id,
                selected,
            } => self.selection.set(&product_id, selected),

            CartAction::SelectAll => self.selection.select_all(),

            CartAction::DeselectAll => self.selection.deselect_all(),

            CartAction::Reset => *self = Self::default(),
        }
    }

    pub(crate) fn items(&self) -> &[CartLine] {
        &self.items
    }

    pub(crate) fn line(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.items.iter().find(|l| &l.product_id == product_id)
    }

    fn line_mut(&mut self, product_id: &ProductId) -> Option<&mut CartLine> {
        self.items.iter_mut().find(|l| &l.product_id == product_id)
    }

    pub(crate) fn last_sync_time(&self, product_id: &ProductId) -> Option<DateTime<Utc>> {
        self.last_sync_time.get(product_id).copied()
    }

    /// Sum of quantities. Recomputed on every read, not cached.
    pub(crate) fn total_items(&self) -> u32 {
        self.items.iter().map(|l| l.quantity).sum()
    }

    /// Sum of price x quantity. Recomputed on every read, not cached.
    pub(crate) fn total_price(&self) -> Decimal {
        self.items.iter().map(CartLine::subtotal).sum()
    }

    pub(crate) fn is_selected(&self, product_id: &ProductId) -> bool {
        self.selection.is_selected(product_id)
    }

    pub(crate) fn selected_product_ids(&self) -> Vec<ProductId> {
        self.items
            .iter()
            .filter(|l| self.selection.is_selected(&l.product_id))
            .map(|l| l.product_id.clone())
            .collect()
    }

    /// Re-synchronize the checkout selection against the current lines:
    /// departed lines drop out, first-seen lines default to selected.
    fn resync_selection(&mut self) {
        let ids: Vec<ProductId> = self.items.iter().map(|l| l.product_id.clone()).collect();
        self.selection.resync(&ids);
    }
}
