//! The cart store - single source of truth for the client-visible cart.
//!
//! Mediates between optimistic UI state and the eventually-consistent
//! server cart. UI actions apply to local state immediately; network sync
//! runs in the background, debounced per product so rapid quantity edits
//! collapse into one absolute-set call carrying only the final value.
//!
//! # Failure policy
//!
//! Each background sync declares how a confirmed network failure is
//! handled via [`FailurePolicy`]: the dedicated ±1 endpoints revert the
//! optimistic change, while add/remove/clear/manual-set keep it and only
//! report the failure. See DESIGN.md for the rationale.

mod selection;
mod state;

pub use state::{CartLine, NewCartLine};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tracing::{debug, error, instrument, warn};

use ruou_lang_core::ProductId;

use crate::api::{ApiError, CartApi, CartMutationResponse};
use crate::config::CartConfig;
use crate::debounce::Debouncer;
use crate::error::CartError;
use crate::events::{CartEvent, CartEvents};
use state::{CartAction, CartState};

/// How a background sync handles a confirmed network failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailurePolicy {
    /// Roll the optimistic change back to the previous quantity.
    Revert { previous_quantity: u32 },
    /// Leave the optimistic state in place; the failure is only reported.
    Keep,
}

/// Which ±1 endpoint a quantity adjustment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Adjustment {
    Increment,
    Decrement,
}

/// Reducer-driven cart state machine with debounced server sync.
///
/// Cheap to clone; all clones share one state. Lifecycle is bound to the
/// authenticated session: call [`load_from_api`](Self::load_from_api) once
/// auth is confirmed and [`reset`](Self::reset) on logout.
///
/// Methods that mutate must run inside a tokio runtime - background sync
/// is spawned as tasks.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    api: CartApi,
    state: Mutex<CartState>,
    events: CartEvents,
    /// Per-product timers for debounced quantity sync (~600ms quiet period).
    sync_debouncer: Debouncer,
    /// Per-product timers for raw text entry (~1000ms quiet period).
    input_debouncer: Debouncer,
    /// Latest raw text per product, awaiting its input debounce to elapse.
    pending_inputs: Mutex<HashMap<ProductId, String>>,
}

impl CartStore {
    /// Create a store over the given API client.
    #[must_use]
    pub fn new(api: CartApi, config: &CartConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                api,
                state: Mutex::new(CartState::default()),
                events: CartEvents::new(),
                sync_debouncer: Debouncer::new(config.sync_debounce),
                input_debouncer: Debouncer::new(config.input_debounce),
                pending_inputs: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to outcome notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CartEvent> {
        self.inner.events.subscribe()
    }

    // =========================================================================
    // Load / Teardown
    // =========================================================================

    /// Fetch server state and replace local state wholesale, with
    /// `last_synced_quantity = quantity` for every line.
    ///
    /// Only call at mount/login boundaries: optimistic changes made before
    /// this resolves are discarded by design. Sets the loading flag for the
    /// duration; on failure sets the store error flag and emits
    /// [`CartEvent::LoadFailed`].
    ///
    /// # Errors
    ///
    /// Returns the underlying API error in addition to flagging it.
    #[instrument(skip(self))]
    pub async fn load_from_api(&self) -> Result<(), CartError> {
        self.dispatch(CartAction::SetLoading(true));

        match self.inner.api.get_cart_items().await {
            Ok(response) => {
                let lines: Vec<CartLine> = response
                    .items
                    .into_iter()
                    .map(CartLine::from_payload)
                    .collect();
                debug!(count = lines.len(), "cart loaded from API");
                self.dispatch(CartAction::SetItems(lines));
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to load cart");
                self.dispatch(CartAction::SetLoading(false));
                self.dispatch(CartAction::SetError(Some(
                    "failed to load cart".to_string(),
                )));
                self.inner.events.emit(CartEvent::LoadFailed);
                if matches!(e, ApiError::AuthExpired) {
                    self.inner.events.emit(CartEvent::AuthExpired);
                }
                Err(e.into())
            }
        }
    }

    /// Session teardown: cancel every pending timer and restore the initial
    /// state. Called on logout or when the session's auth check fails.
    pub fn reset(&self) {
        self.inner.sync_debouncer.cancel_all();
        self.inner.input_debouncer.cancel_all();
        self.lock_pending_inputs().clear();
        self.dispatch(CartAction::Reset);
    }

    // =========================================================================
    // Optimistic Mutations
    // =========================================================================

    /// Add a product to the cart.
    ///
    /// Optimistic: an existing line's quantity bumps by 1 immediately, a new
    /// line appears with `quantity = 1`. [`CartEvent::ItemAdded`] fires
    /// before the network call resolves; the add itself runs in the
    /// background with insert-or-increment semantics decided server-side.
    /// A background failure keeps the optimistic change.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::OutOfStock`] when the product is known to have
    /// no stock; nothing is dispatched in that case.
    #[instrument(skip(self, new_line), fields(product_id = %new_line.product_id))]
    pub fn add_to_cart(&self, new_line: NewCartLine) -> Result<(), CartError> {
        if new_line.stock == Some(0) {
            self.inner.events.emit(CartEvent::StockLimited {
                product_id: new_line.product_id.clone(),
                available: 0,
            });
            return Err(CartError::OutOfStock {
                product_id: new_line.product_id,
                available: 0,
            });
        }

        let product_id = new_line.product_id.clone();
        let product_name = new_line.product_name.clone();
        self.dispatch(CartAction::AddItemOptimistic(new_line));
        self.inner.events.emit(CartEvent::ItemAdded {
            product_id: product_id.clone(),
            product_name,
        });

        // Fire-and-forget: always quantity 1, the backend decides
        // INSERT or UPDATE
        let store = self.clone();
        tokio::spawn(async move {
            match store.inner.api.add_to_cart(&product_id, 1).await {
                Ok(response) => store.reconcile_ack(&product_id, &response),
                Err(e) => store.on_sync_failure(Some(product_id), FailurePolicy::Keep, &e),
            }
        });

        Ok(())
    }

    /// Set the desired quantity for a line - immediate local update with
    /// debounced server sync.
    ///
    /// The value is floored at 1 and clamped to the known stock ceiling
    /// (emitting [`CartEvent::QuantityClamped`]). An out-of-stock line
    /// (`stock == Some(0)`) refuses any increase outright; decreases still
    /// apply. If the result equals the synced baseline, any pending sync
    /// for the product is cancelled and nothing is transmitted; otherwise
    /// an absolute-set call is scheduled after the quiet period, carrying
    /// only the final value.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::ItemNotFound`] when the product has no line,
    /// or [`CartError::OutOfStock`] for an increase on an out-of-stock
    /// line.
    #[instrument(skip(self), fields(product_id = %product_id, quantity))]
    pub fn update_local_quantity(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CartError> {
        let mut clamp_event = None;

        let (safe_quantity, last_synced) = {
            let state = self.lock_state();
            let line = state
                .line(product_id)
                .ok_or_else(|| CartError::ItemNotFound(product_id.clone()))?;

            let mut q = quantity.max(1);
            match line.stock {
                // Out of stock: decreases still apply, any increase is refused
                Some(0) if q > line.quantity => {
                    drop(state);
                    self.inner.events.emit(CartEvent::StockLimited {
                        product_id: product_id.clone(),
                        available: 0,
                    });
                    return Err(CartError::OutOfStock {
                        product_id: product_id.clone(),
                        available: 0,
                    });
                }
                Some(stock) if stock > 0 && q > stock => {
                    clamp_event = Some(CartEvent::QuantityClamped {
                        product_id: product_id.clone(),
                        requested: q,
                        clamped_to: stock,
                    });
                    q = stock;
                }
                _ => {}
            }
            (q, line.last_synced_quantity)
        };

        if let Some(event) = clamp_event {
            self.inner.events.emit(event);
        }

        self.dispatch(CartAction::UpdateLocalQuantity {
            product_id: product_id.clone(),
            quantity: safe_quantity,
        });

        if safe_quantity == last_synced {
            // Back at the synced value: nothing to transmit
            debug!(%product_id, "quantity equals synced baseline, sync cancelled");
            self.inner.sync_debouncer.cancel(product_id.as_str());
            return Ok(());
        }

        let store = self.clone();
        let pid = product_id.clone();
        self.inner
            .sync_debouncer
            .debounce(product_id.as_str(), async move {
                store.sync_quantity(pid, safe_quantity).await;
            });

        Ok(())
    }

    /// Increment a line by one via the dedicated +1 endpoint.
    ///
    /// Blocked when the known stock ceiling is reached
    /// ([`CartEvent::StockLimited`]). Otherwise the bump applies
    /// optimistically and the endpoint is called immediately (not
    /// debounced); the server's returned quantity is authoritative and
    /// overrides the optimistic guess. A network failure reverts.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::ItemNotFound`] or [`CartError::OutOfStock`].
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub fn increment(&self, product_id: &ProductId) -> Result<(), CartError> {
        let previous_quantity = {
            let state = self.lock_state();
            let line = state
                .line(product_id)
                .ok_or_else(|| CartError::ItemNotFound(product_id.clone()))?;

            if let Some(stock) = line.stock
                && line.quantity >= stock
            {
                drop(state);
                self.inner.events.emit(CartEvent::StockLimited {
                    product_id: product_id.clone(),
                    available: stock,
                });
                return Err(CartError::OutOfStock {
                    product_id: product_id.clone(),
                    available: stock,
                });
            }
            line.quantity
        };

        self.dispatch(CartAction::UpdateLocalQuantity {
            product_id: product_id.clone(),
            quantity: previous_quantity + 1,
        });
        self.spawn_adjustment(product_id.clone(), Adjustment::Increment, previous_quantity);
        Ok(())
    }

    /// Decrement a line by one via the dedicated -1 endpoint.
    ///
    /// Decrementing from quantity 1 removes the line entirely - the cart
    /// never holds a zero-quantity line. Otherwise mirrors
    /// [`increment`](Self::increment), including revert on failure.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::ItemNotFound`] when the product has no line.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub fn decrement(&self, product_id: &ProductId) -> Result<(), CartError> {
        let previous_quantity = {
            let state = self.lock_state();
            state
                .line(product_id)
                .ok_or_else(|| CartError::ItemNotFound(product_id.clone()))?
                .quantity
        };

        if previous_quantity == 1 {
            return self.remove_item(product_id);
        }

        self.dispatch(CartAction::UpdateLocalQuantity {
            product_id: product_id.clone(),
            quantity: previous_quantity - 1,
        });
        self.spawn_adjustment(product_id.clone(), Adjustment::Decrement, previous_quantity);
        Ok(())
    }

    /// Remove a line.
    ///
    /// Cancels any pending sync for the product first, so a stale
    /// absolute-set cannot fire after the deletion. The removal applies
    /// optimistically and stands even if the background delete fails.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::ItemNotFound`] when the product has no line.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub fn remove_item(&self, product_id: &ProductId) -> Result<(), CartError> {
        {
            let state = self.lock_state();
            if state.line(product_id).is_none() {
                return Err(CartError::ItemNotFound(product_id.clone()));
            }
        }

        self.inner.sync_debouncer.cancel(product_id.as_str());
        self.inner.input_debouncer.cancel(product_id.as_str());
        self.lock_pending_inputs().remove(product_id);

        self.dispatch(CartAction::RemoveItem(product_id.clone()));
        self.inner.events.emit(CartEvent::ItemRemoved {
            product_id: product_id.clone(),
        });

        let store = self.clone();
        let pid = product_id.clone();
        tokio::spawn(async move {
            if let Err(e) = store.inner.api.remove_from_cart(&pid).await {
                store.on_sync_failure(Some(pid), FailurePolicy::Keep, &e);
            }
        });

        Ok(())
    }

    /// Empty the cart.
    ///
    /// Cancels every pending timer, clears optimistically and calls the
    /// clear-all endpoint in the background; a failure is reported but the
    /// clear stands.
    #[instrument(skip(self))]
    pub fn clear(&self) {
        self.inner.sync_debouncer.cancel_all();
        self.inner.input_debouncer.cancel_all();
        self.lock_pending_inputs().clear();

        self.dispatch(CartAction::Clear);
        self.inner.events.emit(CartEvent::CartCleared);

        let store = self.clone();
        tokio::spawn(async move {
            if let Err(e) = store.inner.api.clear_all_cart_items().await {
                store.on_sync_failure(None, FailurePolicy::Keep, &e);
            }
        });
    }

    // =========================================================================
    // Manual Text Entry
    // =========================================================================

    /// Queue a raw quantity string typed into a line's input box.
    ///
    /// Digits-only strings are debounced (separately from the sync
    /// debounce, ~1s) and committed through
    /// [`update_local_quantity`](Self::update_local_quantity) once the user
    /// stops typing; intermediate keystrokes are superseded. An empty
    /// string cancels the pending commit (the user is still editing).
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] for non-numeric input, which
    /// is rejected before anything is scheduled.
    #[instrument(skip(self), fields(product_id = %product_id, raw))]
    pub fn queue_quantity_input(&self, product_id: &ProductId, raw: &str) -> Result<(), CartError> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            self.inner.input_debouncer.cancel(product_id.as_str());
            self.lock_pending_inputs().remove(product_id);
            return Ok(());
        }

        if !trimmed.chars().all(|c| c.is_ascii_digit()) {
            self.inner.events.emit(CartEvent::InvalidInput {
                product_id: product_id.clone(),
            });
            return Err(CartError::InvalidQuantity(
                "quantity must contain digits only".to_string(),
            ));
        }

        self.lock_pending_inputs()
            .insert(product_id.clone(), trimmed.to_string());

        let store = self.clone();
        let pid = product_id.clone();
        self.inner
            .input_debouncer
            .debounce(product_id.as_str(), async move {
                store.commit_quantity_input(&pid);
            });

        Ok(())
    }

    fn commit_quantity_input(&self, product_id: &ProductId) {
        let Some(raw) = self.lock_pending_inputs().remove(product_id) else {
            return;
        };

        match raw.parse::<u32>() {
            Ok(quantity) if quantity >= 1 => {
                if let Err(e) = self.update_local_quantity(product_id, quantity) {
                    debug!(%product_id, error = %e, "typed quantity rejected");
                }
            }
            _ => {
                // Zero or overflow: positive quantities only
                self.inner.events.emit(CartEvent::InvalidInput {
                    product_id: product_id.clone(),
                });
            }
        }
    }

    // =========================================================================
    // Checkout Selection
    // =========================================================================

    /// Mark a line as carried into checkout or not.
    pub fn set_selected(&self, product_id: &ProductId, selected: bool) {
        self.dispatch(CartAction::SetSelected {
            product_id: product_id.clone(),
            selected,
        });
    }

    /// Flip a line's checkout selection.
    pub fn toggle_selected(&self, product_id: &ProductId) {
        let selected = !self.is_selected(product_id);
        self.set_selected(product_id, selected);
    }

    /// Select every line for checkout.
    pub fn select_all(&self) {
        self.dispatch(CartAction::SelectAll);
    }

    /// Deselect every line.
    pub fn deselect_all(&self) {
        self.dispatch(CartAction::DeselectAll);
    }

    /// Whether a line is currently selected for checkout.
    #[must_use]
    pub fn is_selected(&self, product_id: &ProductId) -> bool {
        self.lock_state().is_selected(product_id)
    }

    /// Product ids selected for checkout, in cart order.
    #[must_use]
    pub fn selected_product_ids(&self) -> Vec<ProductId> {
        self.lock_state().selected_product_ids()
    }

    /// Lines selected for checkout, in cart order.
    #[must_use]
    pub fn selected_lines(&self) -> Vec<CartLine> {
        let state = self.lock_state();
        state
            .items()
            .iter()
            .filter(|l| state.is_selected(&l.product_id))
            .cloned()
            .collect()
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Snapshot of all lines, in insertion order.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        self.lock_state().items().to_vec()
    }

    /// Snapshot of one line.
    #[must_use]
    pub fn line(&self, product_id: &ProductId) -> Option<CartLine> {
        self.lock_state().line(product_id).cloned()
    }

    /// Sum of quantities. Recomputed on every call.
    #[must_use]
    pub fn total_items(&self) -> u32 {
        self.lock_state().total_items()
    }

    /// Sum of price x quantity. Recomputed on every call.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.lock_state().total_price()
    }

    /// Whether the initial load is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.lock_state().is_loading
    }

    /// Store-level error flag, set by a failed load.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.lock_state().error.clone()
    }

    /// Whether a debounced sync is scheduled for the product.
    #[must_use]
    pub fn is_sync_pending(&self, product_id: &ProductId) -> bool {
        self.inner.sync_debouncer.is_pending(product_id.as_str())
    }

    /// When the product's quantity was last confirmed by the server.
    #[must_use]
    pub fn last_sync_time(&self, product_id: &ProductId) -> Option<DateTime<Utc>> {
        self.lock_state().last_sync_time(product_id)
    }

    // =========================================================================
    // Background Sync
    // =========================================================================

    /// Debounced absolute-set sync for a product.
    async fn sync_quantity(&self, product_id: ProductId, quantity: u32) {
        debug!(%product_id, quantity, "syncing quantity");

        match self.inner.api.update_quantity(&product_id, quantity).await {
            Ok(_) => {
                self.dispatch(CartAction::UpdateSyncedQuantity {
                    product_id: product_id.clone(),
                    quantity,
                });
                self.dispatch(CartAction::RecordSyncTime {
                    product_id: product_id.clone(),
                    at: Utc::now(),
                });
                self.inner.events.emit(CartEvent::QuantitySynced {
                    product_id,
                    quantity,
                });
            }
            Err(e) => {
                // Manual edits keep the optimistic value on failure
                self.on_sync_failure(Some(product_id), FailurePolicy::Keep, &e);
            }
        }
    }

    fn spawn_adjustment(
        &self,
        product_id: ProductId,
        adjustment: Adjustment,
        previous_quantity: u32,
    ) {
        let store = self.clone();
        tokio::spawn(async move {
            let result = match adjustment {
                Adjustment::Increment => store.inner.api.increment_by_one(&product_id).await,
                Adjustment::Decrement => store.inner.api.decrement_by_one(&product_id).await,
            };

            match result {
                Ok(response) => store.reconcile_ack(&product_id, &response),
                Err(e) => store.on_sync_failure(
                    Some(product_id),
                    FailurePolicy::Revert { previous_quantity },
                    &e,
                ),
            }
        });
    }

    /// Fold a mutation acknowledgment back into the store. The server's
    /// quantity is authoritative: it overrides the optimistic guess when
    /// they differ (e.g., a server-side stock check clamped the change).
    fn reconcile_ack(&self, product_id: &ProductId, response: &CartMutationResponse) {
        let Some(item) = &response.item else {
            // No item in the ack: nothing safe to reconcile against.
            // Leaving the baseline keeps the no-overclaim invariant.
            debug!(%product_id, "mutation ack without item, baseline unchanged");
            return;
        };

        let diverged = {
            let state = self.lock_state();
            match state.line(product_id) {
                // Ack raced a removal; there is nothing left to reconcile
                None => {
                    debug!(%product_id, "mutation ack for a departed line ignored");
                    return;
                }
                Some(line) => line.quantity != item.quantity,
            }
        };
        if diverged {
            warn!(
                %product_id,
                server_quantity = item.quantity,
                "server overrode optimistic quantity"
            );
            self.dispatch(CartAction::UpdateLocalQuantity {
                product_id: product_id.clone(),
                quantity: item.quantity,
            });
        }

        self.dispatch(CartAction::UpdateSyncedQuantity {
            product_id: product_id.clone(),
            quantity: item.quantity,
        });
        self.dispatch(CartAction::RecordSyncTime {
            product_id: product_id.clone(),
            at: Utc::now(),
        });
        self.inner.events.emit(CartEvent::QuantitySynced {
            product_id: product_id.clone(),
            quantity: item.quantity,
        });
    }

    /// Central failure handler for background syncs. Applies the declared
    /// [`FailurePolicy`] and reports the failure - never silently.
    fn on_sync_failure(
        &self,
        product_id: Option<ProductId>,
        policy: FailurePolicy,
        error: &ApiError,
    ) {
        if let FailurePolicy::Revert { previous_quantity } = policy
            && let Some(pid) = &product_id
        {
            warn!(product_id = %pid, previous_quantity, error = %error, "reverting optimistic change");
            self.dispatch(CartAction::UpdateLocalQuantity {
                product_id: pid.clone(),
                quantity: previous_quantity,
            });
        } else {
            warn!(error = %error, "background cart sync failed, keeping optimistic state");
        }

        self.inner.events.emit(CartEvent::SyncFailed {
            product_id,
            reason: error.to_string(),
        });
        if matches!(error, ApiError::AuthExpired) {
            self.inner.events.emit(CartEvent::AuthExpired);
        }
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    fn dispatch(&self, action: CartAction) {
        self.lock_state().apply(action);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CartState> {
        // Lock is held only for synchronous reducer work, never across awaits
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_pending_inputs(&self) -> std::sync::MutexGuard<'_, HashMap<ProductId, String>> {
        self.inner
            .pending_inputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}
