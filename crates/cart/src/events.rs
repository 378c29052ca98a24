//! Outcome notifications for cart actions.
//!
//! Every state-changing action reports its outcome here, success or failure;
//! there are no silent failures. The UI layer subscribes and renders these
//! as toasts (the Vietnamese copy lives with the UI, not in this crate).

use ruou_lang_core::ProductId;
use tokio::sync::broadcast;

/// Capacity of the broadcast ring. Slow subscribers that fall further behind
/// than this lose the oldest notifications, never the cart state itself.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A user-visible cart notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartEvent {
    /// A line was added (or its quantity bumped by an add). Fired before the
    /// network call resolves.
    ItemAdded {
        product_id: ProductId,
        product_name: String,
    },
    /// A line was removed.
    ItemRemoved { product_id: ProductId },
    /// The whole cart was emptied.
    CartCleared,
    /// A debounced quantity edit was confirmed by the server.
    QuantitySynced {
        product_id: ProductId,
        quantity: u32,
    },
    /// A background network call failed. `product_id` is `None` for
    /// cart-wide operations (clear).
    SyncFailed {
        product_id: Option<ProductId>,
        reason: String,
    },
    /// An increase was blocked by the known stock ceiling.
    StockLimited {
        product_id: ProductId,
        available: u32,
    },
    /// A typed quantity exceeded the stock ceiling and was clamped.
    QuantityClamped {
        product_id: ProductId,
        requested: u32,
        clamped_to: u32,
    },
    /// Manual entry was rejected before any network call (non-numeric or
    /// below 1).
    InvalidInput { product_id: ProductId },
    /// The initial cart load failed; the store error flag is set.
    LoadFailed,
    /// Token refresh failed; the user must sign in again.
    AuthExpired,
}

/// Broadcast hub for [`CartEvent`]s.
#[derive(Debug, Clone)]
pub(crate) struct CartEvents {
    tx: broadcast::Sender<CartEvent>,
}

impl CartEvents {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to future events.
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<CartEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Never blocks; emitting with no subscribers is fine.
    pub(crate) fn emit(&self, event: CartEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_receives_emitted_events() {
        let events = CartEvents::new();
        let mut rx = events.subscribe();

        events.emit(CartEvent::CartCleared);
        events.emit(CartEvent::ItemRemoved {
            product_id: ProductId::new("P1"),
        });

        assert_eq!(rx.recv().await.unwrap(), CartEvent::CartCleared);
        assert_eq!(
            rx.recv().await.unwrap(),
            CartEvent::ItemRemoved {
                product_id: ProductId::new("P1")
            }
        );
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let events = CartEvents::new();
        events.emit(CartEvent::LoadFailed);
    }

    #[tokio::test]
    async fn test_subscribers_see_events_after_subscription_only() {
        let events = CartEvents::new();
        events.emit(CartEvent::CartCleared);

        let mut rx = events.subscribe();
        events.emit(CartEvent::LoadFailed);
        assert_eq!(rx.recv().await.unwrap(), CartEvent::LoadFailed);
    }
}
