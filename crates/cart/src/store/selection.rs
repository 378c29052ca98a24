//! Checkout selection - a UI-level derived set, not part of the
//! authoritative cart.
//!
//! The user ticks a subset of lines to carry into checkout. Lines default
//! to selected the first time they appear; removed lines drop out of the
//! selection automatically. A line that leaves the cart and comes back is
//! treated as first-seen again.

use std::collections::HashSet;

use ruou_lang_core::ProductId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CheckoutSelection {
    selected: HashSet<ProductId>,
    seen: HashSet<ProductId>,
}

impl CheckoutSelection {
    /// Re-synchronize against the current line collection. Both sets are
    /// pruned to the lines that still exist; unseen lines are marked seen
    /// and selected.
    pub(crate) fn resync(&mut self, current: &[ProductId]) {
        let current_set: HashSet<&ProductId> = current.iter().collect();
        self.selected.retain(|id| current_set.contains(id));
        self.seen.retain(|id| current_set.contains(id));

        for id in current {
            if self.seen.insert(id.clone()) {
                self.selected.insert(id.clone());
            }
        }
    }

    pub(crate) fn set(&mut self, product_id: &ProductId, selected: bool) {
        // Only lines the selection has seen (i.e., lines in the cart) are
        // eligible; stray ids would otherwise linger until the next resync
        if !self.seen.contains(product_id) {
            return;
        }
        if selected {
            self.selected.insert(product_id.clone());
        } else {
            self.selected.remove(product_id);
        }
    }

    pub(crate) fn select_all(&mut self) {
        self.selected = self.seen.clone();
    }

    pub(crate) fn deselect_all(&mut self) {
        self.selected.clear();
    }

    pub(crate) fn is_selected(&self, product_id: &ProductId) -> bool {
        self.selected.contains(product_id)
    }
}
