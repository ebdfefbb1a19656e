//! Inventory records keyed by (product, variant).

use common::{ProductId, VariantId};
use serde::{Deserialize, Serialize};

/// The key a stock counter lives under.
///
/// Reservation serializes per key, so unrelated products never contend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantKey {
    pub product_id: ProductId,
    pub variant_id: VariantId,
}

impl VariantKey {
    pub fn new(product_id: impl Into<ProductId>, variant_id: impl Into<VariantId>) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id: variant_id.into(),
        }
    }
}

impl std::fmt::Display for VariantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.product_id, self.variant_id)
    }
}

/// Stock counters for one variant.
///
/// Invariant: `0 <= reserved_count <= stock_count`. Counters only move
/// through the reservation lifecycle - reserve increments `reserved_count`,
/// commit decrements both by the same amount, release decrements
/// `reserved_count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub stock_count: u32,
    pub reserved_count: u32,
}

impl InventoryRecord {
    /// Units available to sell right now.
    pub fn available(&self) -> u32 {
        self.stock_count - self.reserved_count
    }

    /// Attempts to hold `quantity` units. Returns false without mutating
    /// when availability is insufficient.
    pub fn try_hold(&mut self, quantity: u32) -> bool {
        if self.available() < quantity {
            return false;
        }
        self.reserved_count += quantity;
        true
    }

    /// Returns `quantity` held units to availability.
    pub fn release(&mut self, quantity: u32) {
        debug_assert!(self.reserved_count >= quantity);
        self.reserved_count = self.reserved_count.saturating_sub(quantity);
    }

    /// Converts `quantity` held units into a sale.
    pub fn commit(&mut self, quantity: u32) {
        debug_assert!(self.reserved_count >= quantity);
        self.reserved_count = self.reserved_count.saturating_sub(quantity);
        self.stock_count = self.stock_count.saturating_sub(quantity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_within_availability() {
        let mut rec = InventoryRecord {
            stock_count: 5,
            reserved_count: 0,
        };
        assert!(rec.try_hold(3));
        assert_eq!(rec.reserved_count, 3);
        assert_eq!(rec.available(), 2);
    }

    #[test]
    fn hold_beyond_availability_fails_without_mutation() {
        let mut rec = InventoryRecord {
            stock_count: 5,
            reserved_count: 4,
        };
        assert!(!rec.try_hold(2));
        assert_eq!(rec.reserved_count, 4);
    }

    #[test]
    fn release_restores_availability() {
        let mut rec = InventoryRecord {
            stock_count: 5,
            reserved_count: 3,
        };
        rec.release(3);
        assert_eq!(rec.available(), 5);
        assert_eq!(rec.stock_count, 5);
    }

    #[test]
    fn commit_decrements_both_counters() {
        let mut rec = InventoryRecord {
            stock_count: 5,
            reserved_count: 3,
        };
        rec.commit(3);
        assert_eq!(rec.stock_count, 2);
        assert_eq!(rec.reserved_count, 0);
        assert_eq!(rec.available(), 2);
    }

    #[test]
    fn key_display() {
        let key = VariantKey::new("p_1", "v_blue");
        assert_eq!(key.to_string(), "p_1/v_blue");
    }
}
