//! Cart source trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::CartId;
use domain::CartSnapshot;
use tokio::sync::RwLock;

use crate::error::Result;

/// The external cart service, read exactly once at checkout start.
#[async_trait]
pub trait CartSource: Send + Sync {
    /// Returns the current snapshot of a cart, if the cart exists.
    async fn snapshot(&self, cart_id: CartId) -> Result<Option<CartSnapshot>>;
}

/// In-memory cart source for tests and the default binary.
#[derive(Clone, Default)]
pub struct InMemoryCartSource {
    carts: Arc<RwLock<HashMap<CartId, CartSnapshot>>>,
}

impl InMemoryCartSource {
    /// Creates a new empty cart source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a snapshot under its cart id.
    pub async fn put(&self, snapshot: CartSnapshot) {
        self.carts.write().await.insert(snapshot.cart_id, snapshot);
    }
}

#[async_trait]
impl CartSource for InMemoryCartSource {
    async fn snapshot(&self, cart_id: CartId) -> Result<Option<CartSnapshot>> {
        Ok(self.carts.read().await.get(&cart_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, ProductId, VariantId};
    use domain::CartItem;

    #[tokio::test]
    async fn put_and_snapshot() {
        let source = InMemoryCartSource::new();
        let snapshot = CartSnapshot {
            cart_id: CartId::new(),
            items: vec![CartItem {
                product_id: ProductId::new("p_1"),
                variant_id: VariantId::new("v_1"),
                quantity: 1,
                unit_price: Money::from_cents(500),
            }],
            taken_at: chrono::Utc::now(),
        };
        let cart_id = snapshot.cart_id;
        source.put(snapshot).await;

        let found = source.snapshot(cart_id).await.unwrap().unwrap();
        assert_eq!(found.cart_id, cart_id);
        assert_eq!(found.items.len(), 1);

        assert!(source.snapshot(CartId::new()).await.unwrap().is_none());
    }
}
