//! Per-order mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use common::OrderId;
use tokio::sync::OwnedMutexGuard;

/// Serializes saga work per order id.
///
/// Only one transition runs for a given order at a time; work on different
/// orders never contends. Lock entries are kept for the life of the
/// process - an order id's lock must stay stable across the whole saga.
#[derive(Clone, Default)]
pub struct OrderLocks {
    inner: Arc<Mutex<HashMap<OrderId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl OrderLocks {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for an order, waiting if a transition is active.
    pub async fn acquire(&self, order_id: OrderId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap();
            Arc::clone(
                map.entry(order_id)
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}
