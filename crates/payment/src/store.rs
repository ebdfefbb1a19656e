//! Payment intent storage trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, PaymentIntentId};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::intent::{IntentStatus, PaymentIntent};

/// Storage for payment intents.
#[async_trait]
pub trait PaymentIntentStore: Send + Sync {
    /// Persists a new intent.
    async fn insert(&self, intent: &PaymentIntent) -> Result<()>;

    /// Loads an intent by id.
    async fn get(&self, id: PaymentIntentId) -> Result<Option<PaymentIntent>>;

    /// Loads an intent by its idempotency key.
    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<PaymentIntent>>;

    /// Loads the intent for an order, if one was created.
    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<PaymentIntent>>;

    /// Updates the status of an intent.
    async fn set_status(&self, id: PaymentIntentId, status: IntentStatus) -> Result<()>;
}

#[derive(Default)]
struct IntentTable {
    by_id: HashMap<PaymentIntentId, PaymentIntent>,
    by_idempotency_key: HashMap<String, PaymentIntentId>,
    by_order: HashMap<OrderId, PaymentIntentId>,
}

/// In-memory payment intent store.
#[derive(Clone, Default)]
pub struct InMemoryPaymentIntentStore {
    table: Arc<RwLock<IntentTable>>,
}

impl InMemoryPaymentIntentStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of intents stored.
    pub async fn intent_count(&self) -> usize {
        self.table.read().await.by_id.len()
    }
}

#[async_trait]
impl PaymentIntentStore for InMemoryPaymentIntentStore {
    async fn insert(&self, intent: &PaymentIntent) -> Result<()> {
        let mut table = self.table.write().await;
        table
            .by_idempotency_key
            .insert(intent.idempotency_key.clone(), intent.id);
        table.by_order.insert(intent.order_id, intent.id);
        table.by_id.insert(intent.id, intent.clone());
        Ok(())
    }

    async fn get(&self, id: PaymentIntentId) -> Result<Option<PaymentIntent>> {
        Ok(self.table.read().await.by_id.get(&id).cloned())
    }

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<PaymentIntent>> {
        let table = self.table.read().await;
        Ok(table
            .by_idempotency_key
            .get(key)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<PaymentIntent>> {
        let table = self.table.read().await;
        Ok(table
            .by_order
            .get(&order_id)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn set_status(&self, id: PaymentIntentId, status: IntentStatus) -> Result<()> {
        let mut table = self.table.write().await;
        if let Some(intent) = table.by_id.get_mut(&id) {
            intent.status = status;
        }
        Ok(())
    }
}
