//! Saga storage trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::Order;
use outbox::{InMemoryOutboxStore, OutboxEvent, OutboxStore};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::instance::SagaInstance;

/// Errors from the saga store backend.
#[derive(Debug, Error)]
pub enum SagaStoreError {
    /// Backend failure.
    #[error("{0}")]
    Backend(String),

    /// Serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable storage for orders, saga instances, and their outbox events.
///
/// `persist` is the one write path: the order update, the saga update, and
/// any outbox rows commit as a single unit of work, which is what makes a
/// crash between "decided" and "announced" impossible.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Atomically upserts the order and saga and appends outbox rows.
    async fn persist(
        &self,
        order: &Order,
        saga: &SagaInstance,
        events: Vec<OutboxEvent>,
    ) -> Result<(), SagaStoreError>;

    /// Loads an order and its saga.
    async fn load(&self, order_id: OrderId) -> Result<Option<(Order, SagaInstance)>, SagaStoreError>;

    /// Orders whose status is not terminal, for resumption after restart.
    async fn incomplete(&self) -> Result<Vec<OrderId>, SagaStoreError>;
}

/// In-memory saga store.
///
/// Shares its outbox with an [`InMemoryOutboxStore`] so the publisher
/// drains exactly what `persist` wrote.
#[derive(Clone, Default)]
pub struct InMemorySagaStore {
    records: Arc<RwLock<HashMap<OrderId, (Order, SagaInstance)>>>,
    outbox: InMemoryOutboxStore,
}

impl InMemorySagaStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The outbox side of this store, for wiring up a publisher.
    pub fn outbox(&self) -> InMemoryOutboxStore {
        self.outbox.clone()
    }

    /// Number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn persist(
        &self,
        order: &Order,
        saga: &SagaInstance,
        events: Vec<OutboxEvent>,
    ) -> Result<(), SagaStoreError> {
        // Hold the record lock across the outbox append so the unit of
        // work is atomic with respect to other persists.
        let mut records = self.records.write().await;
        records.insert(order.id(), (order.clone(), saga.clone()));
        if !events.is_empty() {
            self.outbox
                .enqueue(events)
                .await
                .map_err(|e| SagaStoreError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    async fn load(
        &self,
        order_id: OrderId,
    ) -> Result<Option<(Order, SagaInstance)>, SagaStoreError> {
        Ok(self.records.read().await.get(&order_id).cloned())
    }

    async fn incomplete(&self) -> Result<Vec<OrderId>, SagaStoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|(order, _)| !order.is_terminal())
            .map(|(order, _)| order.id())
            .collect())
    }
}
