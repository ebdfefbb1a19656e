//! Outbox storage trait and in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use common::EventId;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::event::{OutboxEvent, PublishStatus};

/// Storage for outbox rows.
///
/// Rows are inserted by the saga store inside its persist transaction;
/// this trait is the publisher's view of them.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Appends rows. In-memory saga stores share state with this; the
    /// Postgres implementation inserts in the caller's transaction.
    async fn enqueue(&self, events: Vec<OutboxEvent>) -> Result<()>;

    /// Oldest Pending rows, up to `limit`.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>>;

    /// Marks rows Published after the bus acknowledged them.
    async fn mark_published(&self, ids: &[EventId]) -> Result<()>;
}

/// In-memory outbox store.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    events: Arc<RwLock<Vec<OutboxEvent>>>,
}

impl InMemoryOutboxStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows, in insertion order (test inspection).
    pub async fn all(&self) -> Vec<OutboxEvent> {
        self.events.read().await.clone()
    }

    /// Number of rows still Pending.
    pub async fn pending_count(&self) -> usize {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.status == PublishStatus::Pending)
            .count()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn enqueue(&self, events: Vec<OutboxEvent>) -> Result<()> {
        self.events.write().await.extend(events);
        Ok(())
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.status == PublishStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, ids: &[EventId]) -> Result<()> {
        let mut events = self.events.write().await;
        for event in events.iter_mut() {
            if ids.contains(&event.id) {
                event.status = PublishStatus::Published;
            }
        }
        Ok(())
    }
}
