//! Event bus trait and in-memory implementation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{OutboxError, Result};
use crate::event::OutboxEvent;

/// The downstream event bus.
///
/// Publishing is at-least-once from the caller's point of view: a publish
/// that errors will be retried on a later drain, so consumers must
/// deduplicate on the event id.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes one event, returning once the bus has acknowledged it.
    async fn publish(&self, event: &OutboxEvent) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryEventBusState {
    published: Vec<OutboxEvent>,
    fail_next: u32,
}

/// In-memory event bus recording everything published.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<Mutex<InMemoryEventBusState>>,
}

impl InMemoryEventBus {
    /// Creates a new empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` publishes fail.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().unwrap().fail_next = n;
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<OutboxEvent> {
        self.state.lock().unwrap().published.clone()
    }

    /// Number of published events of the given wire type.
    pub fn count_of(&self, kind_name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|e| e.kind.as_str() == kind_name)
            .count()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: &OutboxEvent) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(OutboxError::Bus("bus unavailable".to_string()));
        }
        state.published.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, OrderCancelledPayload};
    use common::{OrderId, UserId};

    fn event() -> OutboxEvent {
        OutboxEvent::new(
            EventKind::OrderCancelled,
            &OrderCancelledPayload {
                order_id: OrderId::new(),
                user_id: UserId::new(),
                reason: "payment failed".to_string(),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn publish_records_event() {
        let bus = InMemoryEventBus::new();
        bus.publish(&event()).await.unwrap();

        assert_eq!(bus.published().len(), 1);
        assert_eq!(bus.count_of("order.cancelled"), 1);
        assert_eq!(bus.count_of("order.confirmed"), 0);
    }

    #[tokio::test]
    async fn fail_next_fails_then_recovers() {
        let bus = InMemoryEventBus::new();
        bus.fail_next(1);

        assert!(bus.publish(&event()).await.is_err());
        assert!(bus.publish(&event()).await.is_ok());
        assert_eq!(bus.published().len(), 1);
    }
}
