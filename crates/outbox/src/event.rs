//! Outbox event model.

use chrono::{DateTime, Utc};
use common::{EventId, Money, OrderId, PaymentIntentId, ReservationId, UserId};
use serde::{Deserialize, Serialize};

/// The closed set of event types this engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    OrderCreated,
    OrderConfirmed,
    OrderCancelled,
    OrderRefunded,
    PaymentCompleted,
    InventoryReleased,
}

impl EventKind {
    /// Returns the wire name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::OrderCreated => "order.created",
            EventKind::OrderConfirmed => "order.confirmed",
            EventKind::OrderCancelled => "order.cancelled",
            EventKind::OrderRefunded => "order.refunded",
            EventKind::PaymentCompleted => "payment.completed",
            EventKind::InventoryReleased => "inventory.released",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order.created" => Ok(EventKind::OrderCreated),
            "order.confirmed" => Ok(EventKind::OrderConfirmed),
            "order.cancelled" => Ok(EventKind::OrderCancelled),
            "order.refunded" => Ok(EventKind::OrderRefunded),
            "payment.completed" => Ok(EventKind::PaymentCompleted),
            "inventory.released" => Ok(EventKind::InventoryReleased),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// Publish lifecycle of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PublishStatus {
    /// Written but not yet acknowledged by the bus.
    #[default]
    Pending,

    /// Acknowledged by the bus; safe to skip on future drains.
    Published,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Pending => "Pending",
            PublishStatus::Published => "Published",
        }
    }
}

/// A durable event row.
///
/// Created in the same unit of work as the state change it announces, so a
/// crash between "decided" and "announced" cannot happen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: EventId,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub status: PublishStatus,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    /// Creates a Pending event from a serializable payload.
    pub fn new<T: Serialize>(kind: EventKind, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: EventId::new(),
            kind,
            payload: serde_json::to_value(payload)?,
            status: PublishStatus::Pending,
            created_at: Utc::now(),
        })
    }
}

/// Payload for `order.created`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedPayload {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total: Money,
}

/// Payload for `order.confirmed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfirmedPayload {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub payment_intent_id: PaymentIntentId,
}

/// Payload for `order.cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledPayload {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub reason: String,
}

/// Payload for `order.refunded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRefundedPayload {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub payment_intent_id: PaymentIntentId,
    pub amount: Money,
}

/// Payload for `payment.completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCompletedPayload {
    pub order_id: OrderId,
    pub payment_intent_id: PaymentIntentId,
    pub amount: Money,
}

/// Payload for `inventory.released`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReleasedPayload {
    pub order_id: OrderId,
    pub reservation_id: ReservationId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_wire_names() {
        assert_eq!(EventKind::OrderCreated.to_string(), "order.created");
        assert_eq!(EventKind::OrderConfirmed.to_string(), "order.confirmed");
        assert_eq!(EventKind::OrderCancelled.to_string(), "order.cancelled");
        assert_eq!(EventKind::OrderRefunded.to_string(), "order.refunded");
        assert_eq!(EventKind::PaymentCompleted.to_string(), "payment.completed");
        assert_eq!(
            EventKind::InventoryReleased.to_string(),
            "inventory.released"
        );
    }

    #[test]
    fn new_event_is_pending_with_payload() {
        let payload = OrderCreatedPayload {
            order_id: OrderId::new(),
            user_id: UserId::new(),
            total: Money::from_cents(4500),
        };
        let event = OutboxEvent::new(EventKind::OrderCreated, &payload).unwrap();

        assert_eq!(event.status, PublishStatus::Pending);
        assert_eq!(event.kind, EventKind::OrderCreated);
        assert_eq!(
            event.payload.get("order_id").unwrap().as_str().unwrap(),
            payload.order_id.to_string()
        );
    }

    #[test]
    fn event_ids_are_unique() {
        let payload = InventoryReleasedPayload {
            order_id: OrderId::new(),
            reservation_id: common::ReservationId::new(),
        };
        let a = OutboxEvent::new(EventKind::InventoryReleased, &payload).unwrap();
        let b = OutboxEvent::new(EventKind::InventoryReleased, &payload).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn serialization_round_trip() {
        let payload = PaymentCompletedPayload {
            order_id: OrderId::new(),
            payment_intent_id: PaymentIntentId::new(),
            amount: Money::from_cents(999),
        };
        let event = OutboxEvent::new(EventKind::PaymentCompleted, &payload).unwrap();

        let json = serde_json::to_string(&event).unwrap();
        let back: OutboxEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.kind, EventKind::PaymentCompleted);
    }
}
