//! Transactional outbox.
//!
//! Events are written to the outbox in the same unit of work as the state
//! change they announce, then published to the event bus by a background
//! drain loop. Delivery is at-least-once; consumers deduplicate on the
//! event id.

pub mod bus;
pub mod error;
pub mod event;
pub mod publisher;
pub mod store;

pub use bus::{EventBus, InMemoryEventBus};
pub use error::OutboxError;
pub use event::{
    EventKind, InventoryReleasedPayload, OrderCancelledPayload, OrderConfirmedPayload,
    OrderCreatedPayload, OrderRefundedPayload, OutboxEvent, PaymentCompletedPayload,
    PublishStatus,
};
pub use publisher::OutboxPublisher;
pub use store::{InMemoryOutboxStore, OutboxStore};
