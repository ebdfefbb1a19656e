//! Checkout error taxonomy.

use common::{CartId, OrderId, PaymentIntentId};
use domain::{OrderError, OrderStatus};
use inventory::{InventoryError, VariantKey};
use payment::PaymentError;
use thiserror::Error;

use crate::store::SagaStoreError;

/// Errors surfaced by the saga orchestrator.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Cart validation or an illegal status transition.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// No cart exists with the given id.
    #[error("Unknown cart: {0}")]
    UnknownCart(CartId),

    /// A line could not be reserved; checkout was rejected before any
    /// payment attempt. The order is persisted as Failed.
    #[error("Insufficient stock for {key} (order {order_id})")]
    InsufficientStock { order_id: OrderId, key: VariantKey },

    /// The gateway declined the charge; the order was compensated.
    #[error("Payment declined for order {order_id}")]
    PaymentDeclined { order_id: OrderId },

    /// The payment retry budget ran out; the order was compensated.
    #[error("Payment timed out for order {order_id}")]
    PaymentTimeout { order_id: OrderId },

    /// The operation is not valid in the order's current status.
    #[error("Order {order_id} is {status}: cannot {action}")]
    InvalidState {
        order_id: OrderId,
        status: OrderStatus,
        action: &'static str,
    },

    /// No order exists with the given id.
    #[error("Unknown order: {0}")]
    UnknownOrder(OrderId),

    /// A payment outcome referenced an intent this engine never created.
    #[error("Unknown payment intent: {0}")]
    UnknownIntent(PaymentIntentId),

    /// Inventory engine failure (transient exhaustion or internal).
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Payment coordinator failure.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Saga store failure.
    #[error("Store error: {0}")]
    Store(#[from] SagaStoreError),

    /// Serialization error building an outbox payload.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
