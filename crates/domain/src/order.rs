//! The durable order record.

use chrono::{DateTime, Utc};
use common::{Currency, Money, OrderId, ProductId, UserId, VariantId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::{CartSnapshot, PaymentMethod, ShippingAddress};
use crate::status::{OrderStatus, PaymentStatus};

/// Errors that can occur when creating or transitioning an order.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The cart snapshot has no items.
    #[error("Cart is empty")]
    EmptyCart,

    /// The cart snapshot is older than the freshness window.
    #[error("Cart snapshot taken at {taken_at} is stale")]
    StaleCart { taken_at: DateTime<Utc> },

    /// A line item has zero quantity.
    #[error("Invalid quantity for {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: String },

    /// A line item has a non-positive unit price.
    #[error("Invalid price {price} for {product_id} (must be greater than 0)")]
    InvalidPrice { product_id: String, price: i64 },

    /// The status machine does not allow the requested transition.
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

/// A line item on an order, with the unit price snapshotted at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl LineItem {
    /// Returns the total price for this line (quantity * unit price).
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// A customer order.
///
/// The total is fixed at creation from the cart snapshot and never
/// recomputed, so a mid-flight catalog price change cannot alter what the
/// customer is charged. Status only moves through [`Order::transition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    items: Vec<LineItem>,
    total: Money,
    currency: Currency,
    status: OrderStatus,
    payment_status: PaymentStatus,
    payment_method: PaymentMethod,
    shipping_address: ShippingAddress,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new order from a validated cart snapshot.
    ///
    /// Callers validate the snapshot first; this only fixes the prices.
    pub fn from_snapshot(
        id: OrderId,
        user_id: UserId,
        snapshot: &CartSnapshot,
        currency: Currency,
        payment_method: PaymentMethod,
        shipping_address: ShippingAddress,
    ) -> Self {
        let items: Vec<LineItem> = snapshot
            .items
            .iter()
            .map(|i| LineItem {
                product_id: i.product_id.clone(),
                variant_id: i.variant_id.clone(),
                quantity: i.quantity,
                unit_price: i.unit_price,
            })
            .collect();
        let total = items.iter().map(LineItem::total_price).sum();
        let now = Utc::now();

        Self {
            id,
            user_id,
            items,
            total,
            currency,
            status: OrderStatus::Created,
            payment_status: PaymentStatus::Pending,
            payment_method,
            shipping_address,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the order to `next`, rejecting transitions the machine forbids.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records the payment status mirrored from the intent.
    pub fn set_payment_status(&mut self, status: PaymentStatus) {
        self.payment_status = status;
        self.updated_at = Utc::now();
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn shipping_address(&self) -> &ShippingAddress {
        &self.shipping_address
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
