//! Cart snapshot and checkout inputs.

use chrono::{DateTime, Duration, Utc};
use common::{CartId, Money, ProductId, VariantId};
use serde::{Deserialize, Serialize};

use crate::order::OrderError;

/// A single line in a cart snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: u32,
    /// Price per unit at the time the snapshot was taken.
    pub unit_price: Money,
}

/// Read-only view of a cart, taken once at checkout start.
///
/// Prices in the snapshot are what the order will charge; the snapshot is
/// rejected if it has gone stale before checkout begins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub cart_id: CartId,
    pub items: Vec<CartItem>,
    /// When the cart source produced this snapshot.
    pub taken_at: DateTime<Utc>,
}

impl CartSnapshot {
    /// Validates the snapshot against checkout preconditions.
    pub fn validate(&self, now: DateTime<Utc>, freshness: Duration) -> Result<(), OrderError> {
        if self.items.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        if now - self.taken_at > freshness {
            return Err(OrderError::StaleCart {
                taken_at: self.taken_at,
            });
        }
        for item in &self.items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id.to_string(),
                });
            }
            if !item.unit_price.is_positive() {
                return Err(OrderError::InvalidPrice {
                    product_id: item.product_id.to_string(),
                    price: item.unit_price.cents(),
                });
            }
        }
        Ok(())
    }
}

/// Shipping destination captured on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// How the customer intends to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Wallet,
    BankTransfer,
}

impl PaymentMethod {
    /// Returns the wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(PaymentMethod::Card),
            "wallet" => Ok(PaymentMethod::Wallet),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}
