//! Order and payment state machines.

use serde::{Deserialize, Serialize};

/// The state of an order in its checkout lifecycle.
///
/// State transitions (terminal states marked with `*`):
/// ```text
/// Created ──► Reserving ──► Reserved ──► PaymentPending ──► Confirmed* ──► Refunding ──► Refunded*
///                 │             │              │
///                 ▼             └──────┬───────┘
///              Failed*                 ▼
///                               Compensating ──► Cancelled*
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order record exists, nothing reserved yet.
    #[default]
    Created,

    /// Inventory reservation is in flight.
    Reserving,

    /// Inventory is held, payment not yet initiated.
    Reserved,

    /// Payment intent created, awaiting the gateway outcome.
    PaymentPending,

    /// Payment succeeded and the reservation was committed (terminal).
    Confirmed,

    /// Compensation (reservation release, refund) is in flight.
    Compensating,

    /// Order was cancelled and compensated (terminal).
    Cancelled,

    /// Reservation could not be satisfied; no payment was attempted (terminal).
    Failed,

    /// Post-confirmation refund is in flight.
    Refunding,

    /// Order was refunded after confirmation (terminal).
    Refunded,
}

impl OrderStatus {
    /// Returns true if the status machine allows moving to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, Reserving)
                | (Created, Compensating)
                | (Reserving, Reserved)
                | (Reserving, Failed)
                | (Reserving, Compensating)
                | (Reserved, PaymentPending)
                | (Reserved, Compensating)
                | (PaymentPending, Confirmed)
                | (PaymentPending, Compensating)
                | (Compensating, Cancelled)
                | (Confirmed, Refunding)
                | (Refunding, Refunded)
        )
    }

    /// Returns true if an explicit cancel request is still valid.
    ///
    /// Once Confirmed, cancellation must go through the refund path.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::Created
                | OrderStatus::Reserving
                | OrderStatus::Reserved
                | OrderStatus::PaymentPending
        )
    }

    /// Returns true if a refund request is valid.
    pub fn can_refund(&self) -> bool {
        matches!(self, OrderStatus::Confirmed)
    }

    /// Returns true if this is a terminal state (the saga is finished).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed
                | OrderStatus::Cancelled
                | OrderStatus::Failed
                | OrderStatus::Refunded
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "Created",
            OrderStatus::Reserving => "Reserving",
            OrderStatus::Reserved => "Reserved",
            OrderStatus::PaymentPending => "PaymentPending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Compensating => "Compensating",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Failed => "Failed",
            OrderStatus::Refunding => "Refunding",
            OrderStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment status tracked on the order, mirrored from the payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    /// No payment attempted yet, or intent still pending.
    #[default]
    Pending,

    /// Gateway authorized the charge.
    Authorized,

    /// Gateway captured the funds.
    Captured,

    /// Gateway declined or the attempt timed out.
    Failed,

    /// A captured payment was refunded.
    Refunded,
}

impl PaymentStatus {
    /// Returns true if money has moved and would need refunding.
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Authorized | PaymentStatus::Captured)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Authorized => "Authorized",
            PaymentStatus::Captured => "Captured",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
