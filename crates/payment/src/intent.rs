//! Payment intent records and outcomes.

use chrono::{DateTime, Utc};
use common::{Currency, Money, OrderId, PaymentIntentId};
use domain::PaymentMethod;
use serde::{Deserialize, Serialize};

/// Lifecycle of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IntentStatus {
    /// Created, awaiting the gateway outcome.
    #[default]
    Pending,

    /// Gateway authorized the charge.
    Authorized,

    /// Gateway captured the funds.
    Captured,

    /// Gateway declined the charge.
    Failed,

    /// A settled charge was refunded.
    Refunded,
}

impl IntentStatus {
    /// Returns true if the gateway has given a final answer.
    pub fn is_settled(&self) -> bool {
        !matches!(self, IntentStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "Pending",
            IntentStatus::Authorized => "Authorized",
            IntentStatus::Captured => "Captured",
            IntentStatus::Failed => "Failed",
            IntentStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The closed set of payment outcomes the orchestrator acts on.
///
/// Both delivery paths - a synchronous gateway answer and an asynchronous
/// webhook - reduce to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentOutcome {
    Authorized,
    Captured,
    Failed,
}

impl PaymentOutcome {
    /// Returns true if the charge succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, PaymentOutcome::Authorized | PaymentOutcome::Captured)
    }
}

impl From<PaymentOutcome> for IntentStatus {
    fn from(outcome: PaymentOutcome) -> Self {
        match outcome {
            PaymentOutcome::Authorized => IntentStatus::Authorized,
            PaymentOutcome::Captured => IntentStatus::Captured,
            PaymentOutcome::Failed => IntentStatus::Failed,
        }
    }
}

impl IntentStatus {
    /// The outcome a settled status corresponds to, if any.
    pub fn as_outcome(&self) -> Option<PaymentOutcome> {
        match self {
            IntentStatus::Authorized => Some(PaymentOutcome::Authorized),
            IntentStatus::Captured => Some(PaymentOutcome::Captured),
            IntentStatus::Failed => Some(PaymentOutcome::Failed),
            IntentStatus::Pending | IntentStatus::Refunded => None,
        }
    }
}

/// A payment intent.
///
/// The idempotency key is derived deterministically from the order id, so
/// a retried initiation call finds this record instead of creating a
/// second charge attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: PaymentIntentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub status: IntentStatus,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl PaymentIntent {
    /// Creates a new Pending intent.
    pub fn new(
        order_id: OrderId,
        amount: Money,
        currency: Currency,
        method: PaymentMethod,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            id: PaymentIntentId::new(),
            order_id,
            amount,
            currency,
            method,
            status: IntentStatus::Pending,
            idempotency_key: idempotency_key.into(),
            created_at: Utc::now(),
        }
    }
}
