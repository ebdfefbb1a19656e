//! The durable saga record.

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentIntentId, ReservationId};
use serde::{Deserialize, Serialize};

/// Where the saga currently is.
///
/// Coarser than [`domain::OrderStatus`] on purpose: the step cursor is
/// what `resume` dispatches on, while the order status carries the
/// externally visible detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaStep {
    /// Reserving inventory.
    #[default]
    Reserve,

    /// Creating the payment intent / awaiting its outcome.
    Pay,

    /// Releasing the hold and refunding if needed.
    Compensate,

    /// Refunding a confirmed order.
    Refund,

    /// Terminal; nothing left to drive.
    Finished,
}

impl SagaStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStep::Reserve => "reserve",
            SagaStep::Pay => "pay",
            SagaStep::Compensate => "compensate",
            SagaStep::Refund => "refund",
            SagaStep::Finished => "finished",
        }
    }
}

impl std::fmt::Display for SagaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The orchestrator's durable memory for one order (1:1 with the order).
///
/// Holds the step cursor, the per-step idempotency keys, and the outcomes
/// recorded so far, so a restarted process resumes without replaying
/// completed side-effecting steps. Archived, never deleted, once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaInstance {
    pub order_id: OrderId,
    pub step: SagaStep,

    /// Idempotency key for the reserve call.
    pub reserve_key: String,
    /// Idempotency key for the payment initiation call.
    pub payment_key: String,

    /// Recorded outcome of the reserve step.
    pub reservation_id: Option<ReservationId>,
    /// Recorded outcome of the payment step.
    pub payment_intent_id: Option<PaymentIntentId>,

    /// Attempt batches spent on the reserve step (across restarts).
    pub reserve_attempts: u32,
    /// Attempt batches spent on the payment step (across restarts).
    pub payment_attempts: u32,

    /// Most recent failure, for operators.
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SagaInstance {
    /// Creates the saga record for a new order. The idempotency keys are
    /// derived deterministically from the order id, so a retried step
    /// always presents the same key.
    pub fn new(order_id: OrderId) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            step: SagaStep::Reserve,
            reserve_key: format!("reserve-{order_id}"),
            payment_key: format!("pay-{order_id}"),
            reservation_id: None,
            payment_intent_id: None,
            reserve_attempts: 0,
            payment_attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the cursor.
    pub fn advance(&mut self, step: SagaStep) {
        self.step = step;
        self.updated_at = Utc::now();
    }

    /// Records the reservation produced by the reserve step.
    pub fn record_reservation(&mut self, id: ReservationId) {
        self.reservation_id = Some(id);
        self.updated_at = Utc::now();
    }

    /// Records the intent produced by the payment step.
    pub fn record_intent(&mut self, id: PaymentIntentId) {
        self.payment_intent_id = Some(id);
        self.updated_at = Utc::now();
    }

    /// Records a failure for observability.
    pub fn note_error(&mut self, error: impl std::fmt::Display) {
        self.last_error = Some(error.to_string());
        self.updated_at = Utc::now();
    }
}
