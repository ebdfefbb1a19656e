//! Reservation records.

use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId};
use serde::{Deserialize, Serialize};

use crate::record::VariantKey;

/// One reserved line: a variant key and the quantity held for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationLine {
    pub key: VariantKey,
    pub quantity: u32,
}

/// Lifecycle of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReservationState {
    /// Stock is held against the counters.
    #[default]
    Held,

    /// The hold was converted into a sale on order confirmation.
    Committed,

    /// The hold was returned to availability (compensation or expiry).
    Released,
}

impl ReservationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Held => "Held",
            ReservationState::Committed => "Committed",
            ReservationState::Released => "Released",
        }
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A hold on stock for one order.
///
/// Owned exclusively by the inventory engine; the orchestrator only ever
/// references it by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub order_id: OrderId,
    pub lines: Vec<ReservationLine>,
    pub state: ReservationState,
    /// Replays of the reserve call with this key return the same reservation.
    pub idempotency_key: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Creates a new Held reservation.
    pub fn new(
        order_id: OrderId,
        lines: Vec<ReservationLine>,
        idempotency_key: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            order_id,
            lines,
            state: ReservationState::Held,
            idempotency_key: idempotency_key.into(),
            expires_at,
            created_at: Utc::now(),
        }
    }

    /// Returns true if the hold has outlived its expiry without a commit.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == ReservationState::Held && self.expires_at < now
    }
}
