//! Inventory error types.

use common::ReservationId;
use thiserror::Error;

use crate::record::VariantKey;

/// Errors that can occur during inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Not enough available stock for one of the requested lines.
    #[error("Insufficient stock for {key}")]
    InsufficientStock { key: VariantKey },

    /// No reservation exists with the given ID.
    #[error("Unknown reservation: {0}")]
    UnknownReservation(ReservationId),

    /// The reservation was released (expired or compensated) before commit.
    #[error("Reservation {0} already released")]
    ReservationExpired(ReservationId),

    /// The backing service could not be reached; safe to retry.
    #[error("Inventory unavailable: {0}")]
    Unavailable(String),

    /// Storage failure.
    #[error("Inventory store error: {0}")]
    Store(String),
}

impl InventoryError {
    /// Returns true if the operation may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InventoryError::Unavailable(_) | InventoryError::Store(_)
        )
    }
}

/// Convenience alias for inventory results.
pub type Result<T> = std::result::Result<T, InventoryError>;
