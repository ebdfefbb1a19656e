//! Payment error types.

use common::PaymentIntentId;
use thiserror::Error;

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The gateway could not be reached or timed out; safe to retry.
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    /// The webhook signature did not match the shared secret.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// The webhook referenced an intent this coordinator never created.
    #[error("Unknown payment intent: {0}")]
    UnknownIntent(PaymentIntentId),

    /// The webhook body could not be parsed.
    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    /// The gateway reported a status outside the known vocabulary.
    #[error("Unrecognized gateway status: {0}")]
    UnrecognizedStatus(String),

    /// Storage failure.
    #[error("Payment store error: {0}")]
    Store(String),
}

impl PaymentError {
    /// Returns true if the operation may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, PaymentError::Unavailable(_) | PaymentError::Store(_))
    }
}

/// Convenience alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;
