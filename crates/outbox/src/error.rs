//! Outbox error types.

use thiserror::Error;

/// Errors that can occur while draining the outbox.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// The event bus rejected or dropped a publish.
    #[error("Event bus error: {0}")]
    Bus(String),

    /// Storage failure.
    #[error("Outbox store error: {0}")]
    Store(String),

    /// Serialization error building an event payload.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias for outbox results.
pub type Result<T> = std::result::Result<T, OutboxError>;
