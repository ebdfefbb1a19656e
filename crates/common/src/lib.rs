//! Shared types used across the checkout engine crates.
//!
//! Every externally visible identifier is a newtype over [`uuid::Uuid`] or
//! a string, so order ids, reservation ids, and payment intent ids cannot
//! be mixed up at compile time.

pub mod ids;
pub mod money;

pub use ids::{
    CartId, EventId, OrderId, PaymentIntentId, ProductId, ReservationId, UserId, VariantId,
};
pub use money::{Currency, Money};
