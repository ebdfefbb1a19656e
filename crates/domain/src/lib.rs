//! Order model for the checkout engine.
//!
//! This crate holds the durable [`Order`] record, the [`OrderStatus`] and
//! [`PaymentStatus`] state machines, and the cart snapshot the checkout
//! starts from. Orders are only mutated by the saga orchestrator through
//! guarded status transitions.

pub mod cart;
pub mod order;
pub mod status;

pub use cart::{CartItem, CartSnapshot, PaymentMethod, ShippingAddress};
pub use order::{LineItem, Order, OrderError};
pub use status::{OrderStatus, PaymentStatus};
