//! PostgreSQL-backed implementations of the checkout engine's storage
//! traits.
//!
//! One [`PostgresStore`] implements all of them: the saga store (order +
//! saga + outbox in a single transaction), the outbox store, the inventory
//! store (guarded `UPDATE`s give the per-key atomic counter operations),
//! and the payment intent store.

pub mod postgres;

pub use postgres::PostgresStore;
