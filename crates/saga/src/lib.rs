//! Checkout saga orchestration.
//!
//! The orchestrator drives an order through reservation → payment →
//! confirmation, compensating (release, refund) on failure. Every
//! transition is persisted atomically with the outbox events it emits, and
//! every outbound call is idempotent and retried with bounded backoff, so
//! a crashed saga resumes from its durable cursor instead of replaying
//! side effects.
//!
//! Work for a single order is serialized through a per-order lock; sagas
//! for different orders run concurrently without coordination.

pub mod cart;
pub mod error;
pub mod instance;
pub mod locks;
pub mod orchestrator;
pub mod retry;
pub mod store;

pub use cart::{CartSource, InMemoryCartSource};
pub use error::CheckoutError;
pub use instance::{SagaInstance, SagaStep};
pub use locks::OrderLocks;
pub use orchestrator::{CheckoutOrchestrator, CheckoutRequest, CheckoutStarted, SagaConfig};
pub use retry::{RetryError, RetryPolicy};
pub use store::{InMemorySagaStore, SagaStore, SagaStoreError};
