//! Inventory reservation engine.
//!
//! Stock is held with hard reservations: availability is checked and the
//! reserved counter incremented atomically per (product, variant) key
//! before a reservation is ever returned, so concurrent checkouts cannot
//! oversell. Reservations expire; a background sweeper releases holds the
//! orchestrator never committed or released.

pub mod engine;
pub mod error;
pub mod record;
pub mod reservation;
pub mod store;
pub mod sweeper;

pub use engine::{InventoryEngine, ReservationService};
pub use error::InventoryError;
pub use record::{InventoryRecord, VariantKey};
pub use reservation::{Reservation, ReservationLine, ReservationState};
pub use store::{InMemoryInventoryStore, InventoryStore};
pub use sweeper::ReservationSweeper;
