//! Background sweeper for expired reservations.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::InventoryEngine;
use crate::store::InventoryStore;

/// Periodically releases Held reservations whose expiry has passed.
///
/// This is the safety net for orchestrator crashes that never reach a
/// commit or release: without it, a crashed checkout would hold stock
/// forever.
pub struct ReservationSweeper<S> {
    engine: Arc<InventoryEngine<S>>,
    interval: Duration,
}

impl<S: InventoryStore + 'static> ReservationSweeper<S> {
    /// Creates a sweeper ticking every `interval`.
    pub fn new(engine: Arc<InventoryEngine<S>>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Runs one sweep. Returns the number of reservations released.
    pub async fn sweep_once(&self) -> usize {
        match self.engine.expire_due().await {
            Ok(released) => released,
            Err(e) => {
                tracing::error!(error = %e, "reservation sweep failed");
                0
            }
        }
    }

    /// Runs the sweep loop until the task is dropped.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick fires immediately; skip it so a fresh process does
        // not sweep before stores are seeded.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let released = self.sweep_once().await;
            if released > 0 {
                tracing::info!(released, "reservation sweep released expired holds");
            }
        }
    }
}
