//! The outbox drain loop.

use std::time::Duration;

use crate::bus::EventBus;
use crate::error::Result;
use crate::store::OutboxStore;

/// How many rows one drain pass picks up.
const DRAIN_BATCH_SIZE: usize = 100;

/// Publishes Pending outbox rows to the event bus.
///
/// Rows are marked Published only after the bus acknowledges, so a crash
/// or bus failure re-delivers on the next pass - at-least-once, never
/// silently dropped.
pub struct OutboxPublisher<S, B> {
    store: S,
    bus: B,
    interval: Duration,
}

impl<S: OutboxStore, B: EventBus> OutboxPublisher<S, B> {
    /// Creates a publisher draining every `interval`.
    pub fn new(store: S, bus: B, interval: Duration) -> Self {
        Self {
            store,
            bus,
            interval,
        }
    }

    /// Runs one drain pass. Returns the number of events published.
    ///
    /// A publish failure stops the pass; everything already acknowledged
    /// stays marked and the rest is retried next tick.
    #[tracing::instrument(skip(self))]
    pub async fn drain_once(&self) -> Result<usize> {
        let pending = self.store.fetch_pending(DRAIN_BATCH_SIZE).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut published = Vec::with_capacity(pending.len());
        for event in &pending {
            match self.bus.publish(event).await {
                Ok(()) => published.push(event.id),
                Err(e) => {
                    tracing::warn!(event_id = %event.id, kind = %event.kind, error = %e, "publish failed, will retry");
                    break;
                }
            }
        }

        if !published.is_empty() {
            self.store.mark_published(&published).await?;
            metrics::counter!("outbox_events_published").increment(published.len() as u64);
        }

        Ok(published.len())
    }

    /// Runs the drain loop until the task is dropped.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.drain_once().await {
                tracing::error!(error = %e, "outbox drain failed");
            }
        }
    }
}
