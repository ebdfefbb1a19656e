//! The reservation engine: reserve / commit / release over a store.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::{OrderId, ReservationId};

use crate::error::{InventoryError, Result};
use crate::record::{InventoryRecord, VariantKey};
use crate::reservation::{Reservation, ReservationLine, ReservationState};
use crate::store::InventoryStore;

/// Reservation operations consumed by the saga orchestrator.
#[async_trait]
pub trait ReservationService: Send + Sync {
    /// Holds stock for every line of an order, all-or-nothing.
    ///
    /// A replay with a previously seen `idempotency_key` returns the
    /// existing reservation instead of double-decrementing stock.
    async fn reserve(
        &self,
        order_id: OrderId,
        lines: Vec<ReservationLine>,
        idempotency_key: &str,
    ) -> Result<ReservationId>;

    /// Converts a hold into a sale on order confirmation.
    async fn commit(&self, reservation_id: ReservationId) -> Result<()>;

    /// Returns a hold to availability (compensation).
    async fn release(&self, reservation_id: ReservationId) -> Result<()>;
}

/// Hard-reservation engine over an [`InventoryStore`].
#[derive(Clone)]
pub struct InventoryEngine<S> {
    store: S,
    hold_ttl: Duration,
}

impl<S: InventoryStore> InventoryEngine<S> {
    /// Creates an engine whose holds expire after `hold_ttl`.
    pub fn new(store: S, hold_ttl: Duration) -> Self {
        Self { store, hold_ttl }
    }

    /// Creates or replaces the stock level for a key (stock intake).
    pub async fn set_stock(&self, key: &VariantKey, stock: u32) -> Result<()> {
        self.store.set_stock(key, stock).await
    }

    /// Reads the counters for a key.
    pub async fn availability(&self, key: &VariantKey) -> Result<Option<InventoryRecord>> {
        self.store.record(key).await
    }

    /// Loads a reservation by id.
    pub async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        self.store.reservation(id).await
    }

    /// Releases every Held reservation whose expiry has passed.
    ///
    /// Returns the number of reservations released. Called by the sweeper;
    /// protects against orchestrator crashes that never call release.
    pub async fn expire_due(&self) -> Result<usize> {
        let due = self.store.expired_reservations(Utc::now()).await?;
        let mut released = 0;
        for reservation in due {
            match self.release_held(&reservation).await {
                Ok(true) => {
                    released += 1;
                    metrics::counter!("inventory_reservations_expired").increment(1);
                    tracing::info!(
                        reservation_id = %reservation.id,
                        order_id = %reservation.order_id,
                        "expired reservation released"
                    );
                }
                Ok(false) => {} // lost the race to a commit or explicit release
                Err(e) => {
                    tracing::warn!(reservation_id = %reservation.id, error = %e, "expiry release failed");
                }
            }
        }
        Ok(released)
    }

    /// CAS Held -> Released, then return the held quantities. Returns false
    /// when another transition won.
    async fn release_held(&self, reservation: &Reservation) -> Result<bool> {
        let won = self
            .store
            .transition_reservation(
                reservation.id,
                ReservationState::Held,
                ReservationState::Released,
            )
            .await?;
        if !won {
            return Ok(false);
        }
        for line in &reservation.lines {
            self.store
                .release_quantity(&line.key, line.quantity)
                .await?;
        }
        Ok(true)
    }
}

#[async_trait]
impl<S: InventoryStore> ReservationService for InventoryEngine<S> {
    #[tracing::instrument(skip(self, lines), fields(line_count = lines.len()))]
    async fn reserve(
        &self,
        order_id: OrderId,
        lines: Vec<ReservationLine>,
        idempotency_key: &str,
    ) -> Result<ReservationId> {
        // Idempotent replay: a still-live reservation under this key is the
        // answer. A Released one (expired before the retry landed) is not,
        // and a fresh hold is taken below.
        if let Some(existing) = self.store.reservation_by_key(idempotency_key).await?
            && existing.state != ReservationState::Released
        {
            tracing::debug!(reservation_id = %existing.id, "reserve replayed, returning existing");
            return Ok(existing.id);
        }

        // Greedy hold per line; roll back everything taken so far on the
        // first line that cannot be satisfied.
        let mut held: Vec<&ReservationLine> = Vec::with_capacity(lines.len());
        for line in &lines {
            if self.store.try_reserve(&line.key, line.quantity).await? {
                held.push(line);
            } else {
                for taken in held {
                    self.store
                        .release_quantity(&taken.key, taken.quantity)
                        .await?;
                }
                metrics::counter!("inventory_insufficient_stock").increment(1);
                return Err(InventoryError::InsufficientStock {
                    key: line.key.clone(),
                });
            }
        }

        let reservation = Reservation::new(
            order_id,
            lines,
            idempotency_key,
            Utc::now() + self.hold_ttl,
        );
        self.store.insert_reservation(&reservation).await?;

        metrics::counter!("inventory_reservations_created").increment(1);
        tracing::info!(reservation_id = %reservation.id, "stock reserved");
        Ok(reservation.id)
    }

    #[tracing::instrument(skip(self))]
    async fn commit(&self, reservation_id: ReservationId) -> Result<()> {
        let reservation = self
            .store
            .reservation(reservation_id)
            .await?
            .ok_or(InventoryError::UnknownReservation(reservation_id))?;

        match reservation.state {
            ReservationState::Committed => return Ok(()), // replayed commit
            ReservationState::Released => {
                return Err(InventoryError::ReservationExpired(reservation_id));
            }
            ReservationState::Held => {}
        }

        let won = self
            .store
            .transition_reservation(
                reservation_id,
                ReservationState::Held,
                ReservationState::Committed,
            )
            .await?;
        if !won {
            // The sweeper released this hold between the load and the CAS.
            return Err(InventoryError::ReservationExpired(reservation_id));
        }

        for line in &reservation.lines {
            self.store.commit_quantity(&line.key, line.quantity).await?;
        }

        metrics::counter!("inventory_reservations_committed").increment(1);
        tracing::info!(%reservation_id, "reservation committed");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn release(&self, reservation_id: ReservationId) -> Result<()> {
        let reservation = self
            .store
            .reservation(reservation_id)
            .await?
            .ok_or(InventoryError::UnknownReservation(reservation_id))?;

        match reservation.state {
            // Release is idempotent; the sweeper may have beaten us here.
            ReservationState::Released => return Ok(()),
            // Committed holds are sold stock; a stray release must not
            // corrupt the counters.
            ReservationState::Committed => {
                tracing::warn!(%reservation_id, "release ignored for committed reservation");
                return Ok(());
            }
            ReservationState::Held => {}
        }

        if self.release_held(&reservation).await? {
            metrics::counter!("inventory_reservations_released").increment(1);
            tracing::info!(%reservation_id, "reservation released");
        }
        Ok(())
    }
}
