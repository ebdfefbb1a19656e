//! Inventory storage trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ReservationId;
use tokio::sync::{Mutex, RwLock};

use crate::error::{InventoryError, Result};
use crate::record::{InventoryRecord, VariantKey};
use crate::reservation::{Reservation, ReservationState};

/// Storage for inventory counters and reservations.
///
/// Counter mutations are atomic per [`VariantKey`]: `try_reserve` checks
/// availability and increments the reserved counter as one step, which is
/// what makes hard reservation safe under concurrent checkouts. How the
/// atomicity is achieved is up to the backend (a per-key mutex in memory, a
/// guarded `UPDATE` in Postgres).
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Creates or replaces the stock level for a key. Reserved count is
    /// preserved when the record already exists.
    async fn set_stock(&self, key: &VariantKey, stock: u32) -> Result<()>;

    /// Reads the counters for a key.
    async fn record(&self, key: &VariantKey) -> Result<Option<InventoryRecord>>;

    /// Atomically holds `quantity` units if available. Returns false (and
    /// mutates nothing) when availability is insufficient or the key is
    /// unknown.
    async fn try_reserve(&self, key: &VariantKey, quantity: u32) -> Result<bool>;

    /// Returns `quantity` held units to availability.
    async fn release_quantity(&self, key: &VariantKey, quantity: u32) -> Result<()>;

    /// Converts `quantity` held units into a sale (both counters drop).
    async fn commit_quantity(&self, key: &VariantKey, quantity: u32) -> Result<()>;

    /// Persists a new reservation row.
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()>;

    /// Loads a reservation by id.
    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>>;

    /// Loads a reservation by its idempotency key.
    async fn reservation_by_key(&self, idempotency_key: &str) -> Result<Option<Reservation>>;

    /// Compare-and-swap on reservation state. Returns false when the
    /// reservation was not in `from` (someone else won the race).
    async fn transition_reservation(
        &self,
        id: ReservationId,
        from: ReservationState,
        to: ReservationState,
    ) -> Result<bool>;

    /// Held reservations whose expiry has passed.
    async fn expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>>;
}

#[derive(Default)]
struct ReservationTable {
    by_id: HashMap<ReservationId, Reservation>,
    by_idempotency_key: HashMap<String, ReservationId>,
}

/// In-memory inventory store.
///
/// Counters live behind one mutex per key so contention on a hot variant
/// never blocks reservations of unrelated variants.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    records: Arc<RwLock<HashMap<VariantKey, Arc<Mutex<InventoryRecord>>>>>,
    reservations: Arc<RwLock<ReservationTable>>,
}

impl InMemoryInventoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn key_cell(&self, key: &VariantKey) -> Option<Arc<Mutex<InventoryRecord>>> {
        self.records.read().await.get(key).cloned()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn set_stock(&self, key: &VariantKey, stock: u32) -> Result<()> {
        let mut records = self.records.write().await;
        match records.get(key) {
            Some(cell) => {
                let mut record = cell.lock().await;
                record.stock_count = stock;
            }
            None => {
                records.insert(
                    key.clone(),
                    Arc::new(Mutex::new(InventoryRecord {
                        stock_count: stock,
                        reserved_count: 0,
                    })),
                );
            }
        }
        Ok(())
    }

    async fn record(&self, key: &VariantKey) -> Result<Option<InventoryRecord>> {
        match self.key_cell(key).await {
            Some(cell) => Ok(Some(*cell.lock().await)),
            None => Ok(None),
        }
    }

    async fn try_reserve(&self, key: &VariantKey, quantity: u32) -> Result<bool> {
        match self.key_cell(key).await {
            Some(cell) => {
                let mut record = cell.lock().await;
                Ok(record.try_hold(quantity))
            }
            None => Ok(false),
        }
    }

    async fn release_quantity(&self, key: &VariantKey, quantity: u32) -> Result<()> {
        let cell = self
            .key_cell(key)
            .await
            .ok_or_else(|| InventoryError::Store(format!("no record for {key}")))?;
        let mut record = cell.lock().await;
        record.release(quantity);
        Ok(())
    }

    async fn commit_quantity(&self, key: &VariantKey, quantity: u32) -> Result<()> {
        let cell = self
            .key_cell(key)
            .await
            .ok_or_else(|| InventoryError::Store(format!("no record for {key}")))?;
        let mut record = cell.lock().await;
        record.commit(quantity);
        Ok(())
    }

    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()> {
        let mut table = self.reservations.write().await;
        table
            .by_idempotency_key
            .insert(reservation.idempotency_key.clone(), reservation.id);
        table.by_id.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        Ok(self.reservations.read().await.by_id.get(&id).cloned())
    }

    async fn reservation_by_key(&self, idempotency_key: &str) -> Result<Option<Reservation>> {
        let table = self.reservations.read().await;
        Ok(table
            .by_idempotency_key
            .get(idempotency_key)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn transition_reservation(
        &self,
        id: ReservationId,
        from: ReservationState,
        to: ReservationState,
    ) -> Result<bool> {
        let mut table = self.reservations.write().await;
        let reservation = table
            .by_id
            .get_mut(&id)
            .ok_or(InventoryError::UnknownReservation(id))?;
        if reservation.state != from {
            return Ok(false);
        }
        reservation.state = to;
        Ok(true)
    }

    async fn expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        Ok(self
            .reservations
            .read()
            .await
            .by_id
            .values()
            .filter(|r| r.is_expired(now))
            .cloned()
            .collect())
    }
}
