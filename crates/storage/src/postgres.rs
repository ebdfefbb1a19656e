//! The PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    Currency, EventId, Money, OrderId, PaymentIntentId, ReservationId,
};
use domain::{Order, PaymentMethod};
use inventory::{
    InventoryError, InventoryRecord, InventoryStore, Reservation, ReservationLine,
    ReservationState, VariantKey,
};
use outbox::{EventKind, OutboxError, OutboxEvent, OutboxStore, PublishStatus};
use payment::{IntentStatus, PaymentError, PaymentIntent, PaymentIntentStore};
use saga::{SagaInstance, SagaStore, SagaStoreError};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Terminal order statuses, excluded from resumption scans.
const TERMINAL_STATUSES: [&str; 4] = ["Confirmed", "Cancelled", "Failed", "Refunded"];

/// PostgreSQL-backed store for every durable record in the engine.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

fn saga_db_err(e: sqlx::Error) -> SagaStoreError {
    SagaStoreError::Backend(e.to_string())
}

fn inventory_db_err(e: sqlx::Error) -> InventoryError {
    InventoryError::Store(e.to_string())
}

fn payment_db_err(e: sqlx::Error) -> PaymentError {
    PaymentError::Store(e.to_string())
}

fn outbox_db_err(e: sqlx::Error) -> OutboxError {
    OutboxError::Store(e.to_string())
}

fn parse_reservation_state(s: &str) -> Result<ReservationState, InventoryError> {
    match s {
        "Held" => Ok(ReservationState::Held),
        "Committed" => Ok(ReservationState::Committed),
        "Released" => Ok(ReservationState::Released),
        other => Err(InventoryError::Store(format!(
            "unknown reservation state: {other}"
        ))),
    }
}

fn parse_intent_status(s: &str) -> Result<IntentStatus, PaymentError> {
    match s {
        "Pending" => Ok(IntentStatus::Pending),
        "Authorized" => Ok(IntentStatus::Authorized),
        "Captured" => Ok(IntentStatus::Captured),
        "Failed" => Ok(IntentStatus::Failed),
        "Refunded" => Ok(IntentStatus::Refunded),
        other => Err(PaymentError::Store(format!(
            "unknown intent status: {other}"
        ))),
    }
}

fn row_to_reservation(row: PgRow) -> Result<Reservation, InventoryError> {
    let lines: serde_json::Value = row.try_get("lines").map_err(inventory_db_err)?;
    let lines: Vec<ReservationLine> =
        serde_json::from_value(lines).map_err(|e| InventoryError::Store(e.to_string()))?;
    let state: String = row.try_get("state").map_err(inventory_db_err)?;

    Ok(Reservation {
        id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id").map_err(inventory_db_err)?),
        order_id: OrderId::from_uuid(
            row.try_get::<Uuid, _>("order_id").map_err(inventory_db_err)?,
        ),
        lines,
        state: parse_reservation_state(&state)?,
        idempotency_key: row.try_get("idempotency_key").map_err(inventory_db_err)?,
        expires_at: row.try_get("expires_at").map_err(inventory_db_err)?,
        created_at: row.try_get("created_at").map_err(inventory_db_err)?,
    })
}

fn row_to_intent(row: PgRow) -> Result<PaymentIntent, PaymentError> {
    let currency: String = row.try_get("currency").map_err(payment_db_err)?;
    let method: String = row.try_get("method").map_err(payment_db_err)?;
    let status: String = row.try_get("status").map_err(payment_db_err)?;

    Ok(PaymentIntent {
        id: PaymentIntentId::from_uuid(row.try_get::<Uuid, _>("id").map_err(payment_db_err)?),
        order_id: OrderId::from_uuid(
            row.try_get::<Uuid, _>("order_id").map_err(payment_db_err)?,
        ),
        amount: Money::from_cents(row.try_get("amount_cents").map_err(payment_db_err)?),
        currency: currency
            .parse::<Currency>()
            .map_err(PaymentError::Store)?,
        method: method.parse::<PaymentMethod>().map_err(PaymentError::Store)?,
        status: parse_intent_status(&status)?,
        idempotency_key: row.try_get("idempotency_key").map_err(payment_db_err)?,
        created_at: row.try_get("created_at").map_err(payment_db_err)?,
    })
}

fn row_to_outbox_event(row: PgRow) -> Result<OutboxEvent, OutboxError> {
    let event_type: String = row.try_get("event_type").map_err(outbox_db_err)?;
    let status: String = row.try_get("status").map_err(outbox_db_err)?;

    Ok(OutboxEvent {
        id: EventId::from_uuid(row.try_get::<Uuid, _>("id").map_err(outbox_db_err)?),
        kind: event_type
            .parse::<EventKind>()
            .map_err(OutboxError::Store)?,
        payload: row.try_get("payload").map_err(outbox_db_err)?,
        status: match status.as_str() {
            "Pending" => PublishStatus::Pending,
            "Published" => PublishStatus::Published,
            other => {
                return Err(OutboxError::Store(format!(
                    "unknown publish status: {other}"
                )));
            }
        },
        created_at: row.try_get("created_at").map_err(outbox_db_err)?,
    })
}

#[async_trait]
impl SagaStore for PostgresStore {
    async fn persist(
        &self,
        order: &Order,
        saga: &SagaInstance,
        events: Vec<OutboxEvent>,
    ) -> Result<(), SagaStoreError> {
        let order_record = serde_json::to_value(order)?;
        let saga_record = serde_json::to_value(saga)?;

        let mut tx = self.pool.begin().await.map_err(saga_db_err)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, status, record, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (id) DO UPDATE
                SET status = EXCLUDED.status, record = EXCLUDED.record, updated_at = now()
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(&order_record)
        .execute(&mut *tx)
        .await
        .map_err(saga_db_err)?;

        sqlx::query(
            r#"
            INSERT INTO sagas (order_id, record, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (order_id) DO UPDATE
                SET record = EXCLUDED.record, updated_at = now()
            "#,
        )
        .bind(saga.order_id.as_uuid())
        .bind(&saga_record)
        .execute(&mut *tx)
        .await
        .map_err(saga_db_err)?;

        for event in &events {
            sqlx::query(
                r#"
                INSERT INTO outbox_events (id, event_type, payload, status, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(event.id.as_uuid())
            .bind(event.kind.as_str())
            .bind(&event.payload)
            .bind(event.status.as_str())
            .bind(event.created_at)
            .execute(&mut *tx)
            .await
            .map_err(saga_db_err)?;
        }

        tx.commit().await.map_err(saga_db_err)
    }

    async fn load(
        &self,
        order_id: OrderId,
    ) -> Result<Option<(Order, SagaInstance)>, SagaStoreError> {
        let order_row = sqlx::query("SELECT record FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(saga_db_err)?;
        let Some(order_row) = order_row else {
            return Ok(None);
        };

        let saga_row = sqlx::query("SELECT record FROM sagas WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(saga_db_err)?;
        let Some(saga_row) = saga_row else {
            return Err(SagaStoreError::Backend(format!(
                "order {order_id} has no saga record"
            )));
        };

        let order_record: serde_json::Value =
            order_row.try_get("record").map_err(saga_db_err)?;
        let saga_record: serde_json::Value = saga_row.try_get("record").map_err(saga_db_err)?;

        let order: Order = serde_json::from_value(order_record)?;
        let saga: SagaInstance = serde_json::from_value(saga_record)?;
        Ok(Some((order, saga)))
    }

    async fn incomplete(&self) -> Result<Vec<OrderId>, SagaStoreError> {
        let rows = sqlx::query("SELECT id FROM orders WHERE status <> ALL($1) ORDER BY updated_at")
            .bind(
                TERMINAL_STATUSES
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>(),
            )
            .fetch_all(&self.pool)
            .await
            .map_err(saga_db_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(OrderId::from_uuid(
                    row.try_get::<Uuid, _>("id").map_err(saga_db_err)?,
                ))
            })
            .collect()
    }
}

#[async_trait]
impl OutboxStore for PostgresStore {
    async fn enqueue(&self, events: Vec<OutboxEvent>) -> Result<(), OutboxError> {
        let mut tx = self.pool.begin().await.map_err(outbox_db_err)?;
        for event in &events {
            sqlx::query(
                r#"
                INSERT INTO outbox_events (id, event_type, payload, status, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(event.id.as_uuid())
            .bind(event.kind.as_str())
            .bind(&event.payload)
            .bind(event.status.as_str())
            .bind(event.created_at)
            .execute(&mut *tx)
            .await
            .map_err(outbox_db_err)?;
        }
        tx.commit().await.map_err(outbox_db_err)
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>, OutboxError> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, payload, status, created_at
            FROM outbox_events
            WHERE status = 'Pending'
            ORDER BY created_at
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(outbox_db_err)?;

        rows.into_iter().map(row_to_outbox_event).collect()
    }

    async fn mark_published(&self, ids: &[EventId]) -> Result<(), OutboxError> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        sqlx::query("UPDATE outbox_events SET status = 'Published' WHERE id = ANY($1)")
            .bind(&uuids)
            .execute(&self.pool)
            .await
            .map_err(outbox_db_err)?;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn set_stock(&self, key: &VariantKey, stock: u32) -> Result<(), InventoryError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_records (product_id, variant_id, stock_count, reserved_count)
            VALUES ($1, $2, $3, 0)
            ON CONFLICT (product_id, variant_id) DO UPDATE
                SET stock_count = EXCLUDED.stock_count
            "#,
        )
        .bind(key.product_id.as_str())
        .bind(key.variant_id.as_str())
        .bind(stock as i64)
        .execute(&self.pool)
        .await
        .map_err(inventory_db_err)?;
        Ok(())
    }

    async fn record(&self, key: &VariantKey) -> Result<Option<InventoryRecord>, InventoryError> {
        let row = sqlx::query(
            r#"
            SELECT stock_count, reserved_count
            FROM inventory_records
            WHERE product_id = $1 AND variant_id = $2
            "#,
        )
        .bind(key.product_id.as_str())
        .bind(key.variant_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(inventory_db_err)?;

        row.map(|row| {
            Ok(InventoryRecord {
                stock_count: row.try_get::<i64, _>("stock_count").map_err(inventory_db_err)?
                    as u32,
                reserved_count: row
                    .try_get::<i64, _>("reserved_count")
                    .map_err(inventory_db_err)? as u32,
            })
        })
        .transpose()
    }

    async fn try_reserve(&self, key: &VariantKey, quantity: u32) -> Result<bool, InventoryError> {
        // The guarded UPDATE is the atomic check-and-increment: the row
        // lock serializes writers per key, and the predicate rejects any
        // reservation that would exceed availability.
        let result = sqlx::query(
            r#"
            UPDATE inventory_records
            SET reserved_count = reserved_count + $3
            WHERE product_id = $1
              AND variant_id = $2
              AND stock_count - reserved_count >= $3
            "#,
        )
        .bind(key.product_id.as_str())
        .bind(key.variant_id.as_str())
        .bind(quantity as i64)
        .execute(&self.pool)
        .await
        .map_err(inventory_db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_quantity(&self, key: &VariantKey, quantity: u32) -> Result<(), InventoryError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_records
            SET reserved_count = reserved_count - $3
            WHERE product_id = $1 AND variant_id = $2 AND reserved_count >= $3
            "#,
        )
        .bind(key.product_id.as_str())
        .bind(key.variant_id.as_str())
        .bind(quantity as i64)
        .execute(&self.pool)
        .await
        .map_err(inventory_db_err)?;

        if result.rows_affected() == 0 {
            return Err(InventoryError::Store(format!(
                "release of {quantity} from {key} found no matching record"
            )));
        }
        Ok(())
    }

    async fn commit_quantity(&self, key: &VariantKey, quantity: u32) -> Result<(), InventoryError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_records
            SET stock_count = stock_count - $3, reserved_count = reserved_count - $3
            WHERE product_id = $1 AND variant_id = $2 AND reserved_count >= $3
            "#,
        )
        .bind(key.product_id.as_str())
        .bind(key.variant_id.as_str())
        .bind(quantity as i64)
        .execute(&self.pool)
        .await
        .map_err(inventory_db_err)?;

        if result.rows_affected() == 0 {
            return Err(InventoryError::Store(format!(
                "commit of {quantity} from {key} found no matching record"
            )));
        }
        Ok(())
    }

    async fn insert_reservation(&self, reservation: &Reservation) -> Result<(), InventoryError> {
        let lines = serde_json::to_value(&reservation.lines)
            .map_err(|e| InventoryError::Store(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO reservations (id, order_id, idempotency_key, state, lines, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.order_id.as_uuid())
        .bind(&reservation.idempotency_key)
        .bind(reservation.state.as_str())
        .bind(&lines)
        .bind(reservation.expires_at)
        .bind(reservation.created_at)
        .execute(&self.pool)
        .await
        .map_err(inventory_db_err)?;
        Ok(())
    }

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, InventoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, idempotency_key, state, lines, expires_at, created_at
            FROM reservations
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(inventory_db_err)?;

        row.map(row_to_reservation).transpose()
    }

    async fn reservation_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Reservation>, InventoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, idempotency_key, state, lines, expires_at, created_at
            FROM reservations
            WHERE idempotency_key = $1
            "#,
        )
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(inventory_db_err)?;

        row.map(row_to_reservation).transpose()
    }

    async fn transition_reservation(
        &self,
        id: ReservationId,
        from: ReservationState,
        to: ReservationState,
    ) -> Result<bool, InventoryError> {
        let result = sqlx::query("UPDATE reservations SET state = $3 WHERE id = $1 AND state = $2")
            .bind(id.as_uuid())
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await
            .map_err(inventory_db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn expired_reservations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, idempotency_key, state, lines, expires_at, created_at
            FROM reservations
            WHERE state = 'Held' AND expires_at < $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(inventory_db_err)?;

        rows.into_iter().map(row_to_reservation).collect()
    }
}

#[async_trait]
impl PaymentIntentStore for PostgresStore {
    async fn insert(&self, intent: &PaymentIntent) -> Result<(), PaymentError> {
        sqlx::query(
            r#"
            INSERT INTO payment_intents
                (id, order_id, idempotency_key, amount_cents, currency, method, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(intent.id.as_uuid())
        .bind(intent.order_id.as_uuid())
        .bind(&intent.idempotency_key)
        .bind(intent.amount.cents())
        .bind(intent.currency.as_str())
        .bind(intent.method.as_str())
        .bind(intent.status.as_str())
        .bind(intent.created_at)
        .execute(&self.pool)
        .await
        .map_err(payment_db_err)?;
        Ok(())
    }

    async fn get(&self, id: PaymentIntentId) -> Result<Option<PaymentIntent>, PaymentError> {
        let row = sqlx::query("SELECT * FROM payment_intents WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(payment_db_err)?;

        row.map(row_to_intent).transpose()
    }

    async fn get_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<PaymentIntent>, PaymentError> {
        let row = sqlx::query("SELECT * FROM payment_intents WHERE idempotency_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(payment_db_err)?;

        row.map(row_to_intent).transpose()
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<PaymentIntent>, PaymentError> {
        let row = sqlx::query("SELECT * FROM payment_intents WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(payment_db_err)?;

        row.map(row_to_intent).transpose()
    }

    async fn set_status(
        &self,
        id: PaymentIntentId,
        status: IntentStatus,
    ) -> Result<(), PaymentError> {
        sqlx::query("UPDATE payment_intents SET status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(payment_db_err)?;
        Ok(())
    }
}
