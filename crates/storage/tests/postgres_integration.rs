//! PostgreSQL integration tests.
//!
//! These tests share one PostgreSQL container and are ignored by default
//! (they need a Docker daemon). Run with:
//!
//! ```bash
//! cargo test -p storage --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{CartId, Currency, Money, OrderId, ProductId, UserId, VariantId};
use domain::{CartItem, CartSnapshot, OrderStatus, PaymentMethod, ShippingAddress};
use inventory::{InventoryEngine, InventoryStore, ReservationService, VariantKey};
use outbox::{OutboxStore, PublishStatus};
use payment::{InMemoryGateway, PaymentCoordinator};
use saga::{
    CheckoutOrchestrator, CheckoutRequest, InMemoryCartSource, RetryPolicy, SagaConfig,
    SagaInstance, SagaStore,
};
use serial_test::serial;
use sqlx::PgPool;
use storage::PostgresStore;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // container must stay alive for all tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{host}:{port}/postgres");

            let pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_checkout_tables.sql"
            ))
            .execute(&pool)
            .await
            .unwrap();
            pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn store() -> PostgresStore {
    let info = get_container_info().await;
    let pool = PgPool::connect(&info.connection_string).await.unwrap();
    PostgresStore::new(pool)
}

fn sample_order() -> domain::Order {
    let snapshot = CartSnapshot {
        cart_id: CartId::new(),
        items: vec![CartItem {
            product_id: ProductId::new("p_pg"),
            variant_id: VariantId::new("v_1"),
            quantity: 2,
            unit_price: Money::from_cents(1000),
        }],
        taken_at: Utc::now(),
    };
    domain::Order::from_snapshot(
        OrderId::new(),
        UserId::new(),
        &snapshot,
        Currency::Usd,
        PaymentMethod::Card,
        ShippingAddress {
            recipient: "A. Customer".to_string(),
            line1: "1 Main St".to_string(),
            line2: None,
            city: "Springfield".to_string(),
            postal_code: "12345".to_string(),
            country: "US".to_string(),
        },
    )
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn persist_and_load_order_with_saga() {
    let store = store().await;
    let mut order = sample_order();
    let mut saga = SagaInstance::new(order.id());

    SagaStore::persist(&store, &order, &saga, vec![]).await.unwrap();

    let (loaded_order, loaded_saga) = store.load(order.id()).await.unwrap().unwrap();
    assert_eq!(loaded_order.id(), order.id());
    assert_eq!(loaded_order.total().cents(), 2000);
    assert_eq!(loaded_saga.order_id, order.id());

    // Upsert: a transition overwrites the stored record.
    order.transition(OrderStatus::Reserving).unwrap();
    saga.note_error("checking upserts");
    SagaStore::persist(&store, &order, &saga, vec![]).await.unwrap();

    let (reloaded, reloaded_saga) = store.load(order.id()).await.unwrap().unwrap();
    assert_eq!(reloaded.status(), OrderStatus::Reserving);
    assert_eq!(reloaded_saga.last_error.as_deref(), Some("checking upserts"));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn incomplete_excludes_terminal_orders() {
    let store = store().await;

    let live = sample_order();
    SagaStore::persist(&store, &live, &SagaInstance::new(live.id()), vec![])
        .await
        .unwrap();

    let mut done = sample_order();
    done.transition(OrderStatus::Reserving).unwrap();
    done.transition(OrderStatus::Failed).unwrap();
    SagaStore::persist(&store, &done, &SagaInstance::new(done.id()), vec![])
        .await
        .unwrap();

    let incomplete = store.incomplete().await.unwrap();
    assert!(incomplete.contains(&live.id()));
    assert!(!incomplete.contains(&done.id()));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn outbox_rows_commit_with_the_transition_and_drain() {
    let store = store().await;
    let order = sample_order();
    let saga = SagaInstance::new(order.id());

    let event = outbox::OutboxEvent::new(
        outbox::EventKind::OrderCreated,
        &outbox::OrderCreatedPayload {
            order_id: order.id(),
            user_id: order.user_id(),
            total: order.total(),
        },
    )
    .unwrap();
    let event_id = event.id;
    SagaStore::persist(&store, &order, &saga, vec![event]).await.unwrap();

    let pending = store.fetch_pending(1000).await.unwrap();
    assert!(pending.iter().any(|e| e.id == event_id));

    store.mark_published(&[event_id]).await.unwrap();
    let pending = store.fetch_pending(1000).await.unwrap();
    assert!(!pending.iter().any(|e| e.id == event_id));
    assert!(
        pending
            .iter()
            .all(|e| e.status == PublishStatus::Pending)
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn guarded_update_prevents_oversell() {
    let store = store().await;
    let key = VariantKey::new(format!("p_{}", uuid::Uuid::new_v4()), "v_1");
    store.set_stock(&key, 1).await.unwrap();

    assert!(store.try_reserve(&key, 1).await.unwrap());
    assert!(!store.try_reserve(&key, 1).await.unwrap());

    let record = store.record(&key).await.unwrap().unwrap();
    assert_eq!(record.stock_count, 1);
    assert_eq!(record.reserved_count, 1);

    store.release_quantity(&key, 1).await.unwrap();
    let record = store.record(&key).await.unwrap().unwrap();
    assert_eq!(record.reserved_count, 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn full_checkout_over_postgres() {
    let store = store().await;
    let engine = InventoryEngine::new(store.clone(), Duration::minutes(15));
    let coordinator = PaymentCoordinator::new(InMemoryGateway::new(), store.clone(), "pg-secret");
    let carts = InMemoryCartSource::new();

    let orchestrator = CheckoutOrchestrator::new(
        store.clone(),
        carts.clone(),
        engine.clone(),
        coordinator,
        SagaConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: std::time::Duration::from_millis(1),
                call_timeout: std::time::Duration::from_secs(2),
            },
            ..Default::default()
        },
    );

    let key = VariantKey::new(format!("p_{}", uuid::Uuid::new_v4()), "v_1");
    engine.set_stock(&key, 5).await.unwrap();

    let snapshot = CartSnapshot {
        cart_id: CartId::new(),
        items: vec![CartItem {
            product_id: key.product_id.clone(),
            variant_id: key.variant_id.clone(),
            quantity: 2,
            unit_price: Money::from_cents(1000),
        }],
        taken_at: Utc::now(),
    };
    let cart_id = snapshot.cart_id;
    carts.put(snapshot).await;

    let started = orchestrator
        .start_checkout(CheckoutRequest {
            user_id: UserId::new(),
            cart_id,
            shipping_address: ShippingAddress {
                recipient: "A. Customer".to_string(),
                line1: "1 Main St".to_string(),
                line2: None,
                city: "Springfield".to_string(),
                postal_code: "12345".to_string(),
                country: "US".to_string(),
            },
            payment_method: PaymentMethod::Card,
        })
        .await
        .unwrap();

    assert_eq!(started.status, OrderStatus::Confirmed);

    let record = engine.availability(&key).await.unwrap().unwrap();
    assert_eq!(record.stock_count, 3);
    assert_eq!(record.reserved_count, 0);

    let (order, saga) = orchestrator.status(started.order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Confirmed);
    assert!(saga.reservation_id.is_some());
    assert!(saga.payment_intent_id.is_some());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn expired_reservation_is_swept() {
    let store = store().await;
    let engine = InventoryEngine::new(store.clone(), Duration::seconds(-1));
    let key = VariantKey::new(format!("p_{}", uuid::Uuid::new_v4()), "v_1");
    engine.set_stock(&key, 3).await.unwrap();

    engine
        .reserve(
            OrderId::new(),
            vec![inventory::ReservationLine {
                key: key.clone(),
                quantity: 2,
            }],
            &format!("sweep-{}", uuid::Uuid::new_v4()),
        )
        .await
        .unwrap();

    let released = engine.expire_due().await.unwrap();
    assert!(released >= 1);

    let record = engine.availability(&key).await.unwrap().unwrap();
    assert_eq!(record.reserved_count, 0);
    assert_eq!(record.stock_count, 3);
}
