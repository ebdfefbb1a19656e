//! End-to-end checkout flows over the real in-memory stack.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use common::{CartId, Money, OrderId, ProductId, UserId, VariantId};
use domain::{CartItem, CartSnapshot, OrderStatus, PaymentMethod, PaymentStatus, ShippingAddress};
use inventory::{
    InMemoryInventoryStore, InventoryEngine, ReservationService, ReservationState, VariantKey,
};
use outbox::{InMemoryEventBus, InMemoryOutboxStore, OutboxPublisher};
use payment::{
    GatewayDecision, InMemoryGateway, InMemoryPaymentIntentStore, PaymentCoordinator,
    PaymentOutcome, WebhookPayload,
};
use saga::{
    CheckoutError, CheckoutOrchestrator, CheckoutRequest, InMemoryCartSource, InMemorySagaStore,
    RetryPolicy, SagaConfig, SagaInstance, SagaStep, SagaStore,
};

type Engine = InventoryEngine<InMemoryInventoryStore>;
type Coordinator = PaymentCoordinator<InMemoryGateway, InMemoryPaymentIntentStore>;
type Orchestrator = CheckoutOrchestrator<InMemorySagaStore, InMemoryCartSource, Engine, Coordinator>;

struct Harness {
    orchestrator: Arc<Orchestrator>,
    store: InMemorySagaStore,
    carts: InMemoryCartSource,
    engine: Engine,
    gateway: InMemoryGateway,
    coordinator: Coordinator,
    bus: InMemoryEventBus,
    publisher: OutboxPublisher<InMemoryOutboxStore, InMemoryEventBus>,
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: StdDuration::from_millis(1),
        call_timeout: StdDuration::from_millis(200),
    }
}

fn harness() -> Harness {
    let store = InMemorySagaStore::new();
    let carts = InMemoryCartSource::new();
    let engine = InventoryEngine::new(InMemoryInventoryStore::new(), Duration::minutes(15));
    let gateway = InMemoryGateway::new();
    let coordinator = PaymentCoordinator::new(
        gateway.clone(),
        InMemoryPaymentIntentStore::new(),
        "test-secret",
    );
    let bus = InMemoryEventBus::new();
    let publisher = OutboxPublisher::new(store.outbox(), bus.clone(), StdDuration::from_millis(10));

    let orchestrator = Arc::new(CheckoutOrchestrator::new(
        store.clone(),
        carts.clone(),
        engine.clone(),
        coordinator.clone(),
        SagaConfig {
            retry: fast_retry(),
            ..Default::default()
        },
    ));

    Harness {
        orchestrator,
        store,
        carts,
        engine,
        gateway,
        coordinator,
        bus,
        publisher,
    }
}

fn key(product: &str) -> VariantKey {
    VariantKey::new(product, "v_1")
}

async fn seed_stock(h: &Harness, stock: &[(&str, u32)]) {
    for (product, count) in stock {
        h.engine.set_stock(&key(product), *count).await.unwrap();
    }
}

async fn seed_cart(h: &Harness, items: &[(&str, u32, i64)]) -> CartId {
    let snapshot = CartSnapshot {
        cart_id: CartId::new(),
        items: items
            .iter()
            .map(|(product, quantity, cents)| CartItem {
                product_id: ProductId::new(*product),
                variant_id: VariantId::new("v_1"),
                quantity: *quantity,
                unit_price: Money::from_cents(*cents),
            })
            .collect(),
        taken_at: Utc::now(),
    };
    let cart_id = snapshot.cart_id;
    h.carts.put(snapshot).await;
    cart_id
}

fn request(cart_id: CartId) -> CheckoutRequest {
    CheckoutRequest {
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
    }
}

async fn order_status(h: &Harness, order_id: OrderId) -> OrderStatus {
    h.orchestrator
        .status(order_id)
        .await
        .unwrap()
        .unwrap()
        .0
        .status()
}

async fn deliver_webhook(h: &Harness, order_id: OrderId, status: &str) {
    let (_, saga) = h.orchestrator.status(order_id).await.unwrap().unwrap();
    let payload = serde_json::to_vec(&WebhookPayload {
        intent_id: saga.payment_intent_id.unwrap(),
        status: status.to_string(),
    })
    .unwrap();
    let signature = h.coordinator.verifier().sign(&payload);

    let (intent_id, outcome) = h
        .coordinator
        .reconcile_webhook(&payload, &signature)
        .await
        .unwrap();
    h.orchestrator
        .handle_payment_outcome(intent_id, outcome)
        .await
        .unwrap();
}

#[tokio::test]
async fn happy_path_confirms_and_commits_stock() {
    let h = harness();
    seed_stock(&h, &[("p_1", 5)]).await;
    let cart_id = seed_cart(&h, &[("p_1", 2, 1500)]).await;

    let started = h.orchestrator.start_checkout(request(cart_id)).await.unwrap();
    assert_eq!(started.status, OrderStatus::Confirmed);

    let (order, saga) = h.orchestrator.status(started.order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Confirmed);
    assert_eq!(order.payment_status(), PaymentStatus::Captured);
    assert_eq!(order.total().cents(), 3000);
    assert_eq!(saga.step, SagaStep::Finished);

    let reservation = h
        .engine
        .reservation(saga.reservation_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reservation.state, ReservationState::Committed);

    let record = h.engine.availability(&key("p_1")).await.unwrap().unwrap();
    assert_eq!(record.stock_count, 3);
    assert_eq!(record.reserved_count, 0);

    h.publisher.drain_once().await.unwrap();
    assert_eq!(h.bus.count_of("order.created"), 1);
    assert_eq!(h.bus.count_of("order.confirmed"), 1);
    assert_eq!(h.bus.count_of("payment.completed"), 1);
    assert_eq!(h.bus.count_of("order.cancelled"), 0);
}

#[tokio::test]
async fn insufficient_stock_fails_before_any_payment() {
    let h = harness();
    seed_stock(&h, &[("p_1", 1)]).await;
    let cart_id = seed_cart(&h, &[("p_1", 2, 1500)]).await;

    let err = h
        .orchestrator
        .start_checkout(request(cart_id))
        .await
        .unwrap_err();
    let CheckoutError::InsufficientStock { order_id, .. } = err else {
        panic!("expected InsufficientStock, got {err}");
    };

    assert_eq!(order_status(&h, order_id).await, OrderStatus::Failed);
    assert_eq!(h.gateway.charge_count(), 0);

    let record = h.engine.availability(&key("p_1")).await.unwrap().unwrap();
    assert_eq!(record.stock_count, 1);
    assert_eq!(record.reserved_count, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn two_checkouts_racing_the_last_unit() {
    let h = harness();
    seed_stock(&h, &[("p_1", 1)]).await;
    let cart_a = seed_cart(&h, &[("p_1", 1, 900)]).await;
    let cart_b = seed_cart(&h, &[("p_1", 1, 900)]).await;

    let a = {
        let orchestrator = Arc::clone(&h.orchestrator);
        let req = request(cart_a);
        tokio::spawn(async move { orchestrator.start_checkout(req).await })
    };
    let b = {
        let orchestrator = Arc::clone(&h.orchestrator);
        let req = request(cart_b);
        tokio::spawn(async move { orchestrator.start_checkout(req).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let confirmed = results
        .iter()
        .filter(|r| matches!(r, Ok(s) if s.status == OrderStatus::Confirmed))
        .count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(CheckoutError::InsufficientStock { .. })))
        .count();

    assert_eq!(confirmed, 1);
    assert_eq!(rejected, 1);

    let record = h.engine.availability(&key("p_1")).await.unwrap().unwrap();
    assert_eq!(record.stock_count, 0);
    assert_eq!(record.reserved_count, 0);
}

#[tokio::test]
async fn gateway_times_out_twice_then_declines() {
    let h = harness();
    seed_stock(&h, &[("p_1", 3)]).await;
    let cart_id = seed_cart(&h, &[("p_1", 1, 2000)]).await;

    h.gateway.fail_next(2);
    h.gateway
        .set_next_decision(GatewayDecision::Immediate(PaymentOutcome::Failed));

    let err = h
        .orchestrator
        .start_checkout(request(cart_id))
        .await
        .unwrap_err();
    let CheckoutError::PaymentDeclined { order_id } = err else {
        panic!("expected PaymentDeclined, got {err}");
    };

    let (order, saga) = h.orchestrator.status(order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);
    assert_eq!(order.payment_status(), PaymentStatus::Failed);

    // The reservation was released and availability restored.
    let reservation = h
        .engine
        .reservation(saga.reservation_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reservation.state, ReservationState::Released);
    let record = h.engine.availability(&key("p_1")).await.unwrap().unwrap();
    assert_eq!(record.stock_count, 3);
    assert_eq!(record.reserved_count, 0);

    // Exactly one order.cancelled, even after repeated drains.
    h.publisher.drain_once().await.unwrap();
    h.publisher.drain_once().await.unwrap();
    assert_eq!(h.bus.count_of("order.cancelled"), 1);
    assert_eq!(h.bus.count_of("inventory.released"), 1);
    assert_eq!(h.bus.count_of("order.confirmed"), 0);
}

#[tokio::test]
async fn webhook_path_confirms_after_async_outcome() {
    let h = harness();
    seed_stock(&h, &[("p_1", 2)]).await;
    let cart_id = seed_cart(&h, &[("p_1", 1, 1200)]).await;

    h.gateway.set_next_decision(GatewayDecision::Pending);
    let started = h.orchestrator.start_checkout(request(cart_id)).await.unwrap();
    assert_eq!(started.status, OrderStatus::PaymentPending);

    deliver_webhook(&h, started.order_id, "captured").await;

    assert_eq!(order_status(&h, started.order_id).await, OrderStatus::Confirmed);
    let record = h.engine.availability(&key("p_1")).await.unwrap().unwrap();
    assert_eq!(record.stock_count, 1);
}

#[tokio::test]
async fn replayed_webhook_is_acknowledged_without_double_effects() {
    let h = harness();
    seed_stock(&h, &[("p_1", 2)]).await;
    let cart_id = seed_cart(&h, &[("p_1", 1, 1200)]).await;

    h.gateway.set_next_decision(GatewayDecision::Pending);
    let started = h.orchestrator.start_checkout(request(cart_id)).await.unwrap();

    deliver_webhook(&h, started.order_id, "captured").await;
    let stock_after_first = h
        .engine
        .availability(&key("p_1"))
        .await
        .unwrap()
        .unwrap()
        .stock_count;

    // At-least-once delivery: the gateway sends it again.
    deliver_webhook(&h, started.order_id, "captured").await;

    assert_eq!(order_status(&h, started.order_id).await, OrderStatus::Confirmed);
    let record = h.engine.availability(&key("p_1")).await.unwrap().unwrap();
    assert_eq!(record.stock_count, stock_after_first);

    h.publisher.drain_once().await.unwrap();
    assert_eq!(h.bus.count_of("order.confirmed"), 1);
    assert_eq!(h.bus.count_of("payment.completed"), 1);
}

#[tokio::test]
async fn failed_webhook_outcome_compensates() {
    let h = harness();
    seed_stock(&h, &[("p_1", 2)]).await;
    let cart_id = seed_cart(&h, &[("p_1", 2, 1200)]).await;

    h.gateway.set_next_decision(GatewayDecision::Pending);
    let started = h.orchestrator.start_checkout(request(cart_id)).await.unwrap();

    deliver_webhook(&h, started.order_id, "declined").await;

    assert_eq!(order_status(&h, started.order_id).await, OrderStatus::Cancelled);
    let record = h.engine.availability(&key("p_1")).await.unwrap().unwrap();
    assert_eq!(record.stock_count, 2);
    assert_eq!(record.reserved_count, 0);
}

#[tokio::test]
async fn cancel_while_payment_pending_releases_the_hold() {
    let h = harness();
    seed_stock(&h, &[("p_1", 4)]).await;
    let cart_id = seed_cart(&h, &[("p_1", 3, 800)]).await;

    h.gateway.set_next_decision(GatewayDecision::Pending);
    let started = h.orchestrator.start_checkout(request(cart_id)).await.unwrap();
    assert_eq!(started.status, OrderStatus::PaymentPending);

    h.orchestrator.cancel(started.order_id).await.unwrap();

    assert_eq!(order_status(&h, started.order_id).await, OrderStatus::Cancelled);
    let record = h.engine.availability(&key("p_1")).await.unwrap().unwrap();
    assert_eq!(record.reserved_count, 0);
    assert_eq!(record.stock_count, 4);

    h.publisher.drain_once().await.unwrap();
    assert_eq!(h.bus.count_of("order.cancelled"), 1);
    assert_eq!(h.bus.count_of("inventory.released"), 1);
}

#[tokio::test]
async fn cancel_after_confirmation_is_rejected() {
    let h = harness();
    seed_stock(&h, &[("p_1", 2)]).await;
    let cart_id = seed_cart(&h, &[("p_1", 1, 700)]).await;

    let started = h.orchestrator.start_checkout(request(cart_id)).await.unwrap();
    assert_eq!(started.status, OrderStatus::Confirmed);

    let err = h.orchestrator.cancel(started.order_id).await.unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidState { .. }));
    assert_eq!(order_status(&h, started.order_id).await, OrderStatus::Confirmed);
}

#[tokio::test]
async fn late_capture_after_cancellation_is_refunded() {
    let h = harness();
    seed_stock(&h, &[("p_1", 2)]).await;
    let cart_id = seed_cart(&h, &[("p_1", 1, 700)]).await;

    h.gateway.set_next_decision(GatewayDecision::Pending);
    let started = h.orchestrator.start_checkout(request(cart_id)).await.unwrap();
    h.orchestrator.cancel(started.order_id).await.unwrap();

    // The gateway settled the charge anyway; the webhook arrives after
    // cancellation. The money must come back.
    deliver_webhook(&h, started.order_id, "captured").await;

    let (order, saga) = h.orchestrator.status(started.order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);
    assert_eq!(order.payment_status(), PaymentStatus::Refunded);
    assert_eq!(h.gateway.refunded(), vec![saga.payment_intent_id.unwrap()]);
}

#[tokio::test]
async fn refund_after_confirmation() {
    let h = harness();
    seed_stock(&h, &[("p_1", 2)]).await;
    let cart_id = seed_cart(&h, &[("p_1", 1, 700)]).await;

    let started = h.orchestrator.start_checkout(request(cart_id)).await.unwrap();
    assert_eq!(started.status, OrderStatus::Confirmed);

    h.orchestrator.refund(started.order_id).await.unwrap();

    let (order, saga) = h.orchestrator.status(started.order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Refunded);
    assert_eq!(order.payment_status(), PaymentStatus::Refunded);
    assert_eq!(h.gateway.refunded(), vec![saga.payment_intent_id.unwrap()]);

    h.publisher.drain_once().await.unwrap();
    assert_eq!(h.bus.count_of("order.refunded"), 1);

    // A second refund request is rejected, not applied twice.
    let err = h.orchestrator.refund(started.order_id).await.unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidState { .. }));
    assert_eq!(h.gateway.refunded().len(), 1);
}

#[tokio::test]
async fn unknown_cart_is_rejected() {
    let h = harness();
    let err = h
        .orchestrator
        .start_checkout(request(CartId::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::UnknownCart(_)));
}

#[tokio::test]
async fn stale_cart_is_rejected_before_any_side_effect() {
    let h = harness();
    seed_stock(&h, &[("p_1", 2)]).await;
    let snapshot = CartSnapshot {
        cart_id: CartId::new(),
        items: vec![CartItem {
            product_id: ProductId::new("p_1"),
            variant_id: VariantId::new("v_1"),
            quantity: 1,
            unit_price: Money::from_cents(700),
        }],
        taken_at: Utc::now() - Duration::hours(1),
    };
    let cart_id = snapshot.cart_id;
    h.carts.put(snapshot).await;

    let err = h
        .orchestrator
        .start_checkout(request(cart_id))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Order(_)));
    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.gateway.charge_count(), 0);
}

/// Builds the state a crash would leave behind: order Reserved, stock
/// held, payment never initiated.
async fn park_reserved_order(h: &Harness) -> OrderId {
    seed_stock(h, &[("p_1", 5)]).await;
    let snapshot = CartSnapshot {
        cart_id: CartId::new(),
        items: vec![CartItem {
            product_id: ProductId::new("p_1"),
            variant_id: VariantId::new("v_1"),
            quantity: 2,
            unit_price: Money::from_cents(1000),
        }],
        taken_at: Utc::now(),
    };

    let order_id = OrderId::new();
    let mut order = domain::Order::from_snapshot(
        order_id,
        UserId::new(),
        &snapshot,
        common::Currency::Usd,
        PaymentMethod::Card,
        request(snapshot.cart_id).shipping_address,
    );
    let mut saga = SagaInstance::new(order_id);

    order.transition(OrderStatus::Reserving).unwrap();
    let reservation_id = h
        .engine
        .reserve(
            order_id,
            vec![inventory::ReservationLine {
                key: key("p_1"),
                quantity: 2,
            }],
            &saga.reserve_key,
        )
        .await
        .unwrap();
    saga.record_reservation(reservation_id);
    saga.advance(SagaStep::Pay);
    order.transition(OrderStatus::Reserved).unwrap();
    h.store.persist(&order, &saga, vec![]).await.unwrap();

    order_id
}

#[tokio::test]
async fn resume_drives_a_reserved_order_to_confirmed() {
    let h = harness();
    let order_id = park_reserved_order(&h).await;

    let resumed = h.orchestrator.resume().await.unwrap();
    assert_eq!(resumed, 1);

    assert_eq!(order_status(&h, order_id).await, OrderStatus::Confirmed);
    assert_eq!(h.gateway.charge_count(), 1);

    let record = h.engine.availability(&key("p_1")).await.unwrap().unwrap();
    assert_eq!(record.stock_count, 3);
    assert_eq!(record.reserved_count, 0);
}

#[tokio::test]
async fn resume_replays_reserve_without_double_decrement() {
    let h = harness();
    seed_stock(&h, &[("p_1", 5)]).await;

    // Crash window: the reservation landed but the Reserved transition was
    // never persisted. The order restarts from Reserving.
    let snapshot = CartSnapshot {
        cart_id: CartId::new(),
        items: vec![CartItem {
            product_id: ProductId::new("p_1"),
            variant_id: VariantId::new("v_1"),
            quantity: 2,
            unit_price: Money::from_cents(1000),
        }],
        taken_at: Utc::now(),
    };
    let order_id = OrderId::new();
    let mut order = domain::Order::from_snapshot(
        order_id,
        UserId::new(),
        &snapshot,
        common::Currency::Usd,
        PaymentMethod::Card,
        request(snapshot.cart_id).shipping_address,
    );
    let saga = SagaInstance::new(order_id);
    order.transition(OrderStatus::Reserving).unwrap();
    h.engine
        .reserve(
            order_id,
            vec![inventory::ReservationLine {
                key: key("p_1"),
                quantity: 2,
            }],
            &saga.reserve_key,
        )
        .await
        .unwrap();
    h.store.persist(&order, &saga, vec![]).await.unwrap();

    h.orchestrator.resume().await.unwrap();

    assert_eq!(order_status(&h, order_id).await, OrderStatus::Confirmed);

    // One hold, one commit: 5 - 2 = 3, nothing still reserved.
    let record = h.engine.availability(&key("p_1")).await.unwrap().unwrap();
    assert_eq!(record.stock_count, 3);
    assert_eq!(record.reserved_count, 0);
    assert_eq!(h.gateway.charge_count(), 1);
}

#[tokio::test]
async fn resume_settles_payment_pending_order_from_intent_status() {
    let h = harness();
    seed_stock(&h, &[("p_1", 2)]).await;
    let cart_id = seed_cart(&h, &[("p_1", 1, 1200)]).await;

    // Gateway answered Pending; the process "crashes" before any webhook.
    h.gateway.set_next_decision(GatewayDecision::Pending);
    let started = h.orchestrator.start_checkout(request(cart_id)).await.unwrap();
    assert_eq!(started.status, OrderStatus::PaymentPending);

    // On resume the intent is re-presented; the gateway replays its
    // recorded decision (still Pending), so the order keeps waiting.
    h.orchestrator.resume().await.unwrap();
    assert_eq!(order_status(&h, started.order_id).await, OrderStatus::PaymentPending);

    // The webhook then lands as usual.
    deliver_webhook(&h, started.order_id, "captured").await;
    assert_eq!(order_status(&h, started.order_id).await, OrderStatus::Confirmed);
    assert_eq!(h.gateway.charge_count(), 1);
}

#[tokio::test]
async fn resume_finishes_a_half_done_compensation() {
    let h = harness();
    let order_id = park_reserved_order(&h).await;

    // Crash right after entering compensation.
    let (mut order, mut saga) = h.store.load(order_id).await.unwrap().unwrap();
    order.transition(OrderStatus::Compensating).unwrap();
    saga.advance(SagaStep::Compensate);
    h.store.persist(&order, &saga, vec![]).await.unwrap();

    h.orchestrator.resume().await.unwrap();

    assert_eq!(order_status(&h, order_id).await, OrderStatus::Cancelled);
    let record = h.engine.availability(&key("p_1")).await.unwrap().unwrap();
    assert_eq!(record.stock_count, 5);
    assert_eq!(record.reserved_count, 0);

    h.publisher.drain_once().await.unwrap();
    assert_eq!(h.bus.count_of("order.cancelled"), 1);
}

#[tokio::test]
async fn resume_is_a_no_op_for_terminal_orders() {
    let h = harness();
    seed_stock(&h, &[("p_1", 2)]).await;
    let cart_id = seed_cart(&h, &[("p_1", 1, 700)]).await;

    let started = h.orchestrator.start_checkout(request(cart_id)).await.unwrap();
    assert_eq!(started.status, OrderStatus::Confirmed);

    let resumed = h.orchestrator.resume().await.unwrap();
    assert_eq!(resumed, 0);
    assert_eq!(h.gateway.charge_count(), 1);
}
