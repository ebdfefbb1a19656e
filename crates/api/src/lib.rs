//! HTTP API for the checkout saga engine.
//!
//! Exposes checkout start, status, cancel, refund, and the gateway
//! webhook, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use inventory::{InMemoryInventoryStore, InventoryEngine, ReservationSweeper};
use metrics_exporter_prometheus::PrometheusHandle;
use outbox::{InMemoryEventBus, InMemoryOutboxStore, OutboxPublisher};
use payment::{InMemoryGateway, InMemoryPaymentIntentStore, PaymentCoordinator};
use saga::{CheckoutOrchestrator, InMemoryCartSource, InMemorySagaStore, SagaStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use routes::orders::AppState;

/// Concrete inventory engine used by the default stack.
pub type Engine = InventoryEngine<InMemoryInventoryStore>;
/// Concrete payment coordinator used by the default stack.
pub type Coordinator = PaymentCoordinator<InMemoryGateway, InMemoryPaymentIntentStore>;
/// The orchestrator over a pluggable saga store.
pub type Orchestrator<ST> = CheckoutOrchestrator<ST, InMemoryCartSource, Engine, Coordinator>;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<ST: SagaStore + 'static>(
    state: Arc<AppState<ST>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<ST>))
        .route("/orders/{id}", get(routes::orders::get::<ST>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<ST>))
        .route("/orders/{id}/refund", post(routes::orders::refund::<ST>))
        .route("/payments/webhook", post(routes::webhook::receive::<ST>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// The default in-memory stack plus its background workers.
pub struct DefaultStack {
    pub state: Arc<AppState<InMemorySagaStore>>,
    pub publisher: OutboxPublisher<InMemoryOutboxStore, InMemoryEventBus>,
    pub sweeper: ReservationSweeper<InMemoryInventoryStore>,
    pub bus: InMemoryEventBus,
    pub gateway: InMemoryGateway,
}

/// Wires the in-memory stores and collaborators into application state.
pub fn create_default_state(config: &Config) -> DefaultStack {
    let store = InMemorySagaStore::new();
    let carts = InMemoryCartSource::new();
    let engine = InventoryEngine::new(InMemoryInventoryStore::new(), config.reservation_ttl());
    let gateway = InMemoryGateway::new();
    let coordinator = PaymentCoordinator::new(
        gateway.clone(),
        InMemoryPaymentIntentStore::new(),
        config.webhook_secret.clone(),
    );

    let orchestrator = CheckoutOrchestrator::new(
        store.clone(),
        carts.clone(),
        engine.clone(),
        coordinator.clone(),
        config.saga_config(),
    );

    let bus = InMemoryEventBus::new();
    let publisher = OutboxPublisher::new(
        store.outbox(),
        bus.clone(),
        Duration::from_millis(config.outbox_interval_ms),
    );
    let sweeper = ReservationSweeper::new(
        Arc::new(engine.clone()),
        Duration::from_secs(config.sweeper_interval_secs),
    );

    let state = Arc::new(AppState {
        orchestrator,
        coordinator,
        engine,
        carts,
    });

    DefaultStack {
        state,
        publisher,
        sweeper,
        bus,
        gateway,
    }
}
