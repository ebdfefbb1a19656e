//! Checkout endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{CartId, OrderId, UserId};
use domain::{Order, PaymentMethod, ShippingAddress};
use saga::{CheckoutRequest, SagaInstance, SagaStore};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::{Coordinator, Engine, Orchestrator};

/// Shared application state accessible from all handlers.
pub struct AppState<ST: SagaStore> {
    pub orchestrator: Orchestrator<ST>,
    pub coordinator: Coordinator,
    pub engine: Engine,
    pub carts: saga::InMemoryCartSource,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    /// Authenticated user (session issuance is out of scope; the id is
    /// taken as given).
    pub user_id: Option<String>,
    pub cart_id: String,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: String,
    pub status: String,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub variant_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Serialize)]
pub struct SagaView {
    pub step: String,
    pub reservation_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub reserve_attempts: u32,
    pub payment_attempts: u32,
    pub last_error: Option<String>,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub payment_status: String,
    pub currency: String,
    pub total_cents: i64,
    pub items: Vec<OrderItemResponse>,
    pub saga: SagaView,
}

impl OrderResponse {
    fn from_parts(order: &Order, saga: &SagaInstance) -> Self {
        Self {
            id: order.id().to_string(),
            user_id: order.user_id().to_string(),
            status: order.status().to_string(),
            payment_status: order.payment_status().to_string(),
            currency: order.currency().to_string(),
            total_cents: order.total().cents(),
            items: order
                .items()
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.to_string(),
                    variant_id: item.variant_id.to_string(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                })
                .collect(),
            saga: SagaView {
                step: saga.step.to_string(),
                reservation_id: saga.reservation_id.map(|id| id.to_string()),
                payment_intent_id: saga.payment_intent_id.map(|id| id.to_string()),
                reserve_attempts: saga.reserve_attempts,
                payment_attempts: saga.payment_attempts,
                last_error: saga.last_error.clone(),
            },
        }
    }
}

// -- Handlers --

/// POST /orders - start a checkout from a cart.
#[tracing::instrument(skip(state, req))]
pub async fn create<ST: SagaStore + 'static>(
    State(state): State<Arc<AppState<ST>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(axum::http::StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let cart_id: CartId = req
        .cart_id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid cart_id: {e}")))?;
    let user_id = match req.user_id.as_deref() {
        Some(raw) => raw
            .parse::<UserId>()
            .map_err(|e| ApiError::BadRequest(format!("Invalid user_id: {e}")))?,
        None => UserId::new(),
    };

    let started = state
        .orchestrator
        .start_checkout(CheckoutRequest {
            user_id,
            cart_id,
            shipping_address: req.shipping_address,
            payment_method: req.payment_method,
        })
        .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order_id: started.order_id.to_string(),
            status: started.status.to_string(),
        }),
    ))
}

/// GET /orders/:id - current status snapshot.
#[tracing::instrument(skip(state))]
pub async fn get<ST: SagaStore + 'static>(
    State(state): State<Arc<AppState<ST>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let (order, saga) = state
        .orchestrator
        .status(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(OrderResponse::from_parts(&order, &saga)))
}

/// POST /orders/:id/cancel - request cancellation.
#[tracing::instrument(skip(state))]
pub async fn cancel<ST: SagaStore + 'static>(
    State(state): State<Arc<AppState<ST>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    state.orchestrator.cancel(order_id).await?;

    let (order, saga) = state
        .orchestrator
        .status(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    Ok(Json(OrderResponse::from_parts(&order, &saga)))
}

/// POST /orders/:id/refund - refund a confirmed order.
#[tracing::instrument(skip(state))]
pub async fn refund<ST: SagaStore + 'static>(
    State(state): State<Arc<AppState<ST>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    state.orchestrator.refund(order_id).await?;

    let (order, saga) = state
        .orchestrator
        .status(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    Ok(Json(OrderResponse::from_parts(&order, &saga)))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}
