//! Payment gateway webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use saga::SagaStore;
use serde::Serialize;

use crate::error::ApiError;
use crate::routes::orders::AppState;

/// Header carrying the gateway's signature over the raw body.
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

#[derive(Serialize)]
pub struct WebhookAck {
    pub intent_id: String,
    pub status: &'static str,
}

/// POST /payments/webhook - gateway callback.
///
/// The signature is verified against the raw body before anything is
/// parsed; duplicate deliveries are acknowledged (the orchestrator treats
/// them as no-ops).
#[tracing::instrument(skip(state, headers, body))]
pub async fn receive<ST: SagaStore + 'static>(
    State(state): State<Arc<AppState<ST>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("Missing {SIGNATURE_HEADER} header")))?;

    let (intent_id, outcome) = state.coordinator.reconcile_webhook(&body, signature).await?;
    state
        .orchestrator
        .handle_payment_outcome(intent_id, outcome)
        .await?;

    Ok(Json(WebhookAck {
        intent_id: intent_id.to_string(),
        status: "accepted",
    }))
}
