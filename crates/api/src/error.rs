//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderError;
use payment::PaymentError;
use saga::CheckoutError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout engine error.
    Checkout(CheckoutError),
    /// Payment coordinator error (webhook path).
    Payment(PaymentError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, error_body(&msg)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, error_body(&msg)),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Payment(err) => payment_error_to_response(&err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, error_body(&msg))
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

fn error_body(message: &str) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

/// Failures that reject a checkout still name the terminal order, so the
/// client can fetch its final status.
fn error_body_for_order(message: &str, order_id: common::OrderId) -> serde_json::Value {
    serde_json::json!({ "error": message, "order_id": order_id.to_string() })
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, serde_json::Value) {
    let message = err.to_string();
    match err {
        CheckoutError::Order(order_err) => match order_err {
            OrderError::InvalidTransition { .. } => (StatusCode::CONFLICT, error_body(&message)),
            OrderError::EmptyCart
            | OrderError::StaleCart { .. }
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidPrice { .. } => (StatusCode::BAD_REQUEST, error_body(&message)),
        },
        CheckoutError::UnknownCart(_) | CheckoutError::UnknownOrder(_) => {
            (StatusCode::NOT_FOUND, error_body(&message))
        }
        CheckoutError::UnknownIntent(_) => (StatusCode::NOT_FOUND, error_body(&message)),
        CheckoutError::InsufficientStock { order_id, .. } => (
            StatusCode::CONFLICT,
            error_body_for_order(&message, order_id),
        ),
        CheckoutError::PaymentDeclined { order_id } => (
            StatusCode::PAYMENT_REQUIRED,
            error_body_for_order(&message, order_id),
        ),
        CheckoutError::PaymentTimeout { order_id } => (
            StatusCode::BAD_GATEWAY,
            error_body_for_order(&message, order_id),
        ),
        CheckoutError::InvalidState { .. } => (StatusCode::CONFLICT, error_body(&message)),
        CheckoutError::Payment(payment_err) => payment_error_to_response(&payment_err),
        CheckoutError::Inventory(_)
        | CheckoutError::Store(_)
        | CheckoutError::Serialization(_) => {
            tracing::error!(error = %message, "checkout engine failure");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(&message))
        }
    }
}

fn payment_error_to_response(err: &PaymentError) -> (StatusCode, serde_json::Value) {
    let message = err.to_string();
    match err {
        PaymentError::InvalidSignature => (StatusCode::UNAUTHORIZED, error_body(&message)),
        PaymentError::UnknownIntent(_) => (StatusCode::NOT_FOUND, error_body(&message)),
        PaymentError::MalformedPayload(_) | PaymentError::UnrecognizedStatus(_) => {
            (StatusCode::BAD_REQUEST, error_body(&message))
        }
        PaymentError::Unavailable(_) => (StatusCode::BAD_GATEWAY, error_body(&message)),
        PaymentError::Store(_) => {
            tracing::error!(error = %message, "payment store failure");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(&message))
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}
