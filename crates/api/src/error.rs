//! API error type with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fulfillment::FulfillmentError;

/// API-level error that maps to an HTTP response.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request from the client (bad ID, unknown signal, ...).
    BadRequest(String),
    /// An error from the fulfillment engine.
    Fulfillment(FulfillmentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => error_body(StatusCode::BAD_REQUEST, msg),
            ApiError::Fulfillment(err) => fulfillment_error_to_response(err),
        }
    }
}

fn fulfillment_error_to_response(err: FulfillmentError) -> Response {
    match &err {
        FulfillmentError::Validation(validation) => {
            let body = serde_json::json!({
                "error": err.to_string(),
                "fields": validation.errors,
            });
            (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
        }
        FulfillmentError::OrderNotFound(_) | FulfillmentError::ShipmentNotFound(_) => {
            error_body(StatusCode::NOT_FOUND, err.to_string())
        }
        FulfillmentError::Precondition { .. } => error_body(StatusCode::CONFLICT, err.to_string()),
        FulfillmentError::AmountMismatch { .. } => {
            error_body(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        FulfillmentError::Inventory { .. } => error_body(StatusCode::CONFLICT, err.to_string()),
        FulfillmentError::Gateway(_) | FulfillmentError::Carrier(_) => {
            error_body(StatusCode::BAD_GATEWAY, err.to_string())
        }
        FulfillmentError::Store(inner) => {
            // internal detail stays in the log, not the response body
            tracing::error!(error = %inner, "store failure");
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        }
    }
}

fn error_body(status: StatusCode, message: String) -> Response {
    let body = serde_json::json!({ "error": message });
    (status, axum::Json(body)).into_response()
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}
